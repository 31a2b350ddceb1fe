// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Synchronization core: the push-frame reducer and the [`CloudSync`]
//! facade that ties every piece together.

mod facade;
mod reducer;

pub use facade::CloudSync;
pub use reducer::MessageReducer;
