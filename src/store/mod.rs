// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device records and the shared state store.
//!
//! [`DeviceStateStore`] is the single source of truth for device state,
//! mutated only by the synchronization core. [`DeviceRecord`] carries the
//! act/val sub-states; the `act` name is unique within a record and every
//! update is an upsert.

mod device_record;
mod device_store;

pub use device_record::{ActEntry, DeviceRecord, act, upsert_act};
pub use device_store::DeviceStateStore;
