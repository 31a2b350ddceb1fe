// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Energy accounting: trapezoidal power integration and durable totals.
//!
//! [`EnergyAccumulator`] turns instantaneous power samples into per-device,
//! per-period kWh totals; [`JsonFileStore`] persists them across restarts.

mod accumulator;
mod store;

pub use accumulator::EnergyAccumulator;
pub use store::{EnergyRecord, EnergyStore, JsonFileStore, LegacyEnergyRecord, Period};
