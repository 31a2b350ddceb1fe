// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event system for synchronization notifications.
//!
//! The reducer publishes on the [`EventBus`] synchronously before it
//! returns, so a subscriber that observes an event can rely on the store
//! already holding the new state.

mod event_bus;
mod sync_event;

pub use event_bus::EventBus;
pub use sync_event::SyncEvent;
