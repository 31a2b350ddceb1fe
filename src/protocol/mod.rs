// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire protocols of the Mindor cloud.
//!
//! The cloud exposes two surfaces: a signed REST API for the device list
//! and commands ([`RestClient`]), and an ActionCable-style WebSocket push
//! channel for live updates ([`ConnectionManager`]).

mod frame;
mod rest;
mod ws;

pub use frame::{PushFrame, classify, subscribe_frame};
pub use rest::RestClient;
pub use ws::{ConnectionManager, ConnectionState};
