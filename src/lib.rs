// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `Mindor` Lib - A Rust library to mirror and control Mindor cloud
//! smart-home devices.
//!
//! The library keeps a local mirror of an account's device list in sync
//! with the Mindor cloud: a signed REST API seeds and refreshes the list,
//! and an ActionCable-style WebSocket push channel streams live updates
//! into it. Commands flow the other way through the same REST API, guarded
//! by a per-device debounce gate and reflected optimistically in the local
//! state.
//!
//! # Supported Features
//!
//! - **Live state mirror**: device list, act values, presence, all pushed
//!   in real time
//! - **Switch control**: on/off with optimistic local state and debounce
//! - **Arbitrary control acts**: temperature, mode, wind gear and friends
//! - **Energy accounting**: trapezoidal power integration into daily and
//!   monthly kWh totals, persisted across restarts
//! - **Resilient connection**: fixed-delay reconnect with a hard attempt
//!   cap and observable connection state
//!
//! # Quick Start
//!
//! ```no_run
//! use mindor_lib::{CloudConfig, CloudSync, SyncEvent};
//!
//! #[tokio::main]
//! async fn main() -> mindor_lib::Result<()> {
//!     let sync = CloudSync::new(CloudConfig::new("token-abc", "wx-user-1"))?;
//!     let mut events = sync.subscribe();
//!
//!     // Seeds the device list and opens the push channel.
//!     sync.start().await?;
//!
//!     for device in sync.devices() {
//!         println!("{}: on={} online={}", device.name, device.l1_state, device.online);
//!     }
//!
//!     // Flip a socket; local state updates immediately.
//!     sync.send_switch("1001", true).await?;
//!
//!     // React to pushed changes.
//!     while let Ok(event) = events.recv().await {
//!         if let SyncEvent::StateChanged { device_id } = event {
//!             println!("{device_id} changed: on={:?}", sync.is_on(&device_id));
//!         }
//!     }
//!
//!     sync.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Energy Accounting
//!
//! ```no_run
//! use mindor_lib::{CloudConfig, CloudSync};
//! use mindor_lib::energy::Period;
//!
//! # async fn example() -> mindor_lib::Result<()> {
//! let sync = CloudSync::new(CloudConfig::new("token-abc", "wx-user-1"))?
//!     .with_energy_dir("/var/lib/mindor/energy");
//! sync.start().await?;
//!
//! // Call periodically; each sample integrates since the previous one.
//! if let Some(kwh) = sync.sample_power("1001", Period::Day).await? {
//!     println!("today: {kwh:.3} kWh");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod energy;
pub mod error;
pub mod event;
pub mod gate;
pub mod protocol;
pub mod signing;
pub mod store;
pub mod sync;

pub use config::{CloudConfig, ReconnectPolicy};
pub use error::{Error, ParseError, ProtocolError, Result, StorageError};
pub use event::{EventBus, SyncEvent};
pub use gate::CommandGate;
pub use protocol::{ConnectionManager, ConnectionState, PushFrame, RestClient};
pub use store::{ActEntry, DeviceRecord, DeviceStateStore};
pub use sync::{CloudSync, MessageReducer};
