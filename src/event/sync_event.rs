// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Synchronization event types.

use crate::protocol::ConnectionState;

/// Events emitted by the synchronization core.
///
/// Subscribers are notified synchronously when the reducer or the refresh
/// task mutates the state store, and on every push-channel state change.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// The device list was replaced by a REST refresh.
    DeviceListRefreshed {
        /// Number of devices after the refresh.
        count: usize,
    },

    /// A device's act status changed (push update or optimistic write).
    StateChanged {
        /// The physical device identifier.
        device_id: String,
    },

    /// A device's online flag changed.
    PresenceChanged {
        /// The physical device identifier.
        device_id: String,
        /// The new online flag.
        online: bool,
    },

    /// The push channel transitioned to a new state.
    ConnectionChanged {
        /// The new connection state.
        state: ConnectionState,
    },
}

impl SyncEvent {
    /// Returns the device id this event concerns, if any.
    #[must_use]
    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::StateChanged { device_id } | Self::PresenceChanged { device_id, .. } => {
                Some(device_id)
            }
            Self::DeviceListRefreshed { .. } | Self::ConnectionChanged { .. } => None,
        }
    }

    /// Returns `true` if this is a state or presence change.
    #[must_use]
    pub fn is_device_update(&self) -> bool {
        matches!(
            self,
            Self::StateChanged { .. } | Self::PresenceChanged { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_extraction() {
        let event = SyncEvent::StateChanged {
            device_id: "dev-1".to_string(),
        };
        assert_eq!(event.device_id(), Some("dev-1"));

        let event = SyncEvent::DeviceListRefreshed { count: 3 };
        assert_eq!(event.device_id(), None);
    }

    #[test]
    fn device_update_classification() {
        assert!(
            SyncEvent::PresenceChanged {
                device_id: "d".to_string(),
                online: false,
            }
            .is_device_update()
        );
        assert!(!SyncEvent::DeviceListRefreshed { count: 0 }.is_device_update());
    }
}
