// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Applies classified push frames to the device state store.

use crate::event::{EventBus, SyncEvent};
use crate::protocol::PushFrame;
use crate::store::DeviceStateStore;

/// Reduces push frames into store mutations and events.
///
/// Reduction is synchronous and infallible: a frame either mutates the
/// store and publishes an event, or it is logged and dropped. Frames for
/// devices the store does not know are no-ops; the next full refresh will
/// pick the device up.
#[derive(Debug, Clone)]
pub struct MessageReducer {
    store: DeviceStateStore,
    events: EventBus,
}

impl MessageReducer {
    /// Creates a reducer over the given store and event bus.
    #[must_use]
    pub fn new(store: DeviceStateStore, events: EventBus) -> Self {
        Self { store, events }
    }

    /// Applies one frame.
    ///
    /// By the time this returns, the store holds the new state and the
    /// matching event has been published.
    pub fn reduce(&self, frame: &PushFrame) {
        match frame {
            PushFrame::Welcome => tracing::info!("push channel welcome received"),
            PushFrame::Ping => tracing::trace!("push channel heartbeat"),
            PushFrame::Unknown(frame_type) => {
                tracing::debug!(frame_type = frame_type.as_deref(), "ignoring unknown frame");
            }
            PushFrame::DeviceUpdate { device_id, actions } => {
                let mut changed = false;
                for entry in actions {
                    if self.store.upsert_act(device_id, &entry.act, &entry.val) {
                        changed = true;
                    } else {
                        tracing::debug!(device_id, act = %entry.act, "update for unknown device dropped");
                    }
                }
                if changed {
                    tracing::debug!(device_id, acts = actions.len(), "device state updated");
                    self.events.publish(SyncEvent::StateChanged {
                        device_id: device_id.clone(),
                    });
                }
            }
            PushFrame::StatusUpdate { device_id, online } => {
                if self.store.set_online(device_id, *online) {
                    tracing::info!(device_id, online, "device presence updated");
                    self.events.publish(SyncEvent::PresenceChanged {
                        device_id: device_id.clone(),
                        online: *online,
                    });
                } else {
                    tracing::debug!(device_id, "presence for unknown device dropped");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ActEntry, DeviceRecord, act};
    use std::time::Duration;

    fn store_with(device_id: &str) -> DeviceStateStore {
        let store = DeviceStateStore::new(Duration::from_secs(30));
        let record: DeviceRecord = serde_json::from_value(serde_json::json!({
            "id": "1",
            "device_id": device_id,
            "name": "socket",
            "online": true,
            "l1_state": false,
        }))
        .unwrap();
        store.replace_all(vec![record]);
        store
    }

    #[test]
    fn device_update_mutates_store_and_publishes() {
        let store = store_with("d-1");
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let reducer = MessageReducer::new(store.clone(), events);

        reducer.reduce(&PushFrame::DeviceUpdate {
            device_id: "d-1".to_string(),
            actions: vec![ActEntry::new(act::SOURCE, "on")],
        });

        // Store first, event second, all before reduce returned.
        assert_eq!(store.l1_state("d-1"), Some(true));
        assert!(matches!(
            rx.try_recv().unwrap(),
            SyncEvent::StateChanged { device_id } if device_id == "d-1"
        ));
    }

    #[test]
    fn unknown_device_is_a_silent_noop() {
        let store = store_with("d-1");
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let reducer = MessageReducer::new(store.clone(), events);

        reducer.reduce(&PushFrame::DeviceUpdate {
            device_id: "ghost".to_string(),
            actions: vec![ActEntry::new(act::SOURCE, "on")],
        });

        assert!(!store.contains("ghost"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn status_update_sets_presence() {
        let store = store_with("d-1");
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let reducer = MessageReducer::new(store.clone(), events);

        reducer.reduce(&PushFrame::StatusUpdate {
            device_id: "d-1".to_string(),
            online: false,
        });

        assert_eq!(store.online("d-1"), Some(false));
        assert!(matches!(
            rx.try_recv().unwrap(),
            SyncEvent::PresenceChanged { online: false, .. }
        ));
    }

    #[test]
    fn heartbeat_frames_touch_nothing() {
        let store = store_with("d-1");
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let reducer = MessageReducer::new(store.clone(), events);

        reducer.reduce(&PushFrame::Welcome);
        reducer.reduce(&PushFrame::Ping);
        reducer.reduce(&PushFrame::Unknown(Some("confirm_subscription".to_string())));

        assert!(rx.try_recv().is_err());
    }
}
