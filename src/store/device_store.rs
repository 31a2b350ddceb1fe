// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Process-wide device state store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use super::DeviceRecord;

/// A caller's own just-issued switch write, tagged with its time.
#[derive(Debug, Clone, Copy)]
struct OptimisticSwitch {
    on: bool,
    at: Instant,
}

#[derive(Debug)]
struct Slot {
    record: DeviceRecord,
    optimistic: Option<OptimisticSwitch>,
}

/// Shared mapping from device identifier to device record.
///
/// Single source of truth read by presentation code. Mutated only by the
/// synchronization core (reducer, optimistic command writes, REST refresh)
/// to preserve the single-writer invariant; all other holders are readers.
///
/// Reads of the derived switch state prefer a caller's own optimistic write
/// for a bounded window; push updates are never blocked from the canonical
/// record, they only lose read preference while the window is valid.
///
/// Cheaply cloneable; clones share the same underlying map.
#[derive(Debug, Clone)]
pub struct DeviceStateStore {
    inner: Arc<RwLock<HashMap<String, Slot>>>,
    optimistic_window: Duration,
}

impl DeviceStateStore {
    /// Creates an empty store with the given optimistic-read window.
    #[must_use]
    pub fn new(optimistic_window: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            optimistic_window,
        }
    }

    /// Returns the optimistic-read window.
    #[must_use]
    pub fn optimistic_window(&self) -> Duration {
        self.optimistic_window
    }

    /// Replaces the full device list from a REST refresh.
    ///
    /// Devices absent from `records` are destroyed. Optimistic markers of
    /// surviving devices are kept so a refresh racing a fresh command does
    /// not flip the caller-visible state back.
    pub fn replace_all(&self, records: Vec<DeviceRecord>) {
        let mut map = self.inner.write();
        let mut next: HashMap<String, Slot> = HashMap::with_capacity(records.len());
        for record in records {
            let optimistic = map
                .get(&record.device_id)
                .and_then(|slot| slot.optimistic);
            next.insert(record.device_id.clone(), Slot { record, optimistic });
        }
        *map = next;
    }

    /// Returns a snapshot of one device record.
    #[must_use]
    pub fn get(&self, device_id: &str) -> Option<DeviceRecord> {
        self.inner.read().get(device_id).map(|s| s.record.clone())
    }

    /// Returns a snapshot of all device records.
    #[must_use]
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        self.inner
            .read()
            .values()
            .map(|s| s.record.clone())
            .collect()
    }

    /// Returns all known device identifiers.
    #[must_use]
    pub fn device_ids(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    /// Returns the number of known devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns `true` if no devices are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Returns `true` if the device is known.
    #[must_use]
    pub fn contains(&self, device_id: &str) -> bool {
        self.inner.read().contains_key(device_id)
    }

    /// Upserts an `{act, val}` pair into a device's act status.
    ///
    /// Returns `false` if the device is unknown (a no-op, not an error:
    /// the device list and the push stream are not guaranteed to agree on
    /// membership at every instant).
    pub fn upsert_act(&self, device_id: &str, act_name: &str, val: &str) -> bool {
        let mut map = self.inner.write();
        match map.get_mut(device_id) {
            Some(slot) => {
                slot.record.upsert_act(act_name, val);
                true
            }
            None => false,
        }
    }

    /// Sets a device's online flag.
    ///
    /// Returns `false` if the device is unknown.
    pub fn set_online(&self, device_id: &str, online: bool) -> bool {
        let mut map = self.inner.write();
        match map.get_mut(device_id) {
            Some(slot) => {
                slot.record.online = online;
                true
            }
            None => false,
        }
    }

    /// Writes a caller's own switch command result, tagged with the current
    /// time.
    ///
    /// The canonical record is updated immediately (as any push would do)
    /// and the write is additionally remembered so window-aware reads
    /// prefer it over later stale pushes until the window expires.
    ///
    /// Returns `false` if the device is unknown.
    pub fn apply_optimistic_switch(&self, device_id: &str, on: bool) -> bool {
        let mut map = self.inner.write();
        match map.get_mut(device_id) {
            Some(slot) => {
                slot.record.upsert_act(super::act::SOURCE, if on { "on" } else { "off" });
                slot.optimistic = Some(OptimisticSwitch {
                    on,
                    at: Instant::now(),
                });
                true
            }
            None => false,
        }
    }

    /// Returns the derived switch state, preferring a fresh optimistic write.
    ///
    /// While a caller's own write is younger than the optimistic window the
    /// written value is surfaced; afterwards the canonical value always
    /// wins, whatever pushes did in between.
    #[must_use]
    pub fn l1_state(&self, device_id: &str) -> Option<bool> {
        let map = self.inner.read();
        let slot = map.get(device_id)?;
        if let Some(opt) = slot.optimistic
            && opt.at.elapsed() < self.optimistic_window
        {
            return Some(opt.on);
        }
        Some(slot.record.l1_state)
    }

    /// Returns a device's online flag.
    #[must_use]
    pub fn online(&self, device_id: &str) -> Option<bool> {
        self.inner.read().get(device_id).map(|s| s.record.online)
    }
}
