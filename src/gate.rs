// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-entity command debounce and mutual-exclusion gate.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy)]
struct GateEntry {
    last_command_time: Instant,
    in_flight: bool,
}

/// Debounce gate guarding outbound commands per logical entity.
///
/// A command is admitted only if no command for the same entity is
/// currently in flight and at least the given minimum interval has elapsed
/// since the last admitted command started. The gate knows nothing about
/// what the command does; it is a pure synchronization primitive.
///
/// The gate is an explicit instance owned by the synchronization core and
/// injected where needed — there is no hidden process-global.
///
/// # Examples
///
/// ```
/// use mindor_lib::CommandGate;
/// use std::time::Duration;
///
/// let gate = CommandGate::new();
/// assert!(gate.try_acquire("socket-1", Duration::from_secs(1)));
/// assert!(!gate.try_acquire("socket-1", Duration::from_secs(1)));
/// gate.release("socket-1");
/// ```
#[derive(Debug, Default)]
pub struct CommandGate {
    entries: Mutex<HashMap<String, GateEntry>>,
}

impl CommandGate {
    /// Creates an empty gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to admit a command for the given entity.
    ///
    /// Returns `false` if a command for this entity is in flight or less
    /// than `min_interval` has elapsed since the last admitted command
    /// started. Otherwise marks the entity in flight, records the start
    /// time and returns `true`.
    pub fn try_acquire(&self, entity_id: &str, min_interval: Duration) -> bool {
        let mut entries = self.entries.lock();
        let now = Instant::now();

        if let Some(entry) = entries.get(entity_id) {
            if entry.in_flight {
                tracing::debug!(entity_id, "command already in flight, rejecting");
                return false;
            }
            let elapsed = now.duration_since(entry.last_command_time);
            if elapsed < min_interval {
                tracing::debug!(
                    entity_id,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "within debounce interval, rejecting"
                );
                return false;
            }
        }

        entries.insert(
            entity_id.to_string(),
            GateEntry {
                last_command_time: now,
                in_flight: true,
            },
        );
        true
    }

    /// Clears the in-flight flag for the entity.
    ///
    /// Called on every exit path of a guarded command, success or failure.
    /// The last command time is kept so the debounce interval still applies.
    pub fn release(&self, entity_id: &str) {
        if let Some(entry) = self.entries.lock().get_mut(entity_id) {
            entry.in_flight = false;
        }
    }

    /// Removes all gate state for the entity.
    ///
    /// Used when an entity is removed; the next command is admitted as if
    /// the entity had never issued one.
    pub fn reset(&self, entity_id: &str) {
        self.entries.lock().remove(entity_id);
    }

    /// Returns `true` if a command for the entity is currently in flight.
    #[must_use]
    pub fn is_in_flight(&self, entity_id: &str) -> bool {
        self.entries
            .lock()
            .get(entity_id)
            .is_some_and(|e| e.in_flight)
    }
}
