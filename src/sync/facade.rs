// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level entry point tying REST, push channel, store and gate together.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::CloudConfig;
use crate::energy::{EnergyAccumulator, JsonFileStore, Period};
use crate::error::{Error, Result};
use crate::event::{EventBus, SyncEvent};
use crate::gate::CommandGate;
use crate::protocol::{ConnectionManager, ConnectionState, PushFrame, RestClient};
use crate::store::{DeviceRecord, DeviceStateStore, act};

use super::reducer::MessageReducer;

/// The synchronization core for one Mindor cloud account.
///
/// Owns the state store, the push channel, the REST client, the command
/// gate and the periodic refresh task. Construct it, call
/// [`start`](Self::start) once, then read state and send commands from as
/// many tasks as needed; the facade is made for shared use behind an
/// [`Arc`].
///
/// # Examples
///
/// ```no_run
/// use mindor_lib::{CloudConfig, CloudSync};
///
/// # async fn example() -> mindor_lib::Result<()> {
/// let sync = CloudSync::new(CloudConfig::new("token-abc", "wx-user-1"))?;
/// sync.start().await?;
///
/// for device in sync.devices() {
///     println!("{}: on={}", device.name, device.l1_state);
/// }
/// sync.send_switch("1001", true).await?;
/// sync.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CloudSync {
    config: CloudConfig,
    store: DeviceStateStore,
    events: EventBus,
    gate: CommandGate,
    rest: RestClient,
    connection: ConnectionManager,
    energy: Option<EnergyAccumulator<JsonFileStore>>,
    frame_rx: Mutex<Option<mpsc::UnboundedReceiver<PushFrame>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CloudSync {
    /// Creates the core from a configuration. Nothing connects until
    /// [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns an error if the REST client cannot be created.
    pub fn new(config: CloudConfig) -> Result<Self> {
        let events = EventBus::new();
        let store = DeviceStateStore::new(config.optimistic_window());
        let rest = RestClient::new(&config)?;
        let (connection, frame_rx) = ConnectionManager::new(&config, events.clone());

        Ok(Self {
            config,
            store,
            events,
            gate: CommandGate::new(),
            rest,
            connection,
            energy: None,
            frame_rx: Mutex::new(Some(frame_rx)),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Enables energy accounting, persisted as JSON files under `dir`.
    #[must_use]
    pub fn with_energy_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.energy = Some(EnergyAccumulator::new(JsonFileStore::new(dir)));
        self
    }

    /// Seeds the store, opens the push channel and starts the refresh task.
    ///
    /// The initial device list fetch is synchronous: when `start` returns
    /// successfully the store is populated. The push channel keeps
    /// reconnecting in the background per the configured policy. Calling
    /// `start` a second time is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial device list fetch fails or the push
    /// endpoint URL is invalid.
    pub async fn start(&self) -> Result<()> {
        let Some(mut frame_rx) = self.frame_rx.lock().take() else {
            return Ok(());
        };

        if let Err(e) = self.refresh().await {
            // Seed failed: hand the receiver back so start can be retried.
            *self.frame_rx.lock() = Some(frame_rx);
            return Err(e);
        }

        let reducer = MessageReducer::new(self.store.clone(), self.events.clone());
        let pump = tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                reducer.reduce(&frame);
            }
        });

        let rest = self.rest.clone();
        let store = self.store.clone();
        let events = self.events.clone();
        let interval = self.config.refresh_interval();
        let refresher = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await; // the first tick fires immediately
            loop {
                ticker.tick().await;
                match rest.fetch_devices().await {
                    Ok(records) => {
                        let count = records.len();
                        store.replace_all(records);
                        events.publish(SyncEvent::DeviceListRefreshed { count });
                    }
                    Err(e) => tracing::warn!(error = %e, "periodic device refresh failed"),
                }
            }
        });

        self.tasks.lock().extend([pump, refresher]);

        self.connection.connect().await?;
        Ok(())
    }

    /// Stops the push channel and all background tasks.
    ///
    /// Idempotent; pending reconnection attempts are suppressed before any
    /// task is torn down.
    pub async fn shutdown(&self) {
        self.connection.disconnect().await;
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        tracing::info!("synchronization core stopped");
    }

    /// Fetches the device list now and replaces the store contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails; the store keeps its previous
    /// contents in that case.
    pub async fn refresh(&self) -> Result<()> {
        let records = self.rest.fetch_devices().await?;
        let count = records.len();
        self.store.replace_all(records);
        self.events.publish(SyncEvent::DeviceListRefreshed { count });
        tracing::info!(count, "device list refreshed");
        Ok(())
    }

    /// Switches a socket on or off.
    ///
    /// Returns `Ok(true)` when the cloud accepted the command; the local
    /// state then reflects the new position immediately (optimistically)
    /// without waiting for the push confirmation. Returns `Ok(false)` when
    /// the command gate rejects the call or the cloud refuses the command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] for unknown devices, or a
    /// protocol error if the request itself fails.
    pub async fn send_switch(&self, device_id: &str, on: bool) -> Result<bool> {
        if !self.store.contains(device_id) {
            return Err(Error::DeviceNotFound);
        }
        if !self.gate.try_acquire(device_id, self.config.command_interval()) {
            return Ok(false);
        }

        let val = if on { "on" } else { "off" };
        let result = self.rest.send_act(device_id, act::SOURCE, Some(val)).await;
        self.gate.release(device_id);

        match result {
            Ok(true) => {
                self.store.apply_optimistic_switch(device_id, on);
                self.events.publish(SyncEvent::StateChanged {
                    device_id: device_id.to_string(),
                });
                tracing::info!(device_id, on, "switch command accepted");
                Ok(true)
            }
            other => other,
        }
    }

    /// Sends an arbitrary control act.
    ///
    /// The store is not touched on success; the new value arrives through
    /// the push channel. Gate semantics match
    /// [`send_switch`](Self::send_switch).
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] for unknown devices, or a
    /// protocol error if the request itself fails.
    pub async fn send_act(&self, device_id: &str, act: &str, val: Option<&str>) -> Result<bool> {
        if !self.store.contains(device_id) {
            return Err(Error::DeviceNotFound);
        }
        if !self.gate.try_acquire(device_id, self.config.command_interval()) {
            return Ok(false);
        }

        let result = self.rest.send_act(device_id, act, val).await;
        self.gate.release(device_id);
        result
    }

    /// Fetches the raw status payload for one device from the cloud.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the cloud reports one.
    pub async fn fetch_device_status(&self, device_id: &str) -> Result<serde_json::Value> {
        self.rest.fetch_device_status(device_id).await
    }

    /// Returns a snapshot of all known devices.
    #[must_use]
    pub fn devices(&self) -> Vec<DeviceRecord> {
        self.store.snapshot()
    }

    /// Returns a snapshot of one device.
    #[must_use]
    pub fn device(&self, device_id: &str) -> Option<DeviceRecord> {
        self.store.get(device_id)
    }

    /// Returns the switch position of a device.
    ///
    /// Within the optimistic window after a successful
    /// [`send_switch`](Self::send_switch), the commanded position wins over
    /// anything the cloud pushed since.
    #[must_use]
    pub fn is_on(&self, device_id: &str) -> Option<bool> {
        self.store.l1_state(device_id)
    }

    /// Returns the online flag of a device.
    #[must_use]
    pub fn online(&self, device_id: &str) -> Option<bool> {
        self.store.online(device_id)
    }

    /// Subscribes to synchronization events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Returns the current push channel state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Returns a watch receiver tracking push channel state changes.
    #[must_use]
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe_state()
    }

    /// Returns the shared state store.
    #[must_use]
    pub fn store(&self) -> &DeviceStateStore {
        &self.store
    }

    /// Feeds the device's current power reading into the energy total.
    ///
    /// Returns the updated total in kWh, or `None` when energy accounting
    /// is not enabled or the device has no numeric power reading yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] for unknown devices, or a storage
    /// error if the persisted record cannot be loaded.
    pub async fn sample_power(&self, device_id: &str, period: Period) -> Result<Option<f64>> {
        self.sample_power_at(device_id, period, Utc::now()).await
    }

    /// [`sample_power`](Self::sample_power) with an explicit sample time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] for unknown devices, or a storage
    /// error if the persisted record cannot be loaded.
    pub async fn sample_power_at(
        &self,
        device_id: &str,
        period: Period,
        now: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let Some(energy) = &self.energy else {
            return Ok(None);
        };
        let record = self.store.get(device_id).ok_or(Error::DeviceNotFound)?;
        let Some(power) = record.power_watts() else {
            return Ok(None);
        };

        let total = energy.sample(device_id, period, power, now).await?;
        Ok(Some(total))
    }

    /// Returns the accumulated energy total without feeding a sample.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the persisted record cannot be loaded.
    pub async fn energy_total(&self, device_id: &str, period: Period) -> Result<Option<f64>> {
        let Some(energy) = &self.energy else {
            return Ok(None);
        };
        Ok(Some(energy.total(device_id, period, Utc::now()).await?))
    }

    /// Arc-wraps `self` for sharing across tasks.
    #[must_use]
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}
