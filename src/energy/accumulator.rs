// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Power-to-energy integration with period rollover.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::StorageError;

use super::store::{EnergyRecord, EnergyStore, Period};

/// Integrates instantaneous power samples into per-period energy totals.
///
/// Each `(device, period)` pair accumulates independently. Samples are
/// integrated with the trapezoidal rule: the average of the previous and
/// current power, times the elapsed hours, divided by 1000 to yield kWh.
/// The first sample after startup only establishes a baseline and
/// contributes nothing.
///
/// Totals reset to zero when the period key derived from the sample time
/// no longer matches the stored key, so a device that is offline across
/// midnight still starts the new day at zero.
///
/// Persistence is write-behind: the in-memory total is updated first and
/// the save runs in a background task. A failed save is logged and does
/// not roll back the total.
#[derive(Debug)]
pub struct EnergyAccumulator<S> {
    store: Arc<S>,
    records: Mutex<HashMap<(String, Period), EnergyRecord>>,
}

impl<S: EnergyStore + 'static> EnergyAccumulator<S> {
    /// Creates an accumulator over the given store.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Feeds one power sample and returns the updated total in kWh.
    ///
    /// `power_w` is the instantaneous power in watts at `now`. Samples must
    /// arrive in time order per device; a sample not later than the previous
    /// one updates the baseline without adding energy. Negative readings
    /// count as zero draw, so the total never decreases.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the persisted record cannot be loaded on
    /// first use of this `(device, period)` pair.
    pub async fn sample(
        &self,
        device_id: &str,
        period: Period,
        power_w: f64,
        now: DateTime<Utc>,
    ) -> Result<f64, StorageError> {
        let power_w = power_w.max(0.0);
        let mut loaded = self.load_if_absent(device_id, period, now).await?;

        let mut records = self.records.lock();
        let record = records
            .entry((device_id.to_string(), period))
            .or_insert_with(|| {
                loaded
                    .take()
                    .unwrap_or_else(|| EnergyRecord::new(period.key(now)))
            });

        let key = period.key(now);
        if record.period_key != key {
            tracing::info!(
                device_id,
                period = period.as_str(),
                from = %record.period_key,
                to = %key,
                "period rolled over, resetting total"
            );
            record.accumulated_kwh = 0.0;
            record.period_key = key;
        }

        if let (Some(last_power), Some(last_time)) = (record.last_power_w, record.last_sample_time)
        {
            let elapsed_ms = (now - last_time).num_milliseconds();
            if elapsed_ms > 0 {
                let hours = elapsed_ms as f64 / 3_600_000.0;
                record.accumulated_kwh += (last_power + power_w) / 2.0 * hours / 1000.0;
            }
        }

        record.last_power_w = Some(power_w);
        record.last_sample_time = Some(now);

        let total = record.accumulated_kwh;
        let snapshot = record.clone();
        drop(records);

        self.save_behind(device_id, period, snapshot);
        Ok(total)
    }

    /// Returns the current total in kWh without integrating a sample.
    ///
    /// Applies the same rollover rule as [`sample`](Self::sample): if the
    /// stored period key no longer matches `now`, the total reads as zero.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the persisted record cannot be loaded on
    /// first use of this `(device, period)` pair.
    pub async fn total(
        &self,
        device_id: &str,
        period: Period,
        now: DateTime<Utc>,
    ) -> Result<f64, StorageError> {
        let mut loaded = self.load_if_absent(device_id, period, now).await?;

        let mut records = self.records.lock();
        let record = records
            .entry((device_id.to_string(), period))
            .or_insert_with(|| {
                loaded
                    .take()
                    .unwrap_or_else(|| EnergyRecord::new(period.key(now)))
            });

        if record.period_key == period.key(now) {
            Ok(record.accumulated_kwh)
        } else {
            Ok(0.0)
        }
    }

    /// Loads the persisted record unless the pair is already cached.
    ///
    /// Falls back to the pre-split combined record for pairs that have no
    /// per-period file yet.
    async fn load_if_absent(
        &self,
        device_id: &str,
        period: Period,
        now: DateTime<Utc>,
    ) -> Result<Option<EnergyRecord>, StorageError> {
        let key = (device_id.to_string(), period);
        if self.records.lock().contains_key(&key) {
            return Ok(None);
        }

        if let Some(record) = self.store.load(device_id, period).await? {
            return Ok(Some(record));
        }

        if let Some(legacy) = self.store.load_legacy(device_id).await? {
            let (value, legacy_key) = match period {
                Period::Day => (legacy.today_energy, legacy.last_reset_date),
                Period::Month => (legacy.month_energy, legacy.last_reset_month),
            };
            if let Some(value) = value {
                tracing::info!(
                    device_id,
                    period = period.as_str(),
                    kwh = value,
                    "migrating combined energy record"
                );
                let mut record = EnergyRecord::new(legacy_key.unwrap_or_else(|| period.key(now)));
                record.accumulated_kwh = value;
                return Ok(Some(record));
            }
        }

        Ok(None)
    }

    fn save_behind(&self, device_id: &str, period: Period, record: EnergyRecord) {
        let store = Arc::clone(&self.store);
        let device_id = device_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = store.save(&device_id, period, &record).await {
                tracing::warn!(device_id, period = period.as_str(), error = %e, "energy save failed");
            }
        });
    }
}
