// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Durable storage for accumulated energy records.

use std::future::Future;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Accumulation period for an energy record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    /// Resets at the start of every calendar day.
    Day,
    /// Resets at the start of every calendar month.
    Month,
}

impl Period {
    /// Returns the storage key segment for this period.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Month => "month",
        }
    }

    /// Computes the period key for a point in time.
    ///
    /// Day keys are ISO dates (`2024-01-02`), month keys are `YYYY-MM`.
    #[must_use]
    pub fn key(self, now: DateTime<Utc>) -> String {
        match self {
            Self::Day => now.date_naive().to_string(),
            Self::Month => now.format("%Y-%m").to_string(),
        }
    }
}

/// Accumulated energy for one device and period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyRecord {
    /// Accumulated energy in kWh, never negative.
    pub accumulated_kwh: f64,
    /// The period this value belongs to (ISO date or `YYYY-MM`).
    pub period_key: String,
    /// Power of the most recent sample in watts.
    #[serde(default)]
    pub last_power_w: Option<f64>,
    /// Time of the most recent sample.
    #[serde(default)]
    pub last_sample_time: Option<DateTime<Utc>>,
}

impl EnergyRecord {
    /// Creates an empty record for the given period key.
    #[must_use]
    pub fn new(period_key: String) -> Self {
        Self {
            accumulated_kwh: 0.0,
            period_key,
            last_power_w: None,
            last_sample_time: None,
        }
    }
}

/// Pre-split-format record that combined both periods under one key.
///
/// Read once to seed per-period records that do not exist yet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LegacyEnergyRecord {
    /// Accumulated day energy in kWh.
    #[serde(default)]
    pub today_energy: Option<f64>,
    /// Accumulated month energy in kWh.
    #[serde(default)]
    pub month_energy: Option<f64>,
    /// Period key of the day value.
    #[serde(default)]
    pub last_reset_date: Option<String>,
    /// Period key of the month value.
    #[serde(default)]
    pub last_reset_month: Option<String>,
}

/// Durable key-value storage for energy records, keyed by device and period.
///
/// Implementations must tolerate concurrent saves for different keys; the
/// accumulator serializes saves per key itself.
pub trait EnergyStore: Send + Sync {
    /// Loads the record for a device and period, if present.
    fn load(
        &self,
        device_id: &str,
        period: Period,
    ) -> impl Future<Output = Result<Option<EnergyRecord>, StorageError>> + Send;

    /// Persists the record for a device and period.
    fn save(
        &self,
        device_id: &str,
        period: Period,
        record: &EnergyRecord,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Loads the pre-split combined record for a device, if present.
    fn load_legacy(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Result<Option<LegacyEnergyRecord>, StorageError>> + Send;
}

/// Energy store backed by one JSON file per device and period.
///
/// Files live directly under the configured directory:
/// `energy_day_<device>.json`, `energy_month_<device>.json`, plus the
/// legacy combined `energy_<device>.json` read only for migration.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Creates a store rooted at the given directory.
    ///
    /// The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, device_id: &str, period: Period) -> PathBuf {
        self.dir
            .join(format!("energy_{}_{device_id}.json", period.as_str()))
    }

    fn legacy_path(&self, device_id: &str) -> PathBuf {
        self.dir.join(format!("energy_{device_id}.json"))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        path: PathBuf,
    ) -> Result<Option<T>, StorageError> {
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

impl EnergyStore for JsonFileStore {
    async fn load(
        &self,
        device_id: &str,
        period: Period,
    ) -> Result<Option<EnergyRecord>, StorageError> {
        Self::read_json(self.path(device_id, period)).await
    }

    async fn save(
        &self,
        device_id: &str,
        period: Period,
        record: &EnergyRecord,
    ) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec(record)?;
        tokio::fs::write(self.path(device_id, period), bytes).await?;
        Ok(())
    }

    async fn load_legacy(
        &self,
        device_id: &str,
    ) -> Result<Option<LegacyEnergyRecord>, StorageError> {
        Self::read_json(self.legacy_path(device_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn period_keys() {
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 13, 45, 0).unwrap();
        assert_eq!(Period::Day.key(t), "2024-01-02");
        assert_eq!(Period::Month.key(t), "2024-01");
    }

    #[test]
    fn energy_record_roundtrip() {
        let record = EnergyRecord {
            accumulated_kwh: 1.25,
            period_key: "2024-01-02".to_string(),
            last_power_w: Some(120.0),
            last_sample_time: Some(Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap()),
        };

        let json = serde_json::to_string(&record).unwrap();
        let back: EnergyRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[tokio::test]
    async fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        assert!(store.load("dev", Period::Day).await.unwrap().is_none());
        assert!(store.load_legacy("dev").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        let record = EnergyRecord::new("2024-03".to_string());
        store.save("dev", Period::Month, &record).await.unwrap();

        let loaded = store.load("dev", Period::Month).await.unwrap().unwrap();
        assert_eq!(loaded, record);
        // Day and month keys are independent.
        assert!(store.load("dev", Period::Day).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn legacy_record_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        tokio::fs::write(
            dir.path().join("energy_dev.json"),
            r#"{"today_energy": 0.5, "month_energy": 7.1, "last_reset_date": "2024-01-02"}"#,
        )
        .await
        .unwrap();

        let legacy = store.load_legacy("dev").await.unwrap().unwrap();
        assert_eq!(legacy.today_energy, Some(0.5));
        assert_eq!(legacy.month_energy, Some(7.1));
        assert_eq!(legacy.last_reset_date.as_deref(), Some("2024-01-02"));
        assert!(legacy.last_reset_month.is_none());
    }
}
