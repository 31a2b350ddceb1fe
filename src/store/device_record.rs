// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory representation of one cloud device.

use serde::{Deserialize, Deserializer, Serialize};

/// Well-known `act` names of the act/val protocol.
///
/// Unknown names are still stored verbatim; these constants only drive
/// derived top-level fields and typed accessors.
pub mod act {
    /// Socket relay state; any value other than `"off"` means on.
    pub const SOURCE: &str = "source";
    /// Instantaneous power draw in watts, string-encoded.
    pub const POWER: &str = "power";
    /// Climate target temperature.
    pub const THERMOREGULATION: &str = "thermoregulation";
    /// Climate operating mode.
    pub const MODE: &str = "mode";
    /// Climate swing setting.
    pub const AIR_SWING: &str = "airSwing";
    /// Climate fan speed.
    pub const WIND_GEAR: &str = "windGear";
    /// Climate on/off state.
    pub const ON: &str = "On";
}

/// One named sub-state of a device and its string-encoded value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActEntry {
    /// The sub-state name, e.g. `"mode"` or `"power"`.
    pub act: String,
    /// The string-encoded value.
    pub val: String,
}

impl ActEntry {
    /// Creates a new entry.
    #[must_use]
    pub fn new(act: impl Into<String>, val: impl Into<String>) -> Self {
        Self {
            act: act.into(),
            val: val.into(),
        }
    }
}

/// Upserts an `{act, val}` pair into an act-status collection.
///
/// Within one collection `act` is unique: an existing entry is replaced in
/// place, otherwise the pair is appended. Every caller goes through this
/// function so the invariant holds for all mutation paths.
pub fn upsert_act(entries: &mut Vec<ActEntry>, act: &str, val: &str) {
    if let Some(entry) = entries.iter_mut().find(|e| e.act == act) {
        entry.val = val.to_string();
    } else {
        entries.push(ActEntry::new(act, val));
    }
}

/// The synchronization core's in-memory representation of one device.
///
/// Owned exclusively by the device state store; consumers read snapshots.
/// Created when the REST device list first returns the device, mutated by
/// push updates and optimistic command writes, replaced wholesale on every
/// REST refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Cloud record id.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Physical device identifier; key of the push stream.
    #[serde(deserialize_with = "string_or_number")]
    pub device_id: String,
    /// Human-readable device name.
    #[serde(default)]
    pub name: String,
    /// Vendor type code (`typ_spu` on the wire).
    #[serde(rename = "typ_spu", default)]
    pub type_code: String,
    /// Firmware version string.
    #[serde(rename = "firmware_ver", default)]
    pub firmware_version: String,
    /// Area the device is assigned to.
    #[serde(rename = "areable_name", default)]
    pub area_name: String,
    /// Whether the cloud currently considers the device online.
    #[serde(default)]
    pub online: bool,
    /// Derived relay state (from the `source` act).
    #[serde(default)]
    pub l1_state: bool,
    /// Named sub-states; `act` is unique within the collection.
    #[serde(rename = "device_act_status", default)]
    pub act_status: Vec<ActEntry>,
    /// All remaining fields the cloud sends.
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl DeviceRecord {
    /// Upserts an `{act, val}` pair and updates derived fields.
    ///
    /// The `source` act additionally drives `l1_state`: any value other
    /// than `"off"` means the relay is on.
    pub fn upsert_act(&mut self, act_name: &str, val: &str) {
        upsert_act(&mut self.act_status, act_name, val);
        if act_name == act::SOURCE {
            self.l1_state = val != "off";
        }
    }

    /// Returns the value of a named sub-state, if present.
    #[must_use]
    pub fn act_val(&self, act_name: &str) -> Option<&str> {
        self.act_status
            .iter()
            .find(|e| e.act == act_name)
            .map(|e| e.val.as_str())
    }

    /// Returns the instantaneous power draw in watts, if reported and numeric.
    #[must_use]
    pub fn power_watts(&self) -> Option<f64> {
        self.act_val(act::POWER)?.parse().ok()
    }
}

/// Accepts both string and numeric JSON values for identifier fields.
///
/// The cloud is inconsistent about whether ids are serialized as strings
/// or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(i64),
    }

    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DeviceRecord {
        serde_json::from_value(serde_json::json!({
            "id": 7,
            "device_id": "dev-1",
            "name": "Desk socket",
            "typ_spu": "ZCZ001",
            "online": true,
            "l1_state": false,
            "device_act_status": [
                {"act": "power", "val": "120.5"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn deserializes_rest_record() {
        let rec = record();
        assert_eq!(rec.id, "7");
        assert_eq!(rec.device_id, "dev-1");
        assert_eq!(rec.type_code, "ZCZ001");
        assert!(rec.online);
        assert!(!rec.l1_state);
        assert_eq!(rec.act_status.len(), 1);
    }

    #[test]
    fn upsert_replaces_existing_act() {
        let mut rec = record();
        rec.upsert_act("power", "99.0");
        rec.upsert_act("power", "100.0");

        assert_eq!(rec.act_status.len(), 1);
        assert_eq!(rec.act_val("power"), Some("100.0"));
    }

    #[test]
    fn upsert_appends_unknown_act() {
        let mut rec = record();
        rec.upsert_act("futureFeature", "42");

        assert_eq!(rec.act_status.len(), 2);
        assert_eq!(rec.act_val("futureFeature"), Some("42"));
    }

    #[test]
    fn source_act_derives_l1_state() {
        let mut rec = record();

        rec.upsert_act("source", "on");
        assert!(rec.l1_state);

        rec.upsert_act("source", "off");
        assert!(!rec.l1_state);

        // Any non-"off" value counts as on
        rec.upsert_act("source", "l1");
        assert!(rec.l1_state);
    }

    #[test]
    fn last_write_wins_over_upsert_sequence() {
        let mut entries = Vec::new();
        for (act_name, val) in [
            ("mode", "01"),
            ("windGear", "02"),
            ("mode", "03"),
            ("mode", "05"),
            ("windGear", "00"),
        ] {
            upsert_act(&mut entries, act_name, val);
        }

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], ActEntry::new("mode", "05"));
        assert_eq!(entries[1], ActEntry::new("windGear", "00"));
    }

    #[test]
    fn power_watts_parses_numeric_val() {
        let rec = record();
        assert_eq!(rec.power_watts(), Some(120.5));

        let mut rec = record();
        rec.upsert_act("power", "not-a-number");
        assert_eq!(rec.power_watts(), None);
    }

    #[test]
    fn extra_fields_are_preserved() {
        let rec: DeviceRecord = serde_json::from_value(serde_json::json!({
            "id": "1",
            "device_id": "d",
            "signal_strength": -61
        }))
        .unwrap();
        assert_eq!(rec.extra["signal_strength"], -61);
    }
}
