// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Push-channel frame encoding and classification.
//!
//! The cloud push channel speaks ActionCable-style JSON text frames. The
//! outbound side is a single subscribe command; the inbound side is a small
//! family of frames classified by [`classify`].

use serde::Deserialize;
use serde_json::json;

use crate::error::ParseError;
use crate::store::ActEntry;

/// Channel name carried in the subscribe identifier.
const DEVICE_LIST_CHANNEL: &str = "V5MdDeviceListChannel";

/// Builds the subscribe command sent right after the socket opens.
///
/// The identifier is itself a JSON document, serialized to a string inside
/// the outer frame per the ActionCable convention:
///
/// ```json
/// {"command":"subscribe","identifier":"{\"channel\":\"V5MdDeviceListChannel\",\"wx_user_id\":\"u-1\"}"}
/// ```
#[must_use]
pub fn subscribe_frame(user_id: &str) -> String {
    let identifier = json!({
        "channel": DEVICE_LIST_CHANNEL,
        "wx_user_id": user_id,
    });
    json!({
        "command": "subscribe",
        "identifier": identifier.to_string(),
    })
    .to_string()
}

/// One classified inbound push frame.
#[derive(Debug, Clone, PartialEq)]
pub enum PushFrame {
    /// Server greeting after the socket opens.
    Welcome,
    /// Server heartbeat.
    Ping,
    /// A device reported new act values.
    DeviceUpdate {
        /// The physical device identifier.
        device_id: String,
        /// The changed `(act, val)` pairs in wire order.
        actions: Vec<ActEntry>,
    },
    /// A device went online or offline.
    StatusUpdate {
        /// The physical device identifier.
        device_id: String,
        /// `true` when the device reports `"online"`.
        online: bool,
    },
    /// Valid JSON that matches no known shape. Carries the frame type
    /// string when one was present.
    Unknown(Option<String>),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    #[serde(default)]
    frame_type: Option<String>,
    #[serde(default)]
    message: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct DeviceMessage {
    device_id: serde_json::Value,
    #[serde(default)]
    act_arr: Vec<WireAct>,
    #[serde(rename = "type")]
    #[serde(default)]
    message_type: Option<String>,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireAct {
    act: String,
    #[serde(default)]
    val: serde_json::Value,
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Classifies one inbound text frame.
///
/// A single frame can yield several [`PushFrame`]s: a device message that
/// carries both an `act_arr` and a status marker produces a
/// [`PushFrame::DeviceUpdate`] followed by a [`PushFrame::StatusUpdate`].
/// Frames that are valid JSON but match no known shape yield a single
/// [`PushFrame::Unknown`]; only malformed JSON is an error.
///
/// # Errors
///
/// Returns [`ParseError::Json`] if `text` is not valid JSON.
pub fn classify(text: &str) -> Result<Vec<PushFrame>, ParseError> {
    let envelope: Envelope = serde_json::from_str(text)?;

    match envelope.frame_type.as_deref() {
        Some("welcome") => return Ok(vec![PushFrame::Welcome]),
        Some("ping") => return Ok(vec![PushFrame::Ping]),
        _ => {}
    }

    let Some(message) = envelope.message else {
        return Ok(vec![PushFrame::Unknown(envelope.frame_type)]);
    };

    let Ok(device) = serde_json::from_value::<DeviceMessage>(message) else {
        return Ok(vec![PushFrame::Unknown(envelope.frame_type)]);
    };

    let device_id = value_to_string(&device.device_id);
    let mut frames = Vec::new();

    if !device.act_arr.is_empty() {
        let actions = device
            .act_arr
            .iter()
            .map(|a| ActEntry::new(a.act.clone(), value_to_string(&a.val)))
            .collect();
        frames.push(PushFrame::DeviceUpdate {
            device_id: device_id.clone(),
            actions,
        });
    }

    if device.message_type.as_deref() == Some("status") {
        frames.push(PushFrame::StatusUpdate {
            device_id,
            online: device.data.as_deref() == Some("online"),
        });
    }

    if frames.is_empty() {
        frames.push(PushFrame::Unknown(envelope.frame_type));
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_frame_nests_identifier_as_string() {
        let frame = subscribe_frame("u-42");
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(parsed["command"], "subscribe");
        let identifier: serde_json::Value =
            serde_json::from_str(parsed["identifier"].as_str().unwrap()).unwrap();
        assert_eq!(identifier["channel"], "V5MdDeviceListChannel");
        assert_eq!(identifier["wx_user_id"], "u-42");
    }

    #[test]
    fn welcome_and_ping() {
        assert_eq!(
            classify(r#"{"type":"welcome"}"#).unwrap(),
            vec![PushFrame::Welcome]
        );
        assert_eq!(
            classify(r#"{"type":"ping","message":1710000000}"#).unwrap(),
            vec![PushFrame::Ping]
        );
    }

    #[test]
    fn device_update_with_actions() {
        let frames = classify(
            r#"{"identifier":"x","message":{"device_id":"d-1",
                "act_arr":[{"act":"source","val":"on"},{"act":"power","val":"42.5"}]}}"#,
        )
        .unwrap();

        assert_eq!(
            frames,
            vec![PushFrame::DeviceUpdate {
                device_id: "d-1".to_string(),
                actions: vec![
                    ActEntry::new("source", "on"),
                    ActEntry::new("power", "42.5"),
                ],
            }]
        );
    }

    #[test]
    fn numeric_device_id_and_val_become_strings() {
        let frames = classify(
            r#"{"message":{"device_id":1001,"act_arr":[{"act":"power","val":42}]}}"#,
        )
        .unwrap();

        assert_eq!(
            frames,
            vec![PushFrame::DeviceUpdate {
                device_id: "1001".to_string(),
                actions: vec![ActEntry::new("power", "42")],
            }]
        );
    }

    #[test]
    fn status_update() {
        let frames =
            classify(r#"{"message":{"device_id":"d-1","type":"status","data":"offline"}}"#)
                .unwrap();

        assert_eq!(
            frames,
            vec![PushFrame::StatusUpdate {
                device_id: "d-1".to_string(),
                online: false,
            }]
        );
    }

    #[test]
    fn combined_frame_yields_update_then_status() {
        let frames = classify(
            r#"{"message":{"device_id":"d-1","type":"status","data":"online",
                "act_arr":[{"act":"source","val":"on"}]}}"#,
        )
        .unwrap();

        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], PushFrame::DeviceUpdate { .. }));
        assert!(matches!(
            frames[1],
            PushFrame::StatusUpdate { online: true, .. }
        ));
    }

    #[test]
    fn unknown_shapes_are_not_errors() {
        assert_eq!(
            classify(r#"{"type":"confirm_subscription","identifier":"x"}"#).unwrap(),
            vec![PushFrame::Unknown(Some("confirm_subscription".to_string()))]
        );
        assert_eq!(
            classify(r#"{"message":"not an object"}"#).unwrap(),
            vec![PushFrame::Unknown(None)]
        );
        // A device message with no actions and no status marker.
        assert_eq!(
            classify(r#"{"message":{"device_id":"d-1"}}"#).unwrap(),
            vec![PushFrame::Unknown(None)]
        );
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(classify("not json").is_err());
    }
}
