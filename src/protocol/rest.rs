// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! REST client for the Mindor cloud API.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::CloudConfig;
use crate::error::{Error, ProtocolError, Result};
use crate::signing::SigningParams;
use crate::store::DeviceRecord;

/// Response envelope wrapping every cloud API payload.
///
/// `errcode` 0 means success; any other value carries a human-readable
/// `msg`. The payload field differs per endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    msg: String,
    #[serde(flatten)]
    payload: T,
}

#[derive(Debug, Deserialize)]
struct DeviceListPayload {
    #[serde(default)]
    records: Vec<DeviceRecord>,
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct EmptyPayload {}

/// HTTP client for the Mindor cloud REST endpoints.
///
/// Every request carries the bearer token in `Authorization`, a `Sign`
/// header over freshly generated signing parameters, and the parameters
/// themselves flattened into individual headers.
///
/// # Examples
///
/// ```no_run
/// use mindor_lib::{CloudConfig, RestClient};
///
/// # async fn example() -> mindor_lib::Result<()> {
/// let config = CloudConfig::new("token-abc", "wx-user-1");
/// let client = RestClient::new(&config)?;
/// let devices = client.fetch_devices().await?;
/// println!("{} devices", devices.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RestClient {
    base_url: String,
    token: String,
    client: Client,
}

impl RestClient {
    /// Creates a REST client from the cloud configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Http`] if the underlying HTTP client cannot
    /// be created.
    pub fn new(config: &CloudConfig) -> std::result::Result<Self, ProtocolError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(ProtocolError::Http)?;

        Ok(Self {
            base_url: config.api_base().trim_end_matches('/').to_string(),
            token: config.token().to_string(),
            client,
        })
    }

    fn signed_request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let params = SigningParams::generate();
        let mut builder = builder
            .header("Authorization", &self.token)
            .header("Sign", params.sign());
        for (name, value) in params.headers() {
            builder = builder.header(name, value);
        }
        builder
    }

    /// Fetches the full device list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] on a non-zero `errcode`, or a protocol error
    /// if the request fails.
    pub async fn fetch_devices(&self) -> Result<Vec<DeviceRecord>> {
        let url = format!("{}/md_openapi/home_assistant/devices", self.base_url);
        tracing::debug!(url = %url, "fetching device list");

        let response = self
            .signed_request(self.client.get(&url))
            .send()
            .await
            .map_err(ProtocolError::Http)?
            .error_for_status()
            .map_err(ProtocolError::Http)?;

        let envelope: Envelope<DeviceListPayload> =
            response.json().await.map_err(ProtocolError::Http)?;
        if envelope.errcode != 0 {
            return Err(Error::Api {
                errcode: envelope.errcode,
                msg: envelope.msg,
            });
        }

        tracing::debug!(count = envelope.payload.records.len(), "device list fetched");
        Ok(envelope.payload.records)
    }

    /// Fetches the raw status payload for one device.
    ///
    /// The shape of the payload varies by device type, so it is returned as
    /// untyped JSON for the caller to pick apart.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] on a non-zero `errcode`, or a protocol error
    /// if the request fails.
    pub async fn fetch_device_status(&self, device_id: &str) -> Result<serde_json::Value> {
        let url = format!(
            "{}/md_openapi/home_assistant/device/status?device_id={}",
            self.base_url,
            urlencoding::encode(device_id)
        );
        tracing::debug!(device_id, "fetching device status");

        let response = self
            .signed_request(self.client.get(&url))
            .send()
            .await
            .map_err(ProtocolError::Http)?
            .error_for_status()
            .map_err(ProtocolError::Http)?;

        let envelope: Envelope<StatusPayload> =
            response.json().await.map_err(ProtocolError::Http)?;
        if envelope.errcode != 0 {
            return Err(Error::Api {
                errcode: envelope.errcode,
                msg: envelope.msg,
            });
        }

        Ok(envelope.payload.data)
    }

    /// Sends a control command for one device.
    ///
    /// Returns `Ok(true)` if the cloud accepted the command. A rejection
    /// reported inside a well-formed response (HTTP error status or a
    /// non-zero `errcode`) is `Ok(false)`, not an error; the caller treats
    /// it as "command did not take".
    ///
    /// # Errors
    ///
    /// Returns a protocol error only if the request itself fails (network,
    /// timeout, malformed body).
    pub async fn send_act(&self, device_id: &str, act: &str, val: Option<&str>) -> Result<bool> {
        let url = format!("{}/md_openapi/home_assistant/ctrl", self.base_url);

        let mut body = json!({
            "device_id": device_id,
            "act": act,
        });
        if let Some(val) = val {
            body["val"] = json!(val);
        }

        tracing::debug!(device_id, act, val = val.unwrap_or(""), "sending control command");

        let response = self
            .signed_request(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(ProtocolError::Http)?;

        if !response.status().is_success() {
            tracing::warn!(
                device_id,
                act,
                status = response.status().as_u16(),
                "control command rejected with HTTP error"
            );
            return Ok(false);
        }

        let envelope: Envelope<EmptyPayload> =
            response.json().await.map_err(ProtocolError::Http)?;
        if envelope.errcode != 0 {
            tracing::warn!(
                device_id,
                act,
                errcode = envelope.errcode,
                msg = %envelope.msg,
                "control command rejected by cloud"
            );
            return Ok(false);
        }

        Ok(true)
    }
}
