// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-request signing for the Mindor cloud REST API.
//!
//! Every REST call carries a `Sign` header: the MD5 digest of the
//! URL-encoded signing parameters. Mutating calls additionally carry the
//! same parameters flattened into individual headers.

use chrono::Utc;
use md5::{Digest, Md5};

/// Application id expected by the cloud API.
const APP_ID: &str = "q8mziWq3zcgQLUh8";
/// Request mode expected by the cloud API.
const MODE: &str = "normal";
/// Static signing key expected by the cloud API.
const SIGNING_KEY: &str = "MjNTazzrYispfNu7yn";
/// Length of the per-request nonce.
const NONCE_LEN: usize = 16;

/// Signing parameters for one REST request.
///
/// The parameter order is part of the wire contract: the signature is the
/// MD5 of the query string built in declaration order (`AppId`, `Mode`,
/// `NonceStr`, `Timestamp`, `key`).
#[derive(Debug, Clone)]
pub struct SigningParams {
    /// Application id.
    pub app_id: String,
    /// Request mode.
    pub mode: String,
    /// Random per-request nonce.
    pub nonce_str: String,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
    /// Static signing key.
    pub key: String,
}

impl SigningParams {
    /// Generates fresh parameters with a random nonce and the current time.
    #[must_use]
    pub fn generate() -> Self {
        let nonce: String = uuid::Uuid::new_v4().simple().to_string();
        Self {
            app_id: APP_ID.to_string(),
            mode: MODE.to_string(),
            nonce_str: nonce[..NONCE_LEN].to_string(),
            timestamp: Utc::now().timestamp(),
            key: SIGNING_KEY.to_string(),
        }
    }

    /// Builds the URL-encoded query string over the parameters, in order.
    #[must_use]
    pub fn query_string(&self) -> String {
        let pairs = [
            ("AppId", self.app_id.as_str()),
            ("Mode", self.mode.as_str()),
            ("NonceStr", self.nonce_str.as_str()),
            ("Timestamp", &self.timestamp.to_string()),
            ("key", self.key.as_str()),
        ];
        pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Computes the `Sign` header value: lowercase hex MD5 of the query string.
    #[must_use]
    pub fn sign(&self) -> String {
        let mut hasher = Md5::new();
        hasher.update(self.query_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Returns the parameters flattened into header name/value pairs.
    #[must_use]
    pub fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("AppId".to_string(), self.app_id.clone()),
            ("Mode".to_string(), self.mode.clone()),
            ("NonceStr".to_string(), self.nonce_str.clone()),
            ("Timestamp".to_string(), self.timestamp.to_string()),
            ("key".to_string(), self.key.clone()),
        ]
    }
}
