// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration for the cloud synchronization core.

use std::time::Duration;

/// Reconnection policy for the push channel.
///
/// The Mindor push endpoint is retried with a fixed delay between attempts.
/// Once the attempt counter exceeds `max_attempts` the connection enters a
/// terminal fatally-stopped state and no further retries are scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Fixed delay between reconnection attempts.
    pub delay: Duration,
    /// Maximum number of attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(3),
            max_attempts: 30,
        }
    }
}

/// Configuration for a Mindor cloud connection.
///
/// Holds the credentials and endpoints plus the timing knobs of the
/// synchronization core. All timing values have defaults matching the
/// observed cloud behavior; none of them is load-bearing beyond "a short
/// grace period" and they can be tuned per deployment.
///
/// # Examples
///
/// ```
/// use mindor_lib::CloudConfig;
/// use std::time::Duration;
///
/// let config = CloudConfig::new("token-abc", "wx-user-1")
///     .with_refresh_interval(Duration::from_secs(60))
///     .with_optimistic_window(Duration::from_secs(15));
/// assert_eq!(config.user_id(), "wx-user-1");
/// ```
#[derive(Debug, Clone)]
pub struct CloudConfig {
    token: String,
    user_id: String,
    api_base: String,
    websocket_url: String,
    request_timeout: Duration,
    connect_timeout: Duration,
    refresh_interval: Duration,
    optimistic_window: Duration,
    command_interval: Duration,
    post_open_grace: Duration,
    reconnect: ReconnectPolicy,
}

impl CloudConfig {
    /// Default REST API base URL.
    pub const DEFAULT_API_BASE: &'static str = "https://lock1.wangjile.cn";
    /// Default push channel endpoint.
    pub const DEFAULT_WEBSOCKET_URL: &'static str = "wss://lock.wangjile.cn/cable";
    /// Default REST request timeout.
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
    /// Default WebSocket connect timeout.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    /// Default interval between full REST refreshes of the device list.
    pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);
    /// Default window during which a caller's own write wins over pushes.
    pub const DEFAULT_OPTIMISTIC_WINDOW: Duration = Duration::from_secs(30);
    /// Default minimum interval between commands for one entity.
    pub const DEFAULT_COMMAND_INTERVAL: Duration = Duration::from_secs(1);
    /// Default grace period after a successful open before a close event is
    /// classified as caller-initiated.
    pub const DEFAULT_POST_OPEN_GRACE: Duration = Duration::from_secs(1);

    /// Creates a configuration for the given bearer token and user id.
    #[must_use]
    pub fn new(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
            api_base: Self::DEFAULT_API_BASE.to_string(),
            websocket_url: Self::DEFAULT_WEBSOCKET_URL.to_string(),
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            refresh_interval: Self::DEFAULT_REFRESH_INTERVAL,
            optimistic_window: Self::DEFAULT_OPTIMISTIC_WINDOW,
            command_interval: Self::DEFAULT_COMMAND_INTERVAL,
            post_open_grace: Self::DEFAULT_POST_OPEN_GRACE,
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Sets a custom REST API base URL.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Sets a custom push channel endpoint.
    #[must_use]
    pub fn with_websocket_url(mut self, url: impl Into<String>) -> Self {
        self.websocket_url = url.into();
        self
    }

    /// Sets the REST request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the WebSocket connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the interval between full REST refreshes.
    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Sets the optimistic-read window.
    #[must_use]
    pub fn with_optimistic_window(mut self, window: Duration) -> Self {
        self.optimistic_window = window;
        self
    }

    /// Sets the minimum interval between commands for one entity.
    #[must_use]
    pub fn with_command_interval(mut self, interval: Duration) -> Self {
        self.command_interval = interval;
        self
    }

    /// Sets the post-open grace period.
    #[must_use]
    pub fn with_post_open_grace(mut self, grace: Duration) -> Self {
        self.post_open_grace = grace;
        self
    }

    /// Sets the reconnection policy.
    #[must_use]
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Returns the bearer token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the user id used for the channel subscription.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns the REST API base URL.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Returns the push channel endpoint.
    #[must_use]
    pub fn websocket_url(&self) -> &str {
        &self.websocket_url
    }

    /// Returns the REST request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Returns the WebSocket connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the interval between full REST refreshes.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Returns the optimistic-read window.
    #[must_use]
    pub fn optimistic_window(&self) -> Duration {
        self.optimistic_window
    }

    /// Returns the minimum interval between commands for one entity.
    #[must_use]
    pub fn command_interval(&self) -> Duration {
        self.command_interval
    }

    /// Returns the post-open grace period.
    #[must_use]
    pub fn post_open_grace(&self) -> Duration {
        self.post_open_grace
    }

    /// Returns the reconnection policy.
    #[must_use]
    pub fn reconnect(&self) -> &ReconnectPolicy {
        &self.reconnect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_values() {
        let config = CloudConfig::new("tok", "user");
        assert_eq!(config.token(), "tok");
        assert_eq!(config.user_id(), "user");
        assert_eq!(config.api_base(), CloudConfig::DEFAULT_API_BASE);
        assert_eq!(config.websocket_url(), CloudConfig::DEFAULT_WEBSOCKET_URL);
        assert_eq!(config.refresh_interval(), Duration::from_secs(300));
        assert_eq!(config.optimistic_window(), Duration::from_secs(30));
        assert_eq!(config.command_interval(), Duration::from_secs(1));
        assert_eq!(config.post_open_grace(), Duration::from_secs(1));
    }

    #[test]
    fn reconnect_policy_defaults() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay, Duration::from_secs(3));
        assert_eq!(policy.max_attempts, 30);
    }

    #[test]
    fn builder_chain() {
        let config = CloudConfig::new("tok", "user")
            .with_api_base("https://example.test")
            .with_websocket_url("wss://example.test/cable")
            .with_request_timeout(Duration::from_secs(5))
            .with_refresh_interval(Duration::from_secs(30))
            .with_optimistic_window(Duration::from_secs(10))
            .with_command_interval(Duration::from_millis(500))
            .with_reconnect_policy(ReconnectPolicy {
                delay: Duration::from_secs(1),
                max_attempts: 5,
            });

        assert_eq!(config.api_base(), "https://example.test");
        assert_eq!(config.websocket_url(), "wss://example.test/cable");
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.refresh_interval(), Duration::from_secs(30));
        assert_eq!(config.optimistic_window(), Duration::from_secs(10));
        assert_eq!(config.command_interval(), Duration::from_millis(500));
        assert_eq!(config.reconnect().max_attempts, 5);
    }
}
