use crate::{
    confirm::ConfirmPolicy,
    error::{
        ConfigError,
        FetchError,
        TransportError,
    },
    nakama::NakamaGateway,
    receipts::HttpReceiptSource,
    session::SessionGuard,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    path::Path,
    time::Duration,
};

/// Client settings, read from a JSON file. Every field has a default, so an
/// empty object is a valid config.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub gateway: GatewayConfig,
    pub receipts: ReceiptsConfig,
    pub session: SessionConfig,
    pub confirm: ConfirmConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub url: String,
    pub server_key: String,
    pub timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:7350".into(),
            server_key: "defaultkey".into(),
            timeout_ms: 10_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReceiptsConfig {
    pub url: String,
    pub timeout_ms: u64,
}

impl Default for ReceiptsConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:4040".into(),
            timeout_ms: 10_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Refresh when the token expires within this many seconds.
    pub refresh_margin_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_margin_secs: 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfirmConfig {
    pub required_tick_delta: u64,
    pub max_poll_rounds: u32,
    pub poll_interval_ms: u64,
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self::from(&ConfirmPolicy::default())
    }
}

impl From<&ConfirmPolicy> for ConfirmConfig {
    /// Intervals beyond `u64::MAX` milliseconds saturate.
    fn from(policy: &ConfirmPolicy) -> Self {
        Self {
            required_tick_delta: policy.required_tick_delta,
            max_poll_rounds: policy.max_poll_rounds,
            poll_interval_ms: u64::try_from(policy.poll_interval.as_millis())
                .unwrap_or(u64::MAX),
        }
    }
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    pub fn confirm_policy(&self) -> ConfirmPolicy {
        ConfirmPolicy {
            required_tick_delta: self.confirm.required_tick_delta,
            max_poll_rounds: self.confirm.max_poll_rounds,
            poll_interval: Duration::from_millis(self.confirm.poll_interval_ms),
        }
    }

    pub fn session_guard(&self) -> SessionGuard {
        SessionGuard::new(Duration::from_secs(self.session.refresh_margin_secs))
    }

    pub fn gateway(&self) -> Result<NakamaGateway, TransportError> {
        NakamaGateway::new(
            &self.gateway.url,
            &self.gateway.server_key,
            Duration::from_millis(self.gateway.timeout_ms),
        )
    }

    pub fn receipt_source(&self) -> Result<HttpReceiptSource, FetchError> {
        HttpReceiptSource::new(
            &self.receipts.url,
            Duration::from_millis(self.receipts.timeout_ms),
        )
    }
}
