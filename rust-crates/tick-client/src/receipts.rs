use crate::{
    backend::ReceiptSource,
    error::FetchError,
    messages::{
        ReceiptBatch,
        Tick,
    },
};
use serde::Serialize;
use std::{
    fmt,
    time::Duration,
};
use tracing::debug;

/// Reads receipt windows from the game shard's HTTP query endpoint.
#[derive(Clone)]
pub struct HttpReceiptSource {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptsRequest {
    start_tick: Tick,
}

impl HttpReceiptSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl fmt::Display for HttpReceiptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HttpReceiptSource({})", self.base_url)
    }
}

impl ReceiptSource for HttpReceiptSource {
    async fn fetch_receipts(&self, start_tick: Tick) -> Result<ReceiptBatch, FetchError> {
        let url = format!("{}/query/receipts/list", self.base_url);
        let res = self
            .http
            .post(url)
            .json(&ReceiptsRequest { start_tick })
            .send()
            .await?;
        let status = res.status();
        let bytes = res.bytes().await?;
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        let batch: ReceiptBatch = serde_json::from_slice(&bytes).map_err(FetchError::Decode)?;
        debug!(
            start_tick = batch.start_tick,
            end_tick = batch.end_tick,
            receipts = batch.receipts.len(),
            "fetched receipt window"
        );
        Ok(batch)
    }
}
