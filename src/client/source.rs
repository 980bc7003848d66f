use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use url::Url;

use super::error::FetchError;
use crate::tracker::{decode_history, PositionSample};

/// Where the poll loop gets position history from.
pub trait HistorySource: Send + Sync + 'static {
    fn fetch(
        &self,
        call_sign: &str,
    ) -> impl Future<Output = Result<Vec<PositionSample>, FetchError>> + Send;
}

/// `GET {base}/data/{call_sign}` against the telemetry backend.
pub struct HttpSource {
    client: Client,
    base: Url,
}

impl HttpSource {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, FetchError> {
        if base.cannot_be_a_base() {
            return Err(FetchError::BaseUrl(base.to_string()));
        }
        let client = Client::builder()
            .user_agent(concat!("drone-o-mat/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { client, base })
    }

    pub fn history_url(&self, call_sign: &str) -> Result<Url, FetchError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::BaseUrl(self.base.to_string()))?
            .pop_if_empty()
            .push("data")
            .push(call_sign);
        Ok(url)
    }
}

impl HistorySource for HttpSource {
    async fn fetch(&self, call_sign: &str) -> Result<Vec<PositionSample>, FetchError> {
        let url = self.history_url(call_sign)?;
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.bytes().await?;
        Ok(decode_history(&body)?)
    }
}
