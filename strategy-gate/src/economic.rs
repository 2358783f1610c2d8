// Economic-context filter client
// POST the signal, receive {pass, adjustment}

use anyhow::{bail, Context, Result};
use common::{call_with_retry, RetryPolicy, Shutdown, Signal};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EconomicVerdict {
    #[serde(default)]
    pub pass: bool,
    #[serde(default)]
    pub adjustment: f64,
}

impl EconomicVerdict {
    pub fn pass(adjustment: f64) -> Self {
        Self { pass: true, adjustment }
    }

    pub fn block(adjustment: f64) -> Self {
        Self { pass: false, adjustment }
    }
}

#[async_trait::async_trait]
pub trait EconomicFilter: Send + Sync {
    async fn assess(&self, signal: &Signal) -> Result<EconomicVerdict>;
}

/// Remote filter service
pub struct HttpEconomicFilter {
    url: String,
    client: reqwest::Client,
    policy: RetryPolicy,
    shutdown: Shutdown,
}

impl HttpEconomicFilter {
    pub fn new(url: impl Into<String>, policy: RetryPolicy, shutdown: Shutdown) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            policy,
            shutdown,
        }
    }
}

#[async_trait::async_trait]
impl EconomicFilter for HttpEconomicFilter {
    async fn assess(&self, signal: &Signal) -> Result<EconomicVerdict> {
        let (client, url) = (&self.client, self.url.as_str());
        let verdict = call_with_retry(&self.policy, &self.shutdown, "Economic filter", || async move {
            let response = client
                .post(url)
                .json(signal)
                .send()
                .await
                .with_context(|| format!("POST {} failed", url))?;
            let status = response.status();
            if !status.is_success() {
                bail!("economic filter answered {}", status);
            }
            response
                .json::<EconomicVerdict>()
                .await
                .context("Malformed economic filter response")
        })
        .await?;
        Ok(verdict)
    }
}

/// Fixed verdict; used when no filter service is configured
pub struct StaticFilter {
    verdict: EconomicVerdict,
}

impl StaticFilter {
    pub fn new(verdict: EconomicVerdict) -> Self {
        Self { verdict }
    }

    pub fn pass_through() -> Self {
        Self::new(EconomicVerdict::pass(0.0))
    }
}

#[async_trait::async_trait]
impl EconomicFilter for StaticFilter {
    async fn assess(&self, _signal: &Signal) -> Result<EconomicVerdict> {
        Ok(self.verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::test_support::sample_signal;
    use mockito::Matcher;
    use std::time::Duration;

    #[tokio::test]
    async fn test_http_filter_parses_verdict() {
        let signal = sample_signal("EURUSD", "momentum", 0.91, Utc::now());
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/filter")
            .match_body(Matcher::Json(serde_json::to_value(&signal).unwrap()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"pass": true, "adjustment": -0.05}"#)
            .expect(1)
            .create_async()
            .await;

        let filter = HttpEconomicFilter::new(
            format!("{}/filter", server.url()),
            RetryPolicy::once(Duration::from_secs(2)),
            Shutdown::never(),
        );
        let verdict = filter.assess(&signal).await.unwrap();
        assert_eq!(verdict, EconomicVerdict::pass(-0.05));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_fields_default_to_block() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/filter")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("{}")
            .create_async()
            .await;

        let filter = HttpEconomicFilter::new(
            format!("{}/filter", server.url()),
            RetryPolicy::once(Duration::from_secs(2)),
            Shutdown::never(),
        );
        let verdict = filter
            .assess(&sample_signal("EURUSD", "momentum", 0.91, Utc::now()))
            .await
            .unwrap();
        assert_eq!(verdict, EconomicVerdict::block(0.0));
    }

    #[tokio::test]
    async fn test_server_error_is_transport_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("POST", "/filter").with_status(500).create_async().await;

        let filter = HttpEconomicFilter::new(
            format!("{}/filter", server.url()),
            RetryPolicy::once(Duration::from_secs(2)),
            Shutdown::never(),
        );
        assert!(filter
            .assess(&sample_signal("EURUSD", "momentum", 0.91, Utc::now()))
            .await
            .is_err());
    }
}
