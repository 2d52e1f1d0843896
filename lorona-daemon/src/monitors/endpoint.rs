//! HTTP endpoint prober.
//!
//! Sends a `HEAD` request per check. Transport failures (DNS, connect,
//! timeout) are reported as response code `0` rather than as errors.

use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use lorona_core::config::EndpointConfig;
use lorona_core::event::UptimeResponse;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Probes one configured endpoint.
pub struct EndpointProber {
    client: reqwest::Client,
    endpoint: String,
    interval: Duration,
    tx: mpsc::Sender<UptimeResponse>,
}

impl EndpointProber {
    pub fn new(config: &EndpointConfig, tx: mpsc::Sender<UptimeResponse>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(concat!("lorona/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            interval: config.check_interval(),
            tx,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// One `HEAD` request.
    pub async fn probe(&self) -> UptimeResponse {
        let started = Instant::now();
        let response_code = match self.client.head(&self.endpoint).send().await {
            Ok(response) => response.status().as_u16(),
            Err(e) => {
                tracing::warn!(endpoint = %self.endpoint, error = %e, "endpoint probe failed");
                0
            }
        };

        UptimeResponse {
            endpoint: self.endpoint.clone(),
            response_code,
            response_time_secs: started.elapsed().as_secs_f64(),
            checked_at: Utc::now(),
        }
    }

    /// Probes until cancelled or the queue closes.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            endpoint = %self.endpoint,
            interval_secs = self.interval.as_secs(),
            "endpoint prober started"
        );

        loop {
            let response = self.probe().await;
            tracing::debug!(
                endpoint = %self.endpoint,
                code = response.response_code,
                secs = response.response_time_secs,
                "endpoint probed"
            );
            if self.tx.send(response).await.is_err() {
                tracing::debug!(endpoint = %self.endpoint, "uptime queue closed");
                break;
            }
            if !super::wait_next(&cancel, self.interval).await {
                break;
            }
        }

        tracing::info!(endpoint = %self.endpoint, "endpoint prober stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: &str) -> EndpointConfig {
        EndpointConfig {
            endpoint: endpoint.to_owned(),
            check_interval: "1s".to_owned(),
            timeout_secs: 1,
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_reports_code_zero() {
        // nothing listens on port 1 of the loopback interface
        let (tx, _rx) = mpsc::channel(1);
        let prober = EndpointProber::new(&config("http://127.0.0.1:1/health"), tx).unwrap();

        let response = prober.probe().await;
        assert_eq!(response.response_code, 0);
        assert!(!response.is_up());
        assert_eq!(response.endpoint, "http://127.0.0.1:1/health");
    }

    #[tokio::test]
    async fn run_pushes_results_until_cancelled() {
        let (tx, mut rx) = mpsc::channel(4);
        let prober = EndpointProber::new(&config("http://127.0.0.1:1/"), tx).unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(prober.run(cancel.clone()));

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.response_code, 0);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
