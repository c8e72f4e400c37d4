//! The single raw network call, plus the call counters it maintains.
//!
//! No retry logic lives here. Recovery policy of every kind belongs to the
//! orchestrator in [`crate::client`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::{BotConfig, HttpMethod, RequestOptions};
use crate::error::Error;

/// Monotonic call counters. `total` bumps synchronously at dispatch;
/// `resolved` bumps once settlement processing begins, whether the call
/// succeeded or not; exactly one of `fulfilled`/`rejected` bumps per settled
/// call. Once all in-flight calls have settled,
/// `resolved == fulfilled + rejected` and `total >= resolved`.
#[derive(Debug, Default)]
pub struct CallStats {
    total: AtomicU64,
    resolved: AtomicU64,
    fulfilled: AtomicU64,
    rejected: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallStatsSnapshot {
    pub total: u64,
    pub resolved: u64,
    pub fulfilled: u64,
    pub rejected: u64,
}

impl CallStats {
    fn record_dispatch(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_settled(&self, ok: bool) {
        self.resolved.fetch_add(1, Ordering::Relaxed);
        if ok {
            self.fulfilled.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> CallStatsSnapshot {
        CallStatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            fulfilled: self.fulfilled.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

pub(crate) struct Transport {
    client: Client,
    api_url: String,
    stats: Arc<CallStats>,
}

impl Transport {
    pub fn new(config: &BotConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .cookie_store(true)
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            stats: Arc::new(CallStats::default()),
        })
    }

    pub fn stats(&self) -> Arc<CallStats> {
        Arc::clone(&self.stats)
    }

    /// Execute one call and decode its JSON body. GET sends the pairs as a
    /// query string, POST as a form-encoded body.
    pub async fn execute(
        &self,
        options: &RequestOptions,
        pairs: &[(String, String)],
    ) -> Result<Value, Error> {
        if self.api_url.is_empty() {
            self.stats.record_dispatch();
            self.stats.record_settled(false);
            return Err(Error::MissingApiUrl);
        }

        let mut builder = match options.method {
            HttpMethod::Get => self.client.get(&self.api_url).query(pairs),
            HttpMethod::Post => self.client.post(&self.api_url).form(pairs),
        };
        if let Some(timeout_ms) = options.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }

        self.stats.record_dispatch();
        debug!(method = ?options.method, url = %self.api_url, "dispatching API call");
        let outcome = match builder.send().await {
            Ok(response) => match response.error_for_status() {
                Ok(response) => response.json::<Value>().await.map_err(Error::from),
                Err(error) => Err(Error::from(error)),
            },
            Err(error) => Err(Error::from(error)),
        };
        self.stats.record_settled(outcome.is_ok());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BotConfig;

    #[test]
    fn stats_invariants_hold_after_mixed_settlements() {
        let stats = CallStats::default();
        stats.record_dispatch();
        stats.record_settled(true);
        stats.record_dispatch();
        stats.record_settled(false);
        stats.record_dispatch();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.resolved, 2);
        assert_eq!(snapshot.fulfilled, 1);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.resolved, snapshot.fulfilled + snapshot.rejected);
        assert!(snapshot.total >= snapshot.resolved);
    }

    #[tokio::test]
    async fn missing_api_url_fails_without_sending() {
        let transport = Transport::new(&BotConfig::default()).expect("transport");
        let result = transport
            .execute(&RequestOptions::default(), &[])
            .await;
        assert!(matches!(result, Err(Error::MissingApiUrl)));
        let snapshot = transport.stats().snapshot();
        assert_eq!(snapshot.total, 1);
        assert_eq!(snapshot.rejected, 1);
    }

    #[tokio::test]
    async fn decodes_json_bodies() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"query": {"pages": []}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = BotConfig {
            api_url: server.uri(),
            ..BotConfig::default()
        };
        let transport = Transport::new(&config).expect("transport");
        let body = transport
            .execute(
                &RequestOptions::default(),
                &[("action".to_string(), "query".to_string())],
            )
            .await
            .expect("body");
        assert!(body.get("query").is_some());

        let snapshot = transport.stats().snapshot();
        assert_eq!(snapshot.fulfilled, 1);
        assert_eq!(snapshot.rejected, 0);
    }

    #[tokio::test]
    async fn server_errors_are_transport_failures() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let config = BotConfig {
            api_url: server.uri(),
            ..BotConfig::default()
        };
        let transport = Transport::new(&config).expect("transport");
        let result = transport.execute(&RequestOptions::default(), &[]).await;
        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(transport.stats().snapshot().rejected, 1);
    }
}
