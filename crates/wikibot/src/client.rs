//! The request orchestrator and the drivers built on top of it.
//!
//! [`Bot::request`] owns all recovery policy: a stale CSRF token is refreshed
//! and the original request re-issued; a lag-throttled request is paused and
//! re-issued up to a configured ceiling. Both run as an explicit bounded loop,
//! so no two attempts of the same logical request are ever in flight at once.

use std::future::Future;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::batch::{self, BatchSummary};
use crate::config::{BotConfig, RequestOptions};
use crate::error::{ApiError, Error};
use crate::params::{Param, Params};
use crate::title::{NamespaceMap, Title};
use crate::transport::{CallStatsSnapshot, Transport};

/// Deliberately invalid token sentinel. The first privileged call always
/// earns a `badtoken` and round-trips through refresh.
pub const INVALID_TOKEN: &str = "%notoken%";

/// Per-engine mutable session state. Written only by the token-refresh path
/// and the login flow.
#[derive(Debug)]
struct Session {
    csrf_token: String,
    login_state: Map<String, Value>,
    logged_in: bool,
    namespaces: Option<NamespaceMap>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            csrf_token: INVALID_TOKEN.to_string(),
            login_state: Map::new(),
            logged_in: false,
            namespaces: None,
        }
    }
}

pub struct Bot {
    config: BotConfig,
    transport: Transport,
    session: Mutex<Session>,
}

impl Bot {
    pub fn new(config: BotConfig) -> Result<Self, Error> {
        let transport = Transport::new(&config)?;
        Ok(Self {
            config,
            transport,
            session: Mutex::new(Session::default()),
        })
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn stats(&self) -> CallStatsSnapshot {
        self.transport.stats().snapshot()
    }

    pub async fn logged_in(&self) -> bool {
        self.session.lock().await.logged_in
    }

    /// Decompose a page identifier against the namespace table loaded by
    /// [`Bot::site_info`]. `None` until a table exists or when the input is
    /// not a valid title.
    pub async fn new_from_text(&self, raw: &str) -> Option<Title> {
        let session = self.session.lock().await;
        session.namespaces.as_ref()?.new_from_text(raw)
    }

    /// A copy of the loaded namespace table, if any.
    pub async fn namespace_map(&self) -> Option<NamespaceMap> {
        self.session.lock().await.namespaces.clone()
    }

    /// Issue one logical request, transparently absorbing stale-token and
    /// lag-throttle responses up to their configured ceilings.
    pub async fn request(
        &self,
        mut params: Params,
        options: RequestOptions,
    ) -> Result<Value, Error> {
        let mut lag_retries = 0usize;
        let mut token_retries = 0usize;

        loop {
            let encoded = self.encode_params(&params);
            let body = self.transport.execute(&options, &encoded).await?;

            if !body.is_object() {
                return Err(Error::InvalidResponse {
                    body: body.to_string(),
                });
            }

            let Some(error) = body.get("error") else {
                self.absorb_namespace_data(&body).await;
                return Ok(body);
            };
            let code = error
                .get("code")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error")
                .to_string();
            let info = error
                .get("info")
                .and_then(Value::as_str)
                .unwrap_or("unknown info")
                .to_string();

            match code.as_str() {
                "badtoken" if token_retries < self.config.max_token_retries => {
                    token_retries += 1;
                    debug!(attempt = token_retries, "stale token, refreshing and re-issuing");
                    let fresh = self.refresh_csrf_token().await?;
                    params.set("token", fresh);
                }
                "maxlag" if lag_retries < self.config.max_lag_retries => {
                    lag_retries += 1;
                    warn!(
                        attempt = lag_retries,
                        pause_ms = self.config.retry_pause_ms,
                        "server lagged, backing off before re-issue"
                    );
                    tokio::time::sleep(Duration::from_millis(self.config.retry_pause_ms)).await;
                }
                _ => {
                    return Err(Error::Api(ApiError {
                        code,
                        info,
                        response: body,
                        request: encoded,
                    }));
                }
            }
        }
    }

    /// Run a query to exhaustion, threading the server's continuation fields
    /// into each follow-up call, up to `call_limit` calls. Strictly
    /// sequential; the first rejection aborts the whole sequence.
    pub async fn continued_query(
        &self,
        params: Params,
        call_limit: usize,
    ) -> Result<Vec<Value>, Error> {
        let mut params = params;
        let mut responses = Vec::new();

        while responses.len() < call_limit {
            let response = self.request(params.clone(), RequestOptions::default()).await?;
            let continuation = response.get("continue").and_then(Value::as_object).cloned();
            responses.push(response);

            let Some(continuation) = continuation else {
                break;
            };
            // continuation fields override same-named query fields
            for (key, value) in &continuation {
                let text = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                params.set(key.clone(), Param::Text(text));
            }
        }

        Ok(responses)
    }

    /// Split an oversized multi-value field into chunks of the account's
    /// per-call cap and run one request per chunk, sequentially. Per-chunk
    /// API errors are recorded in that chunk's slot; a too-many-values code
    /// aborts the whole operation, because it means the configured cap
    /// exceeds what the account is permitted.
    pub async fn mass_query(
        &self,
        params: Params,
        field: &str,
    ) -> Result<Vec<Result<Value, Error>>, Error> {
        let values = match params.get(field) {
            Some(Param::List(values)) => values.clone(),
            Some(Param::Text(value)) => vec![value.clone()],
            _ => Vec::new(),
        };
        let limit = self.config.api_limit();
        let mut outcomes = Vec::with_capacity(values.len().div_ceil(limit.max(1)));

        for chunk in values.chunks(limit) {
            let mut chunk_params = params.clone();
            chunk_params.set(field, Param::List(chunk.to_vec()));
            match self.request(chunk_params, RequestOptions::default()).await {
                Ok(response) => outcomes.push(Ok(response)),
                Err(error) => match error.code() {
                    Some(code @ ("toomanyvalues" | "too-many-titles")) => {
                        return Err(Error::BatchLimit {
                            field: field.to_string(),
                            limit,
                            code: code.to_string(),
                        });
                    }
                    _ => outcomes.push(Err(error)),
                },
            }
        }

        Ok(outcomes)
    }

    /// [`batch::batch_operation`] with this engine's configured concurrency.
    pub async fn batch_operation<T, W, Fut, R, E>(&self, items: &[T], worker: W) -> BatchSummary
    where
        W: Fn(&T, usize) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        batch::batch_operation(items, worker, self.config.default_concurrency).await
    }

    /// [`batch::series_batch_operation`] with this engine's configured delay.
    pub async fn series_batch_operation<T, W, Fut, R, E>(
        &self,
        items: &[T],
        worker: W,
    ) -> BatchSummary
    where
        W: Fn(&T, usize) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        batch::series_batch_operation(
            items,
            worker,
            Duration::from_millis(self.config.default_delay_ms),
        )
        .await
    }

    /// Fetch siteinfo and rebuild the namespace table from it.
    pub async fn site_info(&self) -> Result<Value, Error> {
        let params = Params::new()
            .with("action", "query")
            .with("meta", "siteinfo")
            .with(
                "siprop",
                Param::List(vec![
                    "general".to_string(),
                    "namespaces".to_string(),
                    "namespacealiases".to_string(),
                ]),
            );
        self.request(params, RequestOptions::default()).await
    }

    /// The cached CSRF token, fetching a fresh one if only the sentinel is
    /// held.
    pub async fn csrf_token(&self) -> Result<String, Error> {
        {
            let session = self.session.lock().await;
            if session.csrf_token != INVALID_TOKEN {
                return Ok(session.csrf_token.clone());
            }
        }
        self.refresh_csrf_token().await
    }

    /// Unconditionally fetch a fresh CSRF token and install it in the
    /// session.
    ///
    /// This is a single bounded sub-call straight through the transport, not
    /// a recursive `request`: any error the refresh itself comes back with,
    /// `badtoken` and `maxlag` included, is terminal. Lag recovery applies to
    /// logical requests, not to this sub-call.
    pub async fn refresh_csrf_token(&self) -> Result<String, Error> {
        let params = Params::new().with("action", "query").with("meta", "tokens");
        let encoded = self.encode_params(&params);
        let body = self
            .transport
            .execute(&RequestOptions::default(), &encoded)
            .await?;
        if let Some(error) = body.get("error") {
            return Err(Error::Api(ApiError {
                code: error
                    .get("code")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown_error")
                    .to_string(),
                info: error
                    .get("info")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown info")
                    .to_string(),
                response: body,
                request: encoded,
            }));
        }

        let token = body
            .pointer("/query/tokens/csrftoken")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| Error::MissingField {
                expected: "query.tokens.csrftoken",
                response: body.clone(),
            })?;

        let mut session = self.session.lock().await;
        session.csrf_token = token.clone();
        if let Some(tokens) = body.pointer("/query/tokens").and_then(Value::as_object) {
            for (key, value) in tokens {
                session.login_state.insert(key.clone(), value.clone());
            }
        }
        Ok(token)
    }

    /// Log in with the legacy `action=login` flow and remember the identity
    /// fields the server returns. Invalidates any cached CSRF token.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), Error> {
        let token_response = self
            .request(
                Params::new()
                    .with("action", "query")
                    .with("meta", "tokens")
                    .with("type", "login"),
                RequestOptions::default(),
            )
            .await?;
        let login_token = token_response
            .pointer("/query/tokens/logintoken")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| Error::MissingField {
                expected: "query.tokens.logintoken",
                response: token_response.clone(),
            })?;

        let response = self
            .request(
                Params::new()
                    .with("action", "login")
                    .with("lgname", username)
                    .with("lgpassword", password)
                    .with("lgtoken", login_token),
                RequestOptions::post(),
            )
            .await?;
        let login = response.get("login").and_then(Value::as_object).cloned();
        let result = login
            .as_ref()
            .and_then(|login| login.get("result"))
            .and_then(Value::as_str);

        if result == Some("Success") {
            let mut session = self.session.lock().await;
            if let Some(login) = login {
                for (key, value) in login {
                    session.login_state.insert(key, value);
                }
            }
            session.logged_in = true;
            session.csrf_token = INVALID_TOKEN.to_string();
            return Ok(());
        }

        let reason = login
            .as_ref()
            .and_then(|login| login.get("reason"))
            .and_then(Value::as_str)
            .or(result)
            .unwrap_or("unknown error");
        Err(Error::LoginFailed {
            reason: reason.to_string(),
        })
    }

    /// Base pairs plus caller params; caller values win for the fields both
    /// define.
    fn encode_params(&self, params: &Params) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(params.len() + 3);
        if params.get("format").is_none() {
            pairs.push(("format".to_string(), "json".to_string()));
        }
        if params.get("formatversion").is_none() {
            pairs.push(("formatversion".to_string(), "2".to_string()));
        }
        if let Some(maxlag) = self.config.maxlag
            && params.get("maxlag").is_none()
        {
            pairs.push(("maxlag".to_string(), maxlag.to_string()));
        }
        pairs.extend(params.encode());
        pairs
    }

    async fn absorb_namespace_data(&self, body: &Value) {
        if body.pointer("/query/namespaces").is_none() {
            return;
        }
        match NamespaceMap::from_site_info(body) {
            Ok(map) => {
                self.session.lock().await.namespaces = Some(map);
            }
            Err(error) => debug!(%error, "ignoring malformed namespace data"),
        }
    }
}
