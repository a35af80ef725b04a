//! JSON-RPC Client for the Monitoring API
//!
//! Holds one cached session token per connection. Logins for the same
//! connection are single-flight: concurrent sub-queries share one login and,
//! if it fails, the same error.

use crate::error::TelemetryError;
use crate::records::{
    decode_rows, HostRecord, LatencyProbe, RawHost, RawItem, RawTrigger, TriggerProblem,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Item key of the ICMP response time check
const LATENCY_ITEM_KEY: &str = "icmppingsec";

/// Adapter timeouts and token lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Timeout for `user.login` (milliseconds)
    pub login_timeout_ms: u64,
    /// Timeout for bulk queries (milliseconds)
    pub query_timeout_ms: u64,
    /// How long a session token is reused; keep below the backend session lifetime
    pub token_ttl_secs: u64,
    /// Budget for a whole poll fetch, all sub-queries included (milliseconds)
    pub poll_deadline_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            login_timeout_ms: 5_000,
            query_timeout_ms: 15_000,
            token_ttl_secs: 3_000, // backend sessions last an hour
            poll_deadline_ms: 20_000,
        }
    }
}

impl TelemetryConfig {
    pub fn login_timeout(&self) -> Duration {
        Duration::from_millis(self.login_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn poll_deadline(&self) -> Duration {
        Duration::from_millis(self.poll_deadline_ms)
    }
}

/// Tenant-scoped connection descriptor
#[derive(Clone, Serialize, Deserialize)]
pub struct Connection {
    /// JSON-RPC endpoint, e.g. `https://zabbix.example/api_jsonrpc.php`
    pub url: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Token state of one connection
#[derive(Debug, Default)]
struct TokenSlot {
    state: tokio::sync::Mutex<SlotState>,
    /// Completed login attempts, successful or not
    attempts: AtomicU64,
}

#[derive(Debug, Default)]
struct SlotState {
    token: Option<CachedToken>,
    /// Error of the latest attempt, tagged with its attempt number
    failure: Option<(u64, TelemetryError)>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: String,
}

impl RpcErrorBody {
    fn is_auth_failure(&self) -> bool {
        let text = format!("{} {}", self.message, self.data).to_ascii_lowercase();
        text.contains("re-login")
            || text.contains("session terminated")
            || text.contains("not authorized")
            || text.contains("not authorised")
            || text.contains("incorrect user name or password")
    }
}

/// Client for a Zabbix-style JSON-RPC API
pub struct ZabbixClient {
    http: reqwest::Client,
    config: TelemetryConfig,
    tokens: Mutex<HashMap<(String, String), Arc<TokenSlot>>>,
    request_id: AtomicU64,
}

impl ZabbixClient {
    /// Create a new client
    pub fn new(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        info!("Creating telemetry client with config: {:?}", config);
        let http = reqwest::Client::builder()
            .connect_timeout(config.login_timeout())
            .build()?;
        Ok(Self {
            http,
            config,
            tokens: Mutex::new(HashMap::new()),
            request_id: AtomicU64::new(1),
        })
    }

    /// Host records with interface availability
    pub async fn fetch_hosts(
        &self,
        conn: &Connection,
        host_ids: &[String],
        deadline: Instant,
    ) -> Result<Vec<HostRecord>, TelemetryError> {
        let params = json!({
            "output": ["hostid", "host", "name"],
            "hostids": host_ids,
            "selectInterfaces": ["interfaceid", "available", "type"],
        });
        let rows: Vec<Value> = self.authed_query(conn, "host.get", params, deadline).await?;
        Ok(decode_rows("host.get", rows, RawHost::into_record))
    }

    /// Latest ICMP latency item per host
    pub async fn fetch_latency(
        &self,
        conn: &Connection,
        host_ids: &[String],
        deadline: Instant,
    ) -> Result<Vec<LatencyProbe>, TelemetryError> {
        let params = json!({
            "output": ["itemid", "hostid", "lastvalue", "lastclock"],
            "hostids": host_ids,
            "filter": { "key_": LATENCY_ITEM_KEY },
        });
        let rows: Vec<Value> = self.authed_query(conn, "item.get", params, deadline).await?;
        Ok(decode_rows("item.get", rows, RawItem::into_probe))
    }

    /// Triggers currently in problem state
    pub async fn fetch_problems(
        &self,
        conn: &Connection,
        host_ids: &[String],
        deadline: Instant,
    ) -> Result<Vec<TriggerProblem>, TelemetryError> {
        let params = json!({
            "output": ["triggerid", "description", "priority"],
            "hostids": host_ids,
            "only_true": true,
            "monitored": true,
            "skipDependent": true,
            "filter": { "value": 1 },
            "selectHosts": ["hostid"],
        });
        let rows: Vec<Value> = self.authed_query(conn, "trigger.get", params, deadline).await?;
        Ok(decode_rows("trigger.get", rows, RawTrigger::into_problem))
    }

    /// Run an authenticated query, re-logging in once if the session was rejected
    async fn authed_query<T: DeserializeOwned>(
        &self,
        conn: &Connection,
        method: &str,
        params: Value,
        deadline: Instant,
    ) -> Result<T, TelemetryError> {
        let timeout = self.config.query_timeout();
        let token = self.token(conn, deadline).await?;
        match self
            .call(conn, method, params.clone(), Some(&token), timeout, deadline)
            .await
        {
            Err(TelemetryError::Auth(reason)) => {
                warn!("{} rejected session for {}: {}; re-authenticating", method, conn.url, reason);
                self.invalidate(conn, &token).await;
                let token = self.token(conn, deadline).await?;
                self.call(conn, method, params, Some(&token), timeout, deadline)
                    .await
            }
            other => other,
        }
    }

    /// Cached token for the connection, logging in if absent or expired.
    ///
    /// A caller that waited while another caller's login failed gets that
    /// failure instead of starting a login of its own.
    async fn token(&self, conn: &Connection, deadline: Instant) -> Result<String, TelemetryError> {
        let slot = self.slot(conn)?;
        let seen = slot.attempts.load(Ordering::Acquire);
        let mut state = slot.state.lock().await;
        if let Some(entry) = state.token.as_ref() {
            if entry.expires_at > Instant::now() {
                return Ok(entry.token.clone());
            }
            debug!("Session token for {} expired", conn.url);
        }
        if let Some((attempt, error)) = state.failure.as_ref() {
            if *attempt > seen {
                debug!("Sharing failed login {} for {}", attempt, conn.url);
                return Err(error.clone());
            }
        }

        let outcome = self.login(conn, deadline).await;
        let attempt = slot.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        match outcome {
            Ok(token) => {
                state.token = Some(CachedToken {
                    token: token.clone(),
                    expires_at: Instant::now() + self.config.token_ttl(),
                });
                state.failure = None;
                Ok(token)
            }
            Err(error) => {
                warn!("Login to {} failed: {}", conn.url, error);
                state.token = None;
                state.failure = Some((attempt, error.clone()));
                Err(error)
            }
        }
    }

    /// Drop the cached token, unless another caller already replaced it
    async fn invalidate(&self, conn: &Connection, failed: &str) {
        let Ok(slot) = self.slot(conn) else {
            return;
        };
        let mut state = slot.state.lock().await;
        if state.token.as_ref().is_some_and(|entry| entry.token == failed) {
            state.token = None;
        }
    }

    async fn login(&self, conn: &Connection, deadline: Instant) -> Result<String, TelemetryError> {
        info!("Logging in to {} as {}", conn.url, conn.username);
        let params = json!({ "username": conn.username, "password": conn.password });
        let result: Value = self
            .call(conn, "user.login", params, None, self.config.login_timeout(), deadline)
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| TelemetryError::Decode("user.login returned a non-string token".into()))
    }

    fn slot(&self, conn: &Connection) -> Result<Arc<TokenSlot>, TelemetryError> {
        let mut tokens = self
            .tokens
            .lock()
            .map_err(|e| TelemetryError::Http(format!("Lock error: {}", e)))?;
        Ok(tokens
            .entry((conn.url.clone(), conn.username.clone()))
            .or_default()
            .clone())
    }

    /// One JSON-RPC round trip bounded by `timeout` and the request deadline
    async fn call<T: DeserializeOwned>(
        &self,
        conn: &Connection,
        method: &str,
        params: Value,
        token: Option<&str>,
        timeout: Duration,
        deadline: Instant,
    ) -> Result<T, TelemetryError> {
        let now = Instant::now();
        if now >= deadline {
            return Err(TelemetryError::DeadlineExceeded(method.to_string()));
        }
        let until = (now + timeout).min(deadline);
        let budget_ms = until.saturating_duration_since(now).as_millis() as u64;

        match tokio::time::timeout_at(until, self.send(conn, method, params, token)).await {
            Ok(result) => result,
            Err(_) => Err(TelemetryError::Timeout {
                method: method.to_string(),
                timeout_ms: budget_ms,
            }),
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        conn: &Connection,
        method: &str,
        params: Value,
        token: Option<&str>,
    ) -> Result<T, TelemetryError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        let mut request = self.http.post(&conn.url).json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        debug!("RPC {} (id {}) to {}", method, id, conn.url);
        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(TelemetryError::Auth(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(TelemetryError::Http(format!("{} returned HTTP {}", method, status)));
        }

        let envelope: RpcResponse<T> = response.json().await?;
        if let Some(error) = envelope.error {
            if error.is_auth_failure() {
                return Err(TelemetryError::Auth(format!("{} {}", error.message, error.data)));
            }
            return Err(TelemetryError::Rpc {
                method: method.to_string(),
                code: error.code,
                message: format!("{} {}", error.message, error.data).trim().to_string(),
            });
        }
        envelope
            .result
            .ok_or_else(|| TelemetryError::Decode(format!("{} response has no result", method)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failure_detection() {
        let expired = RpcErrorBody {
            code: -32602,
            message: "Invalid params.".into(),
            data: "Session terminated, re-login, please.".into(),
        };
        assert!(expired.is_auth_failure());

        let other = RpcErrorBody {
            code: -32500,
            message: "Application error.".into(),
            data: "No permissions to referred object".into(),
        };
        assert!(!other.is_auth_failure());
    }

    #[test]
    fn test_connection_debug_hides_password() {
        let conn = Connection {
            url: "http://zbx".into(),
            username: "api".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{:?}", conn).contains("hunter2"));
    }

    #[tokio::test]
    async fn test_past_deadline_fails_fast() {
        let client = ZabbixClient::new(TelemetryConfig::default()).unwrap();
        let conn = Connection {
            url: "http://127.0.0.1:9/api_jsonrpc.php".into(),
            username: "api".into(),
            password: "secret".into(),
        };
        let err = client
            .fetch_hosts(&conn, &["1".to_string()], Instant::now())
            .await
            .unwrap_err();
        assert!(matches!(err, TelemetryError::DeadlineExceeded(_)));
    }
}
