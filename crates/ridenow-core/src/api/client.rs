//! Authenticated client for the RideNow REST API.
//!
//! Every request gets `Authorization: Bearer <access token>` attached, read
//! fresh from the credential store (falling back to the in-memory default).
//! A 401 starts one refresh cycle against `users/refresh-token`; requests that
//! hit a 401 while that cycle is in flight queue behind it and are replayed
//! with the new token once it settles. Each request is replayed at most once.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use reqwest::{header, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, warn};

use super::error::{ApiError, RefreshError};
use super::transport::{ApiResponse, RequestBody, ReqwestTransport, Transport, TransportRequest};
use crate::auth::credentials::{CredentialStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::config::Config;
use crate::models::{Envelope, TokenPair};

// ============================================================================
// Constants
// ============================================================================

/// Endpoint that exchanges a refresh token for a new token pair
pub const REFRESH_PATH: &str = "users/refresh-token";

/// Buffered auth events per subscriber before it starts lagging
const AUTH_EVENT_CAPACITY: usize = 16;

/// Session-level outcomes of a refresh cycle, broadcast to subscribers.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A new token pair was issued and persisted.
    TokensRefreshed { access_token: String },
    /// The refresh failed and both tokens were deleted. The user must log in again.
    /// `access_token` is the rejected token the failed cycle tried to replace.
    SessionExpired {
        access_token: Option<String>,
        reason: RefreshError,
    },
}

impl fmt::Debug for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthEvent::TokensRefreshed { .. } => f.write_str("TokensRefreshed"),
            AuthEvent::SessionExpired { reason, .. } => {
                f.debug_struct("SessionExpired").field("reason", reason).finish()
            }
        }
    }
}

/// Per-request extras: query parameters and raw header overrides.
/// An explicit `Authorization` header takes precedence over the attached bearer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestConfig {
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl RequestConfig {
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

type Waiter = oneshot::Sender<Result<String, RefreshError>>;

enum RefreshState {
    /// No refresh in flight; holds how the last cycle settled
    Idle(Option<Settled>),
    /// A refresh is in flight; the requests queued behind it
    Refreshing(Vec<Waiter>),
}

/// Outcome of a finished cycle and the token it replaced. A 401 for that
/// same token arriving after the cycle reuses this instead of refreshing again.
struct Settled {
    replaced: Option<String>,
    outcome: Result<String, RefreshError>,
}

/// What a rejected request does next, decided under the refresh lock
enum Recovery {
    Wait(oneshot::Receiver<Result<String, RefreshError>>),
    Reuse(Result<String, RefreshError>),
    Lead,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialStore>,
    default_token: RwLock<Option<String>>,
    refresh: Mutex<RefreshState>,
    events: broadcast::Sender<AuthEvent>,
}

impl ClientInner {
    // The state is only touched in short non-awaiting sections, so a poisoned
    // lock still holds a consistent value
    fn refresh_state(&self) -> MutexGuard<'_, RefreshState> {
        self.refresh.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Ends a refresh cycle when dropped: returns the gate to `Idle` and hands
/// the outcome to every queued request. A cycle dropped before an outcome
/// was recorded releases its queue with `RefreshError::Abandoned`.
struct RefreshCycle<'a> {
    inner: &'a ClientInner,
    replacing: Option<String>,
    outcome: Option<Result<String, RefreshError>>,
}

impl Drop for RefreshCycle<'_> {
    fn drop(&mut self) {
        let recorded = self.outcome.take();
        let outcome = recorded.clone().unwrap_or(Err(RefreshError::Abandoned));
        // An abandoned cycle is not remembered, so the next 401 may try again
        let settled = recorded.map(|outcome| Settled {
            replaced: self.replacing.take(),
            outcome,
        });
        let waiters = match std::mem::replace(&mut *self.inner.refresh_state(), RefreshState::Idle(settled)) {
            RefreshState::Refreshing(waiters) => waiters,
            RefreshState::Idle(_) => Vec::new(),
        };
        if !waiters.is_empty() {
            debug!(queued = waiters.len(), refreshed = outcome.is_ok(), "Releasing queued requests");
        }
        for waiter in waiters {
            // A closed receiver means that caller went away; nothing to deliver
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// API client for RideNow.
/// Clone is cheap - all clones share the token state, refresh gate and transport.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, credentials: Arc<dyn CredentialStore>) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            inner: Arc::new(ClientInner {
                transport,
                credentials,
                default_token: RwLock::new(None),
                refresh: Mutex::new(RefreshState::Idle(None)),
                events,
            }),
        }
    }

    /// Create a client over `reqwest` using the configured base URL and timeout
    pub fn from_config(config: &Config, credentials: Arc<dyn CredentialStore>) -> anyhow::Result<Self> {
        let transport = ReqwestTransport::new(&config.api_url, config.timeout())?;
        Ok(Self::new(Arc::new(transport), credentials))
    }

    pub fn credentials(&self) -> Arc<dyn CredentialStore> {
        Arc::clone(&self.inner.credentials)
    }

    /// Set or clear the in-memory default bearer token
    pub fn set_default_token(&self, token: Option<String>) {
        let mut slot = self
            .inner
            .default_token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = token;
    }

    pub fn default_token(&self) -> Option<String> {
        self.inner
            .default_token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Receive refresh outcomes. Events sent before subscribing are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.inner.refresh_state(), RefreshState::Refreshing(_))
    }

    /// Number of requests waiting on the in-flight refresh
    pub fn queued_requests(&self) -> usize {
        match &*self.inner.refresh_state() {
            RefreshState::Refreshing(waiters) => waiters.len(),
            RefreshState::Idle(_) => 0,
        }
    }

    // ===== Request pipeline =====

    /// Send a request with bearer attachment and refresh-on-401 handling.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        config: RequestConfig,
    ) -> Result<ApiResponse, ApiError> {
        let request = TransportRequest {
            method,
            path: path.to_string(),
            query: config.query,
            headers: config.headers,
            body,
        };
        self.dispatch(&request).await
    }

    /// Send a request and decode the response envelope
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        config: RequestConfig,
    ) -> Result<Envelope<T>, ApiError> {
        let response = self.request(method, path, body, config).await?;
        response
            .json()
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", path, e)))
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Vec<(String, String)>,
    ) -> Result<Envelope<T>, ApiError> {
        let config = RequestConfig {
            query,
            ..RequestConfig::default()
        };
        self.call(Method::GET, path, RequestBody::Empty, config).await
    }

    pub async fn send_json<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<Envelope<T>, ApiError> {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to encode request body: {}", e)))?;
        self.call(method, path, RequestBody::Json(body), RequestConfig::default())
            .await
    }

    async fn dispatch(&self, request: &TransportRequest) -> Result<ApiResponse, ApiError> {
        let token = self.current_token().await;
        let outgoing = Self::authorize(request, token.as_deref());
        let response = self.inner.transport.send(&outgoing).await?;
        if response.status != 401 {
            return Self::check(response);
        }

        debug!(method = %request.method, path = %request.path, "Access token rejected");
        let fresh = self.recover_token(outgoing.bearer()).await?;

        // The one retry this request gets; a second 401 is surfaced as-is
        let mut replay = request.clone();
        replay.set_header(header::AUTHORIZATION.as_str(), format!("Bearer {}", fresh));
        debug!(method = %request.method, path = %request.path, "Replaying with refreshed token");
        let response = self.inner.transport.send(&replay).await?;
        Self::check(response)
    }

    fn authorize(request: &TransportRequest, token: Option<&str>) -> TransportRequest {
        let mut outgoing = request.clone();
        if let Some(token) = token {
            if outgoing.header(header::AUTHORIZATION.as_str()).is_none() {
                outgoing.set_header(header::AUTHORIZATION.as_str(), format!("Bearer {}", token));
            }
        }
        outgoing
    }

    fn check(response: ApiResponse) -> Result<ApiResponse, ApiError> {
        if response.is_success() {
            Ok(response)
        } else {
            Err(ApiError::from_status(response.status, &response.body))
        }
    }

    async fn current_token(&self) -> Option<String> {
        match self.inner.credentials.get(ACCESS_TOKEN_KEY).await {
            Ok(Some(token)) => Some(token),
            Ok(None) => self.default_token(),
            Err(e) => {
                warn!(error = %e, "Failed to read access token, using in-memory default");
                self.default_token()
            }
        }
    }

    // ===== Refresh coordination =====

    /// Obtain a token to replay with after `rejected` got a 401: join the
    /// in-flight refresh, reuse a token issued since the request was sent,
    /// or run a new refresh cycle.
    async fn recover_token(&self, rejected: Option<&str>) -> Result<String, ApiError> {
        // A cycle may have completed between this request's send and its 401
        if let Some(current) = self.current_token().await {
            if rejected != Some(current.as_str()) {
                debug!("Token changed since request was sent, replaying without refresh");
                return Ok(current);
            }
        }

        // The read above may have suspended across a whole cycle, so check
        // again under the lock before starting another one
        let next = {
            let mut state = self.inner.refresh_state();
            match &mut *state {
                RefreshState::Refreshing(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    debug!(queued = waiters.len(), "Refresh in flight, queueing request");
                    Recovery::Wait(rx)
                }
                RefreshState::Idle(Some(last))
                    if rejected.is_some() && last.replaced.as_deref() == rejected =>
                {
                    debug!("Refresh for this token already settled, reusing its outcome");
                    Recovery::Reuse(last.outcome.clone())
                }
                RefreshState::Idle(_) => {
                    *state = RefreshState::Refreshing(Vec::new());
                    Recovery::Lead
                }
            }
        };
        match next {
            Recovery::Wait(rx) => {
                return rx
                    .await
                    .unwrap_or(Err(RefreshError::Abandoned))
                    .map_err(ApiError::from);
            }
            Recovery::Reuse(outcome) => return outcome.map_err(ApiError::from),
            Recovery::Lead => {}
        }

        let mut cycle = RefreshCycle {
            inner: &self.inner,
            replacing: rejected.map(str::to_string),
            outcome: None,
        };
        let outcome = self.refresh_tokens(rejected).await;
        cycle.outcome = Some(outcome.clone());
        drop(cycle);
        outcome.map_err(ApiError::from)
    }

    async fn refresh_tokens(&self, rejected: Option<&str>) -> Result<String, RefreshError> {
        info!("Refreshing access token");
        let result = self.exchange_refresh_token().await;
        match &result {
            Ok(access_token) => {
                self.set_default_token(Some(access_token.clone()));
                info!("Access token refreshed");
                let _ = self.inner.events.send(AuthEvent::TokensRefreshed {
                    access_token: access_token.clone(),
                });
            }
            Err(err) => {
                error!(error = %err, "Token refresh failed, clearing stored tokens");
                for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
                    if let Err(e) = self.inner.credentials.delete(key).await {
                        warn!(key, error = %e, "Failed to delete stored token");
                    }
                }
                self.set_default_token(None);
                let _ = self.inner.events.send(AuthEvent::SessionExpired {
                    access_token: rejected.map(str::to_string),
                    reason: err.clone(),
                });
            }
        }
        result
    }

    async fn exchange_refresh_token(&self) -> Result<String, RefreshError> {
        let refresh_token = self
            .inner
            .credentials
            .get(REFRESH_TOKEN_KEY)
            .await
            .map_err(|e| RefreshError::Storage(e.to_string()))?
            .filter(|token| !token.is_empty())
            .ok_or(RefreshError::MissingRefreshToken)?;

        // Sent straight to the transport so a 401 here can never start another cycle
        let mut request = TransportRequest::new(Method::POST, REFRESH_PATH);
        request.body = RequestBody::Json(json!({ "refreshToken": refresh_token }));
        let response = self
            .inner
            .transport
            .send(&request)
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        if !response.is_success() {
            let message = ApiError::from_status(response.status, &response.body)
                .server_message()
                .map(str::to_string);
            return Err(RefreshError::Rejected {
                status: response.status,
                message,
            });
        }

        let tokens: TokenPair = response
            .json::<Envelope<TokenPair>>()
            .map_err(|e| RefreshError::Malformed(e.to_string()))?
            .data
            .ok_or_else(|| RefreshError::Malformed("missing token data".to_string()))?;

        self.inner
            .credentials
            .set(ACCESS_TOKEN_KEY, &tokens.access_token)
            .await
            .map_err(|e| RefreshError::Storage(e.to_string()))?;
        self.inner
            .credentials
            .set(REFRESH_TOKEN_KEY, &tokens.refresh_token)
            .await
            .map_err(|e| RefreshError::Storage(e.to_string()))?;

        Ok(tokens.access_token)
    }
}
