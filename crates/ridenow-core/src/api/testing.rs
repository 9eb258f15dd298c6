//! Scripted transport standing in for the RideNow backend in tests.
//!
//! Authorized paths answer only when the bearer matches the currently valid
//! access token, otherwise 401. `users/refresh-token` issues
//! `fresh-access-N` / `fresh-refresh-N` for the currently valid refresh token.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::client::REFRESH_PATH;
use super::transport::{ApiResponse, RequestBody, Transport, TransportError, TransportRequest};

/// Access token the backend no longer accepts
pub const EXPIRED_TOKEN: &str = "expired-access";
/// Refresh token the backend accepts until it is rotated
pub const REFRESH_TOKEN: &str = "refresh-0";

pub struct ScriptedTransport {
    valid_access: Mutex<String>,
    valid_refresh: Mutex<Option<String>>,
    refresh_delay: Duration,
    issued: AtomicUsize,
    routes: Mutex<HashMap<String, (u16, Value)>>,
    public: Mutex<HashSet<String>>,
    failure: Mutex<Option<TransportError>>,
    log: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub fn new(valid_access: &str) -> Self {
        Self {
            valid_access: Mutex::new(valid_access.to_string()),
            valid_refresh: Mutex::new(Some(REFRESH_TOKEN.to_string())),
            refresh_delay: Duration::ZERO,
            issued: AtomicUsize::new(0),
            routes: Mutex::new(HashMap::new()),
            public: Mutex::new(HashSet::new()),
            failure: Mutex::new(None),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Backend whose only acceptable access token has not been issued yet
    pub fn expired() -> Self {
        Self::new("not-yet-issued")
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    /// Answer `path` with `status` and `body` once authorized
    pub fn route(&self, path: &str, status: u16, body: Value) {
        self.routes.lock().unwrap().insert(path.to_string(), (status, body));
    }

    /// Answer `path` without checking the bearer
    pub fn public_route(&self, path: &str, status: u16, body: Value) {
        self.public.lock().unwrap().insert(path.to_string());
        self.route(path, status, body);
    }

    pub fn reject_refresh_tokens(&self) {
        *self.valid_refresh.lock().unwrap() = None;
    }

    pub fn fail_with(&self, error: TransportError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<TransportRequest> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }

    pub fn bearers_for(&self, path: &str) -> Vec<Option<String>> {
        self.requests_to(path)
            .iter()
            .map(|r| r.bearer().map(str::to_string))
            .collect()
    }

    pub fn index_of_first(&self, path: &str) -> Option<usize> {
        self.requests().iter().position(|r| r.path == path)
    }

    pub fn refresh_calls(&self) -> usize {
        self.requests_to(REFRESH_PATH).len()
    }

    pub fn refresh_tokens_sent(&self) -> Vec<String> {
        self.requests_to(REFRESH_PATH)
            .iter()
            .filter_map(|r| match &r.body {
                RequestBody::Json(body) => body["refreshToken"].as_str().map(str::to_string),
                _ => None,
            })
            .collect()
    }

    fn respond(status: u16, body: Value) -> ApiResponse {
        ApiResponse::new(status, body.to_string().into_bytes())
    }

    fn refresh(&self, request: &TransportRequest) -> ApiResponse {
        let presented = match &request.body {
            RequestBody::Json(body) => body["refreshToken"].as_str().map(str::to_string),
            _ => None,
        };
        let mut valid_refresh = self.valid_refresh.lock().unwrap();
        if presented.is_none() || presented != *valid_refresh {
            return Self::respond(401, json!({"success": false, "message": "Invalid refresh token"}));
        }

        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let access = format!("fresh-access-{}", n);
        let refresh = format!("fresh-refresh-{}", n);
        *self.valid_access.lock().unwrap() = access.clone();
        *valid_refresh = Some(refresh.clone());
        Self::respond(
            200,
            json!({"success": true, "data": {"accessToken": access, "refreshToken": refresh}}),
        )
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &TransportRequest) -> Result<ApiResponse, TransportError> {
        self.log.lock().unwrap().push(request.clone());
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }

        if request.path == REFRESH_PATH {
            if !self.refresh_delay.is_zero() {
                tokio::time::sleep(self.refresh_delay).await;
            }
            return Ok(self.refresh(request));
        }

        // Let concurrent callers interleave the way real network calls would
        tokio::task::yield_now().await;

        let is_public = self.public.lock().unwrap().contains(&request.path);
        let authorized = request.bearer() == Some(self.valid_access.lock().unwrap().as_str());
        if !is_public && !authorized {
            return Ok(Self::respond(401, json!({"success": false, "message": "jwt expired"})));
        }

        let route = self.routes.lock().unwrap().get(&request.path).cloned();
        Ok(match route {
            Some((status, body)) => Self::respond(status, body),
            None => Self::respond(404, json!({"success": false, "message": "Route not found"})),
        })
    }
}
