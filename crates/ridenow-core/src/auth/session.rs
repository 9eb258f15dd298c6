use std::fmt;
use std::sync::{Arc, Weak};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::credentials::{CredentialStore, StoreError, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY};
use crate::api::{ApiClient, AuthEvent};
use crate::models::{user, AuthPayload};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Not logged in")]
    NotAuthenticated,

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Observable login state.
///
/// `user` and `access_token` are either both set or both empty.
#[derive(Clone, PartialEq)]
pub struct Session {
    pub user: Option<Value>,
    pub access_token: Option<String>,
    pub is_loading: bool,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    fn logged_out() -> Self {
        Self {
            user: None,
            access_token: None,
            is_loading: false,
        }
    }
}

// Loading until storage has been read once
impl Default for Session {
    fn default() -> Self {
        Self {
            user: None,
            access_token: None,
            is_loading: true,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("is_loading", &self.is_loading)
            .finish()
    }
}

/// Process-wide session, shared by `Arc` between the front end and the
/// auth listener task.
pub struct SessionStore {
    client: ApiClient,
    credentials: Arc<dyn CredentialStore>,
    state: watch::Sender<Session>,
}

impl SessionStore {
    pub fn new(client: ApiClient) -> Self {
        let credentials = client.credentials();
        let (state, _) = watch::channel(Session::default());
        Self {
            client,
            credentials,
            state,
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Restore a previous session from the credential store.
    /// Any failure leaves the session logged out; loading always ends.
    pub async fn load_from_storage(&self) {
        let restored = match self.read_stored().await {
            Ok(restored) => restored,
            Err(e) => {
                warn!(error = %e, "Failed to read stored session");
                None
            }
        };

        match restored {
            Some((token, user)) => {
                self.client.set_default_token(Some(token.clone()));
                self.state.send_replace(Session {
                    user: Some(user),
                    access_token: Some(token),
                    is_loading: false,
                });
                info!("Restored stored session");
            }
            None => {
                self.client.set_default_token(None);
                self.state.send_replace(Session::logged_out());
                debug!("No stored session");
            }
        }
    }

    async fn read_stored(&self) -> Result<Option<(String, Value)>, StoreError> {
        let token = self.credentials.get(ACCESS_TOKEN_KEY).await?;
        let raw_user = self.credentials.get(USER_KEY).await?;
        let (Some(token), Some(raw_user)) = (token, raw_user) else {
            return Ok(None);
        };
        match serde_json::from_str(&raw_user) {
            Ok(user) => Ok(Some((token, user))),
            Err(e) => {
                warn!(error = %e, "Stored user record is not valid JSON");
                Ok(None)
            }
        }
    }

    /// Adopt a freshly issued session. Memory and the default header are
    /// updated before anything is persisted; a persistence failure is
    /// returned but the in-memory session stays logged in.
    pub async fn login(&self, payload: AuthPayload) -> Result<(), StoreError> {
        self.client.set_default_token(Some(payload.access_token.clone()));
        self.state.send_replace(Session {
            user: Some(payload.user.clone()),
            access_token: Some(payload.access_token.clone()),
            is_loading: false,
        });
        info!("Logged in");

        let persisted = async {
            self.credentials.set(ACCESS_TOKEN_KEY, &payload.access_token).await?;
            self.credentials.set(REFRESH_TOKEN_KEY, &payload.refresh_token).await?;
            self.credentials.set(USER_KEY, &payload.user.to_string()).await
        }
        .await;
        if let Err(ref e) = persisted {
            error!(error = %e, "Failed to persist session");
        }
        persisted
    }

    /// Clear the session everywhere. Safe to call when already logged out.
    pub async fn logout(&self) -> Result<(), StoreError> {
        self.client.set_default_token(None);
        self.state.send_replace(Session::logged_out());

        // Attempt every slot even if one fails
        let mut first_error = None;
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY] {
            if let Err(e) = self.credentials.delete(key).await {
                warn!(key, error = %e, "Failed to delete credential");
                first_error.get_or_insert(e);
            }
        }
        info!("Logged out");
        first_error.map_or(Ok(()), Err)
    }

    /// Replace the user record in memory and in storage. Tokens are untouched.
    pub async fn update_user(&self, user: Value) -> Result<(), SessionError> {
        if !self.is_authenticated() {
            return Err(SessionError::NotAuthenticated);
        }
        let serialized = user.to_string();
        self.state.send_modify(|session| session.user = Some(user));
        self.credentials.set(USER_KEY, &serialized).await?;
        Ok(())
    }

    /// Deep-merge a partial record into the current user
    pub async fn merge_user(&self, patch: &Value) -> Result<(), SessionError> {
        let mut merged = self.user().ok_or(SessionError::NotAuthenticated)?;
        user::merge(&mut merged, patch);
        self.update_user(merged).await
    }

    pub async fn handle_auth_event(&self, event: AuthEvent) {
        match event {
            AuthEvent::TokensRefreshed { access_token } => {
                // A refresh finishing after logout must not resurrect the session
                self.state.send_if_modified(|session| {
                    if session.is_authenticated() {
                        session.access_token = Some(access_token);
                        true
                    } else {
                        false
                    }
                });
                debug!("Session token updated after refresh");
            }
            AuthEvent::SessionExpired {
                access_token,
                reason,
            } => {
                // A failure for a token this session no longer holds is stale
                let current = self.access_token();
                if current.is_some() && current != access_token {
                    debug!(reason = %reason, "Ignoring expiry of a replaced session");
                    return;
                }
                warn!(reason = %reason, "Session expired, logging out");
                if let Err(e) = self.logout().await {
                    error!(error = %e, "Failed to clear expired session");
                }
            }
        }
    }

    /// Apply the client's refresh outcomes to this session in a background
    /// task. Events sent before this call are not seen. The task ends once the
    /// store is dropped or the client's event channel closes.
    pub fn spawn_auth_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.client.subscribe();
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => match store.upgrade() {
                        Some(store) => store.handle_auth_event(event).await,
                        None => break,
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Auth listener fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    // ===== Snapshots =====

    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn user(&self) -> Option<Value> {
        self.state.borrow().user.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.borrow().access_token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    /// Watch for session changes
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }
}
