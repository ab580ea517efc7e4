use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{Notify, OnceCell};

pub mod client;
pub mod store;
pub mod token;

pub use client::{AuthClient, AuthSession, HttpTokenRefresher};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
pub use token::{is_expiring_soon, DEFAULT_EXPIRY_BUFFER_SECS};

use crate::client::{ClientError, TokenProvider};
use store::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY};

/// Access/refresh token pair. Both tokens are always non-empty.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl CredentialPair {
    /// Build a pair, rejecting empty tokens
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Option<Self> {
        let access_token = access_token.into();
        let refresh_token = refresh_token.into();
        if access_token.trim().is_empty() || refresh_token.trim().is_empty() {
            return None;
        }
        Some(Self {
            access_token,
            refresh_token,
        })
    }
}

impl std::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Cached account profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub email: String,

    #[serde(default, alias = "name")]
    pub full_name: Option<String>,

    /// Remaining server fields (id, plan, timestamps)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Refreshing,
}

/// Exchanges a refresh token for a new credential pair
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn exchange(&self, refresh_token: &str) -> Result<CredentialPair, ClientError>;
}

type RefreshResult = Result<String, ClientError>;

/// Shared outcome of the refresh currently in flight
struct InFlightRefresh {
    result: OnceCell<RefreshResult>,
    notify: Notify,
}

impl InFlightRefresh {
    fn new() -> Self {
        Self {
            result: OnceCell::new(),
            notify: Notify::new(),
        }
    }

    fn set_result(&self, result: RefreshResult) {
        let _ = self.result.set(result);
        self.notify.notify_waiters();
    }

    async fn wait(&self) -> RefreshResult {
        loop {
            if let Some(result) = self.result.get() {
                return result.clone();
            }

            let notified = self.notify.notified();
            if let Some(result) = self.result.get() {
                return result.clone();
            }

            notified.await;
        }
    }
}

/// Publishes a result for waiters even if the leading refresh future is dropped
struct RefreshGuard<'a> {
    manager: &'a TokenLifecycleManager,
    state: Arc<InFlightRefresh>,
    finished: bool,
}

impl RefreshGuard<'_> {
    fn finish(mut self, result: RefreshResult) {
        self.finished = true;
        self.manager.finish_refresh(&self.state, result);
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.manager.finish_refresh(
                &self.state,
                Err(ClientError::Network("token refresh was abandoned".to_string())),
            );
        }
    }
}

/// Owns the credential pair and keeps the access token valid.
///
/// Concurrent callers that need a refresh share a single exchange with the server.
pub struct TokenLifecycleManager {
    credentials: RwLock<Option<CredentialPair>>,
    user: RwLock<Option<UserProfile>>,
    store: Arc<dyn SessionStore>,
    refresher: Arc<dyn TokenRefresher>,
    in_flight: Mutex<Option<Arc<InFlightRefresh>>>,
    buffer_secs: i64,
}

impl TokenLifecycleManager {
    /// Create a manager, restoring any session held by the store
    pub fn new(
        store: Arc<dyn SessionStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Result<Self, ClientError> {
        let manager = Self {
            credentials: RwLock::new(None),
            user: RwLock::new(None),
            store,
            refresher,
            in_flight: Mutex::new(None),
            buffer_secs: DEFAULT_EXPIRY_BUFFER_SECS,
        };
        manager.restore()?;
        Ok(manager)
    }

    pub fn with_expiry_buffer(mut self, buffer_secs: i64) -> Self {
        self.buffer_secs = buffer_secs;
        self
    }

    fn restore(&self) -> Result<(), ClientError> {
        let access = self.store.get(ACCESS_TOKEN_KEY)?.unwrap_or_default();
        let refresh = self.store.get(REFRESH_TOKEN_KEY)?.unwrap_or_default();

        match CredentialPair::new(access.clone(), refresh.clone()) {
            Some(pair) => {
                let user = self
                    .store
                    .get(USER_KEY)?
                    .and_then(|raw| serde_json::from_str::<UserProfile>(&raw).ok());
                *self.credentials.write().map_err(|_| poisoned())? = Some(pair);
                *self.user.write().map_err(|_| poisoned())? = user;
                tracing::debug!("Restored persisted session");
            }
            None if !access.is_empty() || !refresh.is_empty() => {
                tracing::warn!("Discarding partial credential pair from storage");
                self.purge_store()?;
            }
            None => {}
        }

        Ok(())
    }

    pub fn state(&self) -> SessionState {
        let refreshing = self
            .in_flight
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false);

        if refreshing {
            SessionState::Refreshing
        } else if self.credentials().is_some() {
            SessionState::Authenticated
        } else {
            SessionState::Unauthenticated
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials().is_some()
    }

    pub fn credentials(&self) -> Option<CredentialPair> {
        self.credentials.read().ok().and_then(|c| (*c).clone())
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.user.read().ok().and_then(|u| (*u).clone())
    }

    /// Expiry check using the configured buffer
    pub fn is_expiring_soon(&self, token: &str) -> Result<bool, ClientError> {
        token::is_expiring_soon(token, self.buffer_secs)
    }

    /// Install a pair obtained by login or registration
    pub fn establish(
        &self,
        pair: CredentialPair,
        user: Option<UserProfile>,
    ) -> Result<(), ClientError> {
        self.replace_pair(pair)?;
        if let Some(profile) = user {
            self.set_user(profile)?;
        }
        tracing::info!("Session established");
        Ok(())
    }

    pub fn set_user(&self, profile: UserProfile) -> Result<(), ClientError> {
        let raw = serde_json::to_string(&profile).map_err(|e| ClientError::Storage(e.to_string()))?;
        self.store.set(USER_KEY, &raw)?;
        *self.user.write().map_err(|_| poisoned())? = Some(profile);
        Ok(())
    }

    /// Drop the session and everything persisted for it
    pub fn logout(&self) -> Result<(), ClientError> {
        self.clear()?;
        tracing::info!("Logged out");
        Ok(())
    }

    /// Return an access token that is not about to expire.
    ///
    /// `Ok(None)` when no session is held. Refreshes when the current token is
    /// stale or cannot be decoded.
    pub async fn get_valid_access_token(&self) -> Result<Option<String>, ClientError> {
        let pair = match self.credentials() {
            Some(pair) => pair,
            None => return Ok(None),
        };

        match self.is_expiring_soon(&pair.access_token) {
            Ok(false) => return Ok(Some(pair.access_token)),
            Ok(true) => tracing::debug!("Access token expiring soon, refreshing"),
            Err(e) => tracing::debug!(error = %e, "Access token unreadable, refreshing"),
        }

        self.refresh().await.map(Some)
    }

    /// Exchange the refresh token for a new pair.
    ///
    /// Joins the refresh already in flight if there is one, and returns the current
    /// access token without an exchange when it is no longer stale.
    pub async fn refresh(&self) -> Result<String, ClientError> {
        let (state, leader) = {
            let mut slot = self.in_flight.lock().map_err(|_| poisoned())?;
            match slot.as_ref() {
                Some(existing) => (existing.clone(), false),
                None => {
                    let state = Arc::new(InFlightRefresh::new());
                    *slot = Some(state.clone());
                    (state, true)
                }
            }
        };

        if !leader {
            tracing::debug!("Joining in-flight token refresh");
            return state.wait().await;
        }

        let guard = RefreshGuard {
            manager: self,
            state,
            finished: false,
        };
        let result = self.perform_refresh().await;
        guard.finish(result.clone());
        result
    }

    async fn perform_refresh(&self) -> RefreshResult {
        let pair = self.credentials().ok_or(ClientError::SessionExpired)?;

        // A refresh that finished after the caller read the stale pair already covered it
        if let Ok(false) = self.is_expiring_soon(&pair.access_token) {
            tracing::debug!("Access token already refreshed");
            return Ok(pair.access_token);
        }

        // An expired refresh token cannot be exchanged, skip the round trip
        if token::is_expiring_soon(&pair.refresh_token, 0).unwrap_or(true) {
            tracing::info!("Refresh token expired, session ended");
            self.clear()?;
            return Err(ClientError::SessionExpired);
        }

        match self.refresher.exchange(&pair.refresh_token).await {
            Ok(new_pair) => {
                self.replace_pair(new_pair.clone())?;
                tracing::info!("Access token refreshed");
                Ok(new_pair.access_token)
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(error = %e, "Token refresh failed transiently, keeping session");
                Err(e)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh rejected, session ended");
                self.clear()?;
                Err(ClientError::SessionExpired)
            }
        }
    }

    fn finish_refresh(&self, state: &Arc<InFlightRefresh>, result: RefreshResult) {
        if let Ok(mut slot) = self.in_flight.lock() {
            if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, state)) {
                *slot = None;
            }
        }
        state.set_result(result);
    }

    fn replace_pair(&self, pair: CredentialPair) -> Result<(), ClientError> {
        self.store.set(ACCESS_TOKEN_KEY, &pair.access_token)?;
        self.store.set(REFRESH_TOKEN_KEY, &pair.refresh_token)?;
        *self.credentials.write().map_err(|_| poisoned())? = Some(pair);
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        *self.credentials.write().map_err(|_| poisoned())? = None;
        *self.user.write().map_err(|_| poisoned())? = None;
        self.purge_store()
    }

    fn purge_store(&self) -> Result<(), ClientError> {
        self.store.remove(ACCESS_TOKEN_KEY)?;
        self.store.remove(REFRESH_TOKEN_KEY)?;
        self.store.remove(USER_KEY)
    }
}

#[async_trait]
impl TokenProvider for TokenLifecycleManager {
    async fn valid_access_token(&self) -> Result<Option<String>, ClientError> {
        self.get_valid_access_token().await
    }
}

fn poisoned() -> ClientError {
    ClientError::Storage("credential lock poisoned".to_string())
}
