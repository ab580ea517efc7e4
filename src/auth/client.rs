use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::{CredentialPair, TokenLifecycleManager, TokenRefresher, UserProfile};
use crate::client::{ClientError, HttpRequest, HttpTransport, RequestFailure, RequestOrchestrator};

/// Token response of `/auth/register`, `/auth/login` and `/auth/refresh`
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    user: Option<UserProfile>,
}

/// Outcome of login or registration
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub pair: CredentialPair,
    pub user: Option<UserProfile>,
}

/// Account operations against the auth endpoints
pub struct AuthClient {
    orchestrator: Arc<RequestOrchestrator>,
    tokens: Arc<TokenLifecycleManager>,
}

impl AuthClient {
    pub fn new(orchestrator: Arc<RequestOrchestrator>, tokens: Arc<TokenLifecycleManager>) -> Self {
        Self {
            orchestrator,
            tokens,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenLifecycleManager> {
        &self.tokens
    }

    /// Create an account and start a session for it
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<AuthSession, RequestFailure> {
        validate_credentials(email, password).map_err(RequestFailure::local)?;

        let mut body = json!({ "email": email.trim(), "password": password });
        if let Some(name) = full_name.map(str::trim).filter(|n| !n.is_empty()) {
            body["full_name"] = json!(name);
        }

        let response: TokenResponse = self
            .orchestrator
            .execute_json(&HttpRequest::post("/auth/register", body), false)
            .await?;

        self.start_session(response)
            .map_err(RequestFailure::local)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, RequestFailure> {
        validate_credentials(email, password).map_err(RequestFailure::local)?;

        let body = json!({ "email": email.trim(), "password": password });
        let response: TokenResponse = self
            .orchestrator
            .execute_json(&HttpRequest::post("/auth/login", body), false)
            .await?;

        self.start_session(response)
            .map_err(RequestFailure::local)
    }

    /// Fetch the profile of the signed-in account and cache it
    pub async fn me(&self) -> Result<UserProfile, RequestFailure> {
        if !self.tokens.is_authenticated() {
            return Err(RequestFailure::local(ClientError::Authentication(
                "not logged in".to_string(),
            )));
        }

        let profile: UserProfile = self
            .orchestrator
            .execute_json(&HttpRequest::get("/auth/me"), true)
            .await?;

        self.tokens
            .set_user(profile.clone())
            .map_err(RequestFailure::local)?;
        Ok(profile)
    }

    pub fn logout(&self) -> Result<(), ClientError> {
        self.tokens.logout()
    }

    fn start_session(&self, response: TokenResponse) -> Result<AuthSession, ClientError> {
        let pair = into_pair(response.access_token, response.refresh_token, None)?;
        if let Some(kind) = response.token_type.as_deref() {
            if !kind.eq_ignore_ascii_case("bearer") {
                tracing::warn!(token_type = kind, "Unexpected token type");
            }
        }

        self.tokens.establish(pair.clone(), response.user.clone())?;
        Ok(AuthSession {
            pair,
            user: response.user,
        })
    }
}

/// Performs `POST /auth/refresh` with a single attempt
pub struct HttpTokenRefresher {
    transport: Arc<dyn HttpTransport>,
}

impl HttpTokenRefresher {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn exchange(&self, refresh_token: &str) -> Result<CredentialPair, ClientError> {
        let request = HttpRequest::post("/auth/refresh", json!({ "refresh_token": refresh_token }));
        let response = self.transport.send(request).await?;

        if !response.is_success() {
            return Err(ClientError::from_status(response.status, &response.body));
        }

        let tokens: TokenResponse = serde_json::from_str(&response.body)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        into_pair(tokens.access_token, tokens.refresh_token, Some(refresh_token))
    }
}

fn into_pair(
    access_token: String,
    refresh_token: Option<String>,
    fallback_refresh: Option<&str>,
) -> Result<CredentialPair, ClientError> {
    // Some deployments rotate only the access token on refresh
    let refresh_token = refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| fallback_refresh.map(str::to_string))
        .unwrap_or_default();

    CredentialPair::new(access_token, refresh_token).ok_or_else(|| {
        ClientError::InvalidResponse("response did not contain a complete token pair".to_string())
    })
}

fn validate_credentials(email: &str, password: &str) -> Result<(), ClientError> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ClientError::Validation(format!("invalid email address: {}", email)));
    }
    if password.is_empty() {
        return Err(ClientError::Validation("password must not be empty".to_string()));
    }
    Ok(())
}
