//! Transcript Client - resilient client for a transcript extraction service
//!
//! This library submits video references to a remote extraction service, keeps the
//! account's access token fresh, retries transient failures with exponential backoff and
//! caches every language variant of the last extraction so that switching languages or
//! output formats never touches the network.

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod extract;
pub mod output;
pub mod utils;

pub use auth::{AuthClient, CredentialPair, SessionState, TokenLifecycleManager};
pub use cli::{Cli, Commands, OutputFormat};
pub use client::{ClientError, RequestFailure, RequestOrchestrator, RetryEvent, RetryPolicy};
pub use config::Config;
pub use extract::{ExtractionCache, ExtractionResult, ExtractionService, Segment, TranscriptVariant};

/// Result type used by the binary and configuration layer
pub type Result<T> = anyhow::Result<T>;

use std::sync::Arc;

use auth::{FileSessionStore, HttpTokenRefresher, SessionStore};
use client::{HttpTransport, ReqwestTransport};

/// Every service of the client, wired against one configuration
pub struct TranscriptClient {
    pub orchestrator: Arc<RequestOrchestrator>,
    pub tokens: Arc<TokenLifecycleManager>,
    pub auth: AuthClient,
    pub extraction: ExtractionService,
}

impl TranscriptClient {
    /// Build the client with a file-backed session at the configured location
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(config.api.clone())?);
        let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(config.session_path()?));
        Ok(Self::with_parts(config, transport, store)?)
    }

    /// Build the client over an explicit transport and session store
    pub fn with_parts(
        config: &Config,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn SessionStore>,
    ) -> std::result::Result<Self, ClientError> {
        let refresher = Arc::new(HttpTokenRefresher::new(transport.clone()));
        let tokens = Arc::new(TokenLifecycleManager::new(store, refresher)?);

        let orchestrator = Arc::new(
            RequestOrchestrator::new(transport, RetryPolicy::from_config(&config.retry))
                .with_token_provider(tokens.clone()),
        );

        let auth = AuthClient::new(orchestrator.clone(), tokens.clone());
        let extraction = ExtractionService::from_config(
            orchestrator.clone(),
            Arc::new(ExtractionCache::new()),
            config,
        );

        Ok(Self {
            orchestrator,
            tokens,
            auth,
            extraction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemorySessionStore;
    use crate::client::transport::MockHttpTransport;

    #[test]
    fn test_with_parts_uses_configured_retry_policy() {
        let mut config = Config::default();
        config.retry.max_retries = 1;
        config.retry.base_delay_ms = 500;

        let client = TranscriptClient::with_parts(
            &config,
            Arc::new(MockHttpTransport::new()),
            Arc::new(MemorySessionStore::new()),
        )
        .unwrap();

        assert_eq!(client.orchestrator.policy().max_attempts(), 2);
        assert_eq!(client.tokens.state(), SessionState::Unauthenticated);
        assert!(client.extraction.cache().current().is_none());
    }
}
