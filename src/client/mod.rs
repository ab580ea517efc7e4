use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

pub mod error;
pub mod retry;
pub mod transport;

pub use error::{extract_error_message, Classification, ClientError, RequestFailure};
pub use retry::{RequestAttempt, RetryEvent, RetryPolicy};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};

/// Buffered retry notifications per subscriber
const EVENT_CAPACITY: usize = 32;

/// Source of access tokens for authenticated calls.
///
/// `Ok(None)` means the call should go out without an `Authorization` header.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn valid_access_token(&self) -> Result<Option<String>, ClientError>;
}

/// Result of a health check
#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    Healthy { latency_ms: u64 },
    Unhealthy { status: u16, message: String },
    Unreachable(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy { .. })
    }
}

/// Issues logical calls through the classify-and-retry policy
pub struct RequestOrchestrator {
    transport: Arc<dyn HttpTransport>,
    tokens: Option<Arc<dyn TokenProvider>>,
    policy: RetryPolicy,
    events: broadcast::Sender<RetryEvent>,
}

impl RequestOrchestrator {
    pub fn new(transport: Arc<dyn HttpTransport>, policy: RetryPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            tokens: None,
            policy,
            events,
        }
    }

    /// Attach the token source consulted for authenticated calls
    pub fn with_token_provider(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        self.transport.clone()
    }

    /// Subscribe to retry notifications
    pub fn subscribe(&self) -> broadcast::Receiver<RetryEvent> {
        self.events.subscribe()
    }

    /// Execute one logical call and return the successful raw response.
    ///
    /// A fresh token is requested before every attempt when `auth_required` is set.
    pub async fn execute(
        &self,
        call: &HttpRequest,
        auth_required: bool,
    ) -> Result<HttpResponse, RequestFailure> {
        self.execute_with_history(call, auth_required)
            .await
            .map(|(response, _)| response)
    }

    /// Like `execute`, also returning the failed attempts that preceded success
    async fn execute_with_history(
        &self,
        call: &HttpRequest,
        auth_required: bool,
    ) -> Result<(HttpResponse, Vec<RequestAttempt>), RequestFailure> {
        let mut history = Vec::new();

        for attempt in 0..=self.policy.max_retries {
            let mut request = call.clone();

            if auth_required {
                if let Some(tokens) = &self.tokens {
                    request.bearer = match tokens.valid_access_token().await {
                        Ok(token) => token,
                        Err(error) => {
                            return Err(RequestFailure {
                                error,
                                attempts: attempt,
                                retries_exhausted: false,
                                history,
                            })
                        }
                    };
                }
            }

            let error = match self.transport.send(request).await {
                Ok(response) if response.is_success() => {
                    if attempt > 0 {
                        tracing::info!(
                            path = %call.path,
                            attempt = attempt + 1,
                            "Request succeeded after retry"
                        );
                    }
                    return Ok((response, history));
                }
                Ok(response) => ClientError::from_status(response.status, &response.body),
                Err(error) => error,
            };

            let classification = error.classification();
            let out_of_retries = attempt >= self.policy.max_retries;

            if classification == Classification::NonRetryable || out_of_retries {
                history.push(RequestAttempt {
                    attempt_index: attempt + 1,
                    classification,
                    delay_ms: 0,
                });

                let retries_exhausted = classification == Classification::Retryable;
                if retries_exhausted {
                    tracing::error!(
                        path = %call.path,
                        attempts = attempt + 1,
                        error = %error,
                        "Request failed after exhausting retries"
                    );
                } else {
                    tracing::debug!(path = %call.path, error = %error, "Request failed");
                }

                return Err(RequestFailure {
                    error,
                    attempts: attempt + 1,
                    retries_exhausted,
                    history,
                });
            }

            let delay = self.policy.delay_for_attempt(attempt);
            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            history.push(RequestAttempt {
                attempt_index: attempt + 1,
                classification,
                delay_ms,
            });

            tracing::warn!(
                path = %call.path,
                attempt = attempt + 1,
                max = self.policy.max_retries,
                delay_ms,
                error = %error,
                "Retrying after transient error"
            );

            let _ = self.events.send(RetryEvent {
                attempt_index: attempt + 1,
                max_attempts: self.policy.max_retries,
                delay_ms,
                last_error_message: error.to_string(),
            });

            tokio::time::sleep(delay).await;
        }

        // The last loop iteration always returns
        Err(RequestFailure {
            error: ClientError::Network("retry loop exited without result".to_string()),
            attempts: self.policy.max_attempts(),
            retries_exhausted: true,
            history,
        })
    }

    /// Execute a call and decode the JSON body of the successful response
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        call: &HttpRequest,
        auth_required: bool,
    ) -> Result<T, RequestFailure> {
        let (response, history) = self.execute_with_history(call, auth_required).await?;
        serde_json::from_str(&response.body).map_err(|e| RequestFailure {
            error: ClientError::InvalidResponse(e.to_string()),
            attempts: history.len() as u32 + 1,
            retries_exhausted: false,
            history,
        })
    }

    /// Check `GET /health` under a hard timeout
    pub async fn check_health(&self, timeout: Duration) -> HealthStatus {
        let started = Instant::now();
        let request = HttpRequest::get("/health").with_timeout(timeout);

        match tokio::time::timeout(timeout, self.transport.send(request)).await {
            Ok(Ok(response)) if response.is_success() => HealthStatus::Healthy {
                latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            },
            Ok(Ok(response)) => HealthStatus::Unhealthy {
                status: response.status,
                message: extract_error_message(response.status, &response.body),
            },
            Ok(Err(error)) => HealthStatus::Unreachable(error.to_string()),
            Err(_) => HealthStatus::Unreachable(format!(
                "no response within {}s",
                timeout.as_secs()
            )),
        }
    }
}
