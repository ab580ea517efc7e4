use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub mod cache;
pub mod models;

pub use cache::{CachedVariant, ExtractionCache, StoreOutcome, SubmissionTicket};
pub use models::{decode_extraction, ExtractionResult, Segment, TranscriptVariant};

use crate::client::{ClientError, HealthStatus, HttpRequest, RequestFailure, RequestOrchestrator};
use crate::config::Config;
use crate::utils::validate_and_normalize_url;

pub const EXTRACT_PATH: &str = "/api/v1/extract";

/// What to ask the extraction service for
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    /// Response format requested from the service
    pub format: String,

    /// Preferred language; also selected locally once the result arrives
    pub language: Option<String>,

    /// Fetch every available language instead of only the preferred one
    pub all_languages: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
            language: None,
            all_languages: true,
        }
    }
}

impl ExtractOptions {
    fn request_body(&self, url: &str) -> serde_json::Value {
        let mut body = json!({ "url": url, "format": self.format });
        match (&self.language, self.all_languages) {
            (Some(language), false) => body["language_preference"] = json!(language),
            _ => body["fetch_all_languages"] = json!(true),
        }
        body
    }
}

/// How a submission ended
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// Result is cached; `language` is the variant now selected
    Completed {
        generation: u64,
        language: Option<String>,
    },

    /// A newer submission started before this one finished
    Superseded,
}

/// Submission flow: orchestrated call, decoding, empty-result retry and caching
pub struct ExtractionService {
    orchestrator: Arc<RequestOrchestrator>,
    cache: Arc<ExtractionCache>,
    empty_result_retries: u32,
    empty_result_delay: Duration,
    health_timeout: Duration,
}

impl ExtractionService {
    pub fn new(orchestrator: Arc<RequestOrchestrator>, cache: Arc<ExtractionCache>) -> Self {
        Self {
            orchestrator,
            cache,
            empty_result_retries: 2,
            empty_result_delay: Duration::from_secs(1),
            health_timeout: Duration::from_secs(5),
        }
    }

    pub fn from_config(
        orchestrator: Arc<RequestOrchestrator>,
        cache: Arc<ExtractionCache>,
        config: &Config,
    ) -> Self {
        Self {
            empty_result_retries: config.retry.empty_result_retries,
            empty_result_delay: Duration::from_millis(config.retry.empty_result_delay_ms),
            health_timeout: Duration::from_secs(config.api.health_timeout_secs),
            ..Self::new(orchestrator, cache)
        }
    }

    pub fn with_empty_result_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.empty_result_retries = retries;
        self.empty_result_delay = delay;
        self
    }

    pub fn cache(&self) -> &Arc<ExtractionCache> {
        &self.cache
    }

    pub fn orchestrator(&self) -> &Arc<RequestOrchestrator> {
        &self.orchestrator
    }

    /// Submit a video reference and cache every returned language.
    ///
    /// A submission overtaken by a newer one resolves to `Superseded` and leaves the
    /// cache untouched.
    pub async fn submit(
        &self,
        url: &str,
        options: &ExtractOptions,
    ) -> Result<SubmissionOutcome, RequestFailure> {
        let url = validate_and_normalize_url(url)
            .map_err(|e| RequestFailure::local(ClientError::Validation(e.to_string())))?;

        let ticket = self.cache.begin_submission();
        let request = HttpRequest::post(EXTRACT_PATH, options.request_body(&url));
        tracing::info!(%url, generation = ticket.generation(), "Submitting extraction");

        let mut attempts = 0;
        for round in 0..=self.empty_result_retries {
            let outcome = self.orchestrator.execute(&request, true).await;

            // The completion of an overtaken submission is ignored, failures included
            if !self.cache.is_current(&ticket) {
                tracing::debug!(generation = ticket.generation(), "Submission superseded");
                return Ok(SubmissionOutcome::Superseded);
            }

            let response = outcome?;
            attempts += 1;

            let result = decode_extraction(&response.body).map_err(RequestFailure::local)?;

            if result.has_content() {
                return Ok(self.finish(ticket, result, options));
            }

            if round < self.empty_result_retries {
                tracing::warn!(
                    round = round + 1,
                    max = self.empty_result_retries,
                    "Service returned an empty transcript, resubmitting"
                );
                tokio::time::sleep(self.empty_result_delay).await;

                if !self.cache.is_current(&ticket) {
                    tracing::debug!(generation = ticket.generation(), "Submission superseded");
                    return Ok(SubmissionOutcome::Superseded);
                }
            }
        }

        Err(RequestFailure {
            error: ClientError::EmptyResult,
            attempts,
            retries_exhausted: false,
            history: Vec::new(),
        })
    }

    fn finish(
        &self,
        ticket: SubmissionTicket,
        result: ExtractionResult,
        options: &ExtractOptions,
    ) -> SubmissionOutcome {
        match self.cache.store(ticket, result) {
            StoreOutcome::Stale => SubmissionOutcome::Superseded,
            StoreOutcome::Stored { language } => {
                let language = match options.language.as_deref() {
                    Some(code) => match self.cache.select_language(code) {
                        Some(variant) => Some(variant.language_code.clone()),
                        None => {
                            tracing::info!(language = code, "Requested language not available");
                            language
                        }
                    },
                    None => language,
                };

                SubmissionOutcome::Completed {
                    generation: ticket.generation(),
                    language,
                }
            }
        }
    }

    /// Switch the displayed language without any network call
    pub fn select_language(&self, code: &str) -> Option<CachedVariant> {
        self.cache.select_language(code)
    }

    pub async fn health(&self) -> HealthStatus {
        self.orchestrator.check_health(self.health_timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{HttpResponse, HttpTransport, RetryPolicy};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    fn segmented_body(video_id: &str, codes: &[&str]) -> String {
        let transcripts: serde_json::Map<String, serde_json::Value> = codes
            .iter()
            .map(|code| {
                (
                    code.to_string(),
                    json!({
                        "segments": [{"text": format!("hello {}", code), "start": 0.0, "duration": 1.0}],
                        "name": code,
                        "is_generated": false
                    }),
                )
            })
            .collect();
        json!({ "video_id": video_id, "transcripts": transcripts }).to_string()
    }

    /// Replies per submitted URL, with an optional delay
    struct FakeService {
        replies: Mutex<VecDeque<(Duration, HttpResponse)>>,
        bodies: Mutex<Vec<serde_json::Value>>,
    }

    impl FakeService {
        fn new(replies: Vec<(Duration, HttpResponse)>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                bodies: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.bodies.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpTransport for FakeService {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
            self.bodies
                .lock()
                .unwrap()
                .push(request.body.clone().unwrap_or_default());
            let (delay, response) = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or((Duration::ZERO, HttpResponse::new(500, "no reply")));
            tokio::time::sleep(delay).await;
            Ok(response)
        }
    }

    fn service(transport: Arc<FakeService>) -> ExtractionService {
        let orchestrator = Arc::new(RequestOrchestrator::new(transport, RetryPolicy::default()));
        ExtractionService::new(orchestrator, Arc::new(ExtractionCache::new()))
    }

    #[tokio::test]
    async fn test_submit_caches_all_languages() {
        let transport = FakeService::new(vec![(
            Duration::ZERO,
            HttpResponse::new(200, segmented_body("abc", &["de", "en-US", "fr"])),
        )]);
        let service = service(transport.clone());

        let outcome = service.submit(VIDEO_URL, &ExtractOptions::default()).await.unwrap();

        assert_eq!(
            outcome,
            SubmissionOutcome::Completed {
                generation: 1,
                language: Some("en-US".into())
            }
        );
        assert_eq!(service.cache().available_languages(), vec!["de", "en-US", "fr"]);

        // Switching languages is served from the cache
        let fr = service.select_language("fr").unwrap();
        assert_eq!(fr.segments[0].text, "hello fr");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_request_body_shapes() {
        let transport = FakeService::new(vec![
            (Duration::ZERO, HttpResponse::new(200, segmented_body("a", &["en"]))),
            (Duration::ZERO, HttpResponse::new(200, segmented_body("a", &["es"]))),
        ]);
        let service = service(transport.clone());

        service.submit(VIDEO_URL, &ExtractOptions::default()).await.unwrap();
        let options = ExtractOptions {
            language: Some("es".into()),
            all_languages: false,
            ..ExtractOptions::default()
        };
        let outcome = service.submit(VIDEO_URL, &options).await.unwrap();

        let bodies = transport.bodies.lock().unwrap().clone();
        assert_eq!(bodies[0]["fetch_all_languages"], true);
        assert_eq!(bodies[0]["format"], "json");
        assert_eq!(bodies[1]["language_preference"], "es");
        assert!(bodies[1].get("fetch_all_languages").is_none());
        assert_eq!(
            outcome,
            SubmissionOutcome::Completed {
                generation: 2,
                language: Some("es".into())
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_url_makes_no_request() {
        let transport = FakeService::new(vec![]);
        let service = service(transport.clone());

        let failure = service
            .submit("ftp://example.com/video", &ExtractOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(failure.error, ClientError::Validation(_)));
        assert_eq!(transport.calls(), 0);
        assert_eq!(service.cache().generation(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_result_is_retried_then_succeeds() {
        let transport = FakeService::new(vec![
            (Duration::ZERO, HttpResponse::new(200, r#"{"transcripts": {}}"#)),
            (Duration::ZERO, HttpResponse::new(200, segmented_body("a", &["en"]))),
        ]);
        let service = service(transport.clone());

        let outcome = service.submit(VIDEO_URL, &ExtractOptions::default()).await.unwrap();

        assert!(matches!(outcome, SubmissionOutcome::Completed { .. }));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_result_becomes_terminal() {
        let empty = || (Duration::ZERO, HttpResponse::new(200, r#"{"transcript": ""}"#));
        let transport = FakeService::new(vec![empty(), empty(), empty(), empty()]);
        let service = service(transport.clone());

        let failure = service
            .submit(VIDEO_URL, &ExtractOptions::default())
            .await
            .unwrap_err();

        assert_eq!(failure.error, ClientError::EmptyResult);
        assert_eq!(failure.attempts, 3);
        assert!(!failure.retries_exhausted);
        assert_eq!(transport.calls(), 3);
        assert!(service.cache().current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_result_retry_can_be_disabled() {
        let transport = FakeService::new(vec![(
            Duration::ZERO,
            HttpResponse::new(200, r#"{"transcripts": {}}"#),
        )]);
        let orchestrator = Arc::new(RequestOrchestrator::new(transport.clone(), RetryPolicy::default()));
        let service = ExtractionService::new(orchestrator, Arc::new(ExtractionCache::new()))
            .with_empty_result_retries(0, Duration::ZERO);

        let failure = service
            .submit(VIDEO_URL, &ExtractOptions::default())
            .await
            .unwrap_err();

        assert_eq!(failure.error, ClientError::EmptyResult);
        assert!(!failure.retries_exhausted);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_does_not_overwrite_newer_result() {
        let transport = FakeService::new(vec![
            (
                Duration::from_secs(10),
                HttpResponse::new(200, segmented_body("old", &["en"])),
            ),
            (
                Duration::from_secs(1),
                HttpResponse::new(200, segmented_body("new", &["en"])),
            ),
        ]);
        let service = Arc::new(service(transport));

        let slow = {
            let service = service.clone();
            tokio::spawn(async move { service.submit(VIDEO_URL, &ExtractOptions::default()).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        let fast = service.submit(VIDEO_URL, &ExtractOptions::default()).await.unwrap();

        assert!(matches!(fast, SubmissionOutcome::Completed { generation: 2, .. }));
        assert_eq!(slow.await.unwrap().unwrap(), SubmissionOutcome::Superseded);
        assert_eq!(service.cache().current().unwrap().source_id, "new");
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_failure_of_overtaken_submission_is_ignored() {
        let transport = FakeService::new(vec![
            (
                Duration::from_secs(10),
                HttpResponse::new(404, r#"{"detail": "gone"}"#),
            ),
            (
                Duration::from_secs(1),
                HttpResponse::new(200, segmented_body("new", &["en"])),
            ),
        ]);
        let service = Arc::new(service(transport));

        let slow = {
            let service = service.clone();
            tokio::spawn(async move { service.submit(VIDEO_URL, &ExtractOptions::default()).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        let fast = service.submit(VIDEO_URL, &ExtractOptions::default()).await.unwrap();

        assert!(matches!(fast, SubmissionOutcome::Completed { generation: 2, .. }));
        assert_eq!(slow.await.unwrap().unwrap(), SubmissionOutcome::Superseded);
        assert_eq!(service.cache().current().unwrap().source_id, "new");
    }

    #[tokio::test(start_paused = true)]
    async fn test_overtaken_submission_stops_resubmitting_empty_results() {
        let transport = FakeService::new(vec![
            (Duration::ZERO, HttpResponse::new(200, r#"{"transcripts": {}}"#)),
            (Duration::ZERO, HttpResponse::new(200, segmented_body("new", &["en"]))),
        ]);
        let service = Arc::new(service(transport.clone()));

        let slow = {
            let service = service.clone();
            tokio::spawn(async move { service.submit(VIDEO_URL, &ExtractOptions::default()).await })
        };
        // Lands inside the first submission's empty-result pause
        tokio::time::sleep(Duration::from_millis(100)).await;
        service.submit(VIDEO_URL, &ExtractOptions::default()).await.unwrap();

        assert_eq!(slow.await.unwrap().unwrap(), SubmissionOutcome::Superseded);
        assert_eq!(transport.calls(), 2);
        assert_eq!(service.cache().current().unwrap().source_id, "new");
    }

    #[tokio::test(start_paused = true)]
    async fn test_http_failures_propagate_classification() {
        let transport = FakeService::new(vec![(
            Duration::ZERO,
            HttpResponse::new(404, r#"{"detail": "No transcript available"}"#),
        )]);
        let service = service(transport);

        let failure = service
            .submit(VIDEO_URL, &ExtractOptions::default())
            .await
            .unwrap_err();

        assert_eq!(failure.error, ClientError::NotFound("No transcript available".into()));
        assert!(!failure.retries_exhausted);
    }
}
