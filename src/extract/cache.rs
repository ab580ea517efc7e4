use std::ops::Deref;
use std::sync::{Arc, RwLock};

use super::models::{ExtractionResult, TranscriptVariant};

/// Marks one submission; only the newest ticket may store a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionTicket {
    generation: u64,
}

impl SubmissionTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Result is live, with the language selected by default
    Stored { language: Option<String> },

    /// A newer submission started since this ticket was issued
    Stale,
}

/// Borrowed view of one variant inside the cached result
#[derive(Debug, Clone)]
pub struct CachedVariant {
    result: Arc<ExtractionResult>,
    index: usize,
}

impl CachedVariant {
    pub fn result(&self) -> &ExtractionResult {
        &self.result
    }
}

impl Deref for CachedVariant {
    type Target = TranscriptVariant;

    fn deref(&self) -> &Self::Target {
        &self.result.variants[self.index]
    }
}

#[derive(Default)]
struct CacheState {
    generation: u64,
    result: Option<Arc<ExtractionResult>>,
    selected: Option<usize>,
}

/// Holds the variants of the most recent extraction.
///
/// Language switches are served from memory and never touch the network.
#[derive(Default)]
pub struct ExtractionCache {
    state: RwLock<CacheState>,
}

impl ExtractionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new submission, invalidating every earlier ticket
    pub fn begin_submission(&self) -> SubmissionTicket {
        let mut state = self.write();
        state.generation += 1;
        tracing::debug!(generation = state.generation, "New submission");
        SubmissionTicket {
            generation: state.generation,
        }
    }

    pub fn is_current(&self, ticket: &SubmissionTicket) -> bool {
        self.read().generation == ticket.generation
    }

    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    /// Replace the cached result wholesale, unless the ticket is stale
    pub fn store(&self, ticket: SubmissionTicket, result: ExtractionResult) -> StoreOutcome {
        let mut state = self.write();

        if state.generation != ticket.generation {
            tracing::debug!(
                generation = ticket.generation,
                current = state.generation,
                "Discarding stale extraction result"
            );
            return StoreOutcome::Stale;
        }

        let selected = result
            .preferred_language()
            .and_then(|code| result.find_variant_index(code));
        let language = selected.map(|i| result.variants[i].language_code.clone());

        tracing::debug!(
            generation = ticket.generation,
            variants = result.variants.len(),
            language = language.as_deref().unwrap_or("-"),
            "Cached extraction result"
        );

        state.result = Some(Arc::new(result));
        state.selected = selected;
        StoreOutcome::Stored { language }
    }

    /// Switch the displayed language.
    ///
    /// Exact code first, then the first variant whose code starts with `code`.
    pub fn select_language(&self, code: &str) -> Option<CachedVariant> {
        let mut state = self.write();
        let result = state.result.clone()?;
        let index = result.find_variant_index(code)?;
        state.selected = Some(index);
        Some(CachedVariant { result, index })
    }

    /// The variant currently selected for display
    pub fn selected(&self) -> Option<CachedVariant> {
        let state = self.read();
        let result = state.result.clone()?;
        let index = state.selected?;
        Some(CachedVariant { result, index })
    }

    pub fn current(&self) -> Option<Arc<ExtractionResult>> {
        self.read().result.clone()
    }

    /// Cached language codes in response order
    pub fn available_languages(&self) -> Vec<String> {
        self.read()
            .result
            .as_ref()
            .map(|r| r.language_codes().into_iter().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        let mut state = self.write();
        state.result = None;
        state.selected = None;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
