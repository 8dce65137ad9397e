//! Suggestion Manager – orchestrates the local/remote suggestion pipeline.
//!
//! Flow: normalize → local lexicon (instant) → remote provider (bounded) → re-validated set.
//!
//! A non-empty remote result replaces the local one outright; the two are never
//! merged because their confidence scales are not comparable. Every remote
//! failure degrades to the local result, so `suggest` cannot fail.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::lexicon::LocalLexicon;
use crate::llm_client::{RemoteFailure, RemoteQuery, RemoteResult, RemoteSuggester};
use crate::settings::AppSettings;
use crate::suggestion::SuggestionSet;

/// Where the final set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionSource {
    /// Input was empty after trimming; nothing was computed.
    Empty,
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Suggestions {
    pub set: SuggestionSet,
    pub source: SuggestionSource,
    /// Set when the remote stage ran and failed.
    pub remote_failure: Option<RemoteFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemotePolicy {
    /// Hard bound on the whole remote stage, retries included.
    pub budget: Duration,
    pub max_retries: u32,
}

impl RemotePolicy {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            budget: settings.remote.timeout(),
            max_retries: settings.remote.max_retries,
        }
    }
}

pub struct SuggestionEngine {
    lexicon: Arc<LocalLexicon>,
    remote: Option<Arc<dyn RemoteSuggester>>,
    policy: RemotePolicy,
    max_suggestions: usize,
}

impl SuggestionEngine {
    pub fn new(
        lexicon: Arc<LocalLexicon>,
        remote: Option<Arc<dyn RemoteSuggester>>,
        policy: RemotePolicy,
        max_suggestions: usize,
    ) -> Self {
        Self {
            lexicon,
            remote,
            policy,
            max_suggestions,
        }
    }

    pub fn from_settings(
        lexicon: Arc<LocalLexicon>,
        remote: Option<Arc<dyn RemoteSuggester>>,
        settings: &AppSettings,
    ) -> Self {
        Self::new(
            lexicon,
            remote,
            RemotePolicy::from_settings(settings),
            settings.max_suggestions,
        )
    }

    /// The remote provider, if one is configured and enabled.
    fn active_remote(&self) -> Option<&dyn RemoteSuggester> {
        self.remote.as_deref().filter(|remote| remote.is_enabled())
    }

    pub fn is_local_only(&self) -> bool {
        self.active_remote().is_none()
    }

    /// Always produces a set, possibly empty.
    pub async fn suggest(&self, text: &str) -> SuggestionSet {
        self.suggest_with_source(text).await.set
    }

    pub async fn suggest_with_source(&self, text: &str) -> Suggestions {
        if text.trim().is_empty() {
            debug!("Empty input, skipping suggestion");
            return Suggestions {
                set: SuggestionSet::empty(self.max_suggestions),
                source: SuggestionSource::Empty,
                remote_failure: None,
            };
        }

        let local = self.lexicon.lookup(text);
        debug!(local_count = local.len(), "Local lexicon lookup complete");

        let Some(remote) = self.active_remote() else {
            return self.finish(local, SuggestionSource::Local, None);
        };

        let started = Instant::now();
        match self.query_remote(remote, text).await {
            Ok(set) if !set.is_empty() => {
                info!(
                    provider = remote.name(),
                    count = set.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Using remote suggestions"
                );
                self.finish(set, SuggestionSource::Remote, None)
            }
            Ok(_) => {
                debug!(provider = remote.name(), "Remote returned no suggestions, using local");
                self.finish(local, SuggestionSource::Local, None)
            }
            Err(failure) => {
                warn!(
                    provider = remote.name(),
                    kind = failure.kind(),
                    error = %failure,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Remote suggestion failed, falling back to local lexicon"
                );
                self.finish(local, SuggestionSource::Local, Some(failure))
            }
        }
    }

    fn finish(
        &self,
        set: SuggestionSet,
        source: SuggestionSource,
        remote_failure: Option<RemoteFailure>,
    ) -> Suggestions {
        Suggestions {
            set: set.revalidate(self.max_suggestions),
            source,
            remote_failure,
        }
    }

    /// Query the provider within the time budget, retrying transient
    /// `Unavailable` failures while budget remains.
    async fn query_remote(&self, remote: &dyn RemoteSuggester, text: &str) -> RemoteResult {
        let deadline = Instant::now() + self.policy.budget;

        let attempts = async {
            let mut attempt: u32 = 0;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(RemoteFailure::Timeout);
                }

                let result = remote
                    .query(RemoteQuery {
                        text: text.to_string(),
                        timeout: remaining,
                        max_suggestions: self.max_suggestions,
                    })
                    .await;

                match result {
                    Err(RemoteFailure::Unavailable(reason)) if attempt < self.policy.max_retries => {
                        attempt += 1;
                        debug!(attempt, reason = %reason, "Retrying remote suggestion");
                    }
                    other => return other,
                }
            }
        };

        match tokio::time::timeout_at(deadline, attempts).await {
            Ok(result) => result,
            Err(_) => Err(RemoteFailure::Timeout),
        }
    }
}
