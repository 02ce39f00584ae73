//! Ordered multi-provider acquisition with timeouts and cancellation

use super::http::build_client;
use super::{build_provider, AcquiredContent, AcquisitionQuery, ContentProvider, ProviderOutcome};
use crate::cancel::CancelSignal;
use crate::errors::Result;
use refgraph_common::metrics::record_provider_attempt;
use refgraph_common::{AppConfig, ProviderKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Content,
    Miss,
    Error,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Content => "content",
            AttemptOutcome::Miss => "miss",
            AttemptOutcome::Error => "error",
        }
    }
}

/// Record of one provider call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderAttempt {
    pub provider: ProviderKind,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayOutcome {
    Content {
        content: AcquiredContent,
        provider: ProviderKind,
        attempts: Vec<ProviderAttempt>,
    },
    NotFound {
        attempts: Vec<ProviderAttempt>,
    },
    /// The run was cancelled while a provider was being tried
    Cancelled {
        attempts: Vec<ProviderAttempt>,
    },
}

impl GatewayOutcome {
    pub fn attempts(&self) -> &[ProviderAttempt] {
        match self {
            GatewayOutcome::Content { attempts, .. }
            | GatewayOutcome::NotFound { attempts }
            | GatewayOutcome::Cancelled { attempts } => attempts,
        }
    }
}

struct ProviderSlot {
    provider: Arc<dyn ContentProvider>,
    timeout: Duration,
}

/// Tries providers in priority order, stopping at the first one with content
pub struct SourceGateway {
    slots: Vec<ProviderSlot>,
}

impl SourceGateway {
    pub fn new(providers: Vec<(Arc<dyn ContentProvider>, Duration)>) -> Self {
        let slots = providers
            .into_iter()
            .map(|(provider, timeout)| ProviderSlot { provider, timeout })
            .collect();
        Self { slots }
    }

    /// Build the enabled providers in configured order, sharing one HTTP client
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = build_client(&config.providers.http)?;
        let providers = config
            .enabled_providers()
            .map(|source| (build_provider(source, client.clone(), config), source.timeout()))
            .collect::<Vec<_>>();

        info!(
            providers = ?providers.iter().map(|(p, _)| p.kind().as_str()).collect::<Vec<_>>(),
            "Source gateway configured"
        );
        Ok(Self::new(providers))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn providers(&self) -> Vec<ProviderKind> {
        self.slots.iter().map(|slot| slot.provider.kind()).collect()
    }

    /// Acquire a document; only a malformed query is an error
    #[instrument(skip(self, query, cancel), fields(title = %query.title, author = %query.author))]
    pub async fn acquire(
        &self,
        query: &AcquisitionQuery,
        cancel: &CancelSignal,
    ) -> Result<GatewayOutcome> {
        query.validate()?;

        let mut attempts = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let kind = slot.provider.kind();
            let started = Instant::now();

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = tokio::time::timeout(slot.timeout, slot.provider.try_fetch(query)) => Some(result),
            };

            let elapsed = started.elapsed();
            let (attempt_outcome, detail, content) = match outcome {
                None => (AttemptOutcome::Error, Some("cancelled".to_string()), None),
                Some(Err(_)) => (
                    AttemptOutcome::Error,
                    Some(format!("timed out after {}ms", slot.timeout.as_millis())),
                    None,
                ),
                Some(Ok(ProviderOutcome::Content(content))) => {
                    (AttemptOutcome::Content, None, Some(content))
                }
                Some(Ok(ProviderOutcome::Miss)) => (AttemptOutcome::Miss, None, None),
                Some(Ok(ProviderOutcome::Error(message))) => {
                    (AttemptOutcome::Error, Some(message), None)
                }
            };

            record_provider_attempt(kind.as_str(), attempt_outcome.as_str(), elapsed.as_secs_f64());
            match attempt_outcome {
                AttemptOutcome::Error => warn!(
                    provider = %kind,
                    error = detail.as_deref().unwrap_or_default(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Provider attempt failed"
                ),
                _ => debug!(
                    provider = %kind,
                    outcome = attempt_outcome.as_str(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Provider attempt finished"
                ),
            }

            attempts.push(ProviderAttempt {
                provider: kind,
                outcome: attempt_outcome,
                detail,
                elapsed_ms: elapsed.as_millis() as u64,
            });

            if cancel.is_cancelled() {
                return Ok(GatewayOutcome::Cancelled { attempts });
            }
            if let Some(content) = content {
                return Ok(GatewayOutcome::Content {
                    content,
                    provider: kind,
                    attempts,
                });
            }
        }

        Ok(GatewayOutcome::NotFound { attempts })
    }
}
