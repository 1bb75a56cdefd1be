// src/services/orchestrator.rs

//! Fan-out across all configured sources.
//!
//! Every source runs its own pipeline (policy → fetch → extract) and ends in
//! exactly one [`SourceStatus`]. Failures and panics are caught at the
//! per-source boundary, so one broken site never costs the others their
//! cycle. Novelty against earlier cycles is left to the caller.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::extractors::{ExtractContext, SourceExtractor, extractor_for};
use crate::models::{Config, CycleOutput, ListingRecord, SourceConfig, SourceStatus};
use crate::services::{BackoffPolicy, BackoffSettings, SourceHealth};
use crate::utils::http::{Fetch, FetchRequest};

/// Everything needed to poll one source.
pub struct SourcePipeline {
    name: String,
    request: FetchRequest,
    ctx: ExtractContext,
    extractor: Arc<dyn SourceExtractor>,
    policy: BackoffPolicy,
}

impl SourcePipeline {
    pub fn new(
        name: impl Into<String>,
        url: &str,
        extractor: Arc<dyn SourceExtractor>,
        settings: BackoffSettings,
    ) -> Result<Self> {
        let name = name.into();
        Ok(Self {
            request: extractor.request(url),
            ctx: ExtractContext::new(name.clone(), url)?,
            policy: BackoffPolicy::new(name.clone(), settings),
            extractor,
            name,
        })
    }

    pub fn from_config(source: &SourceConfig, settings: BackoffSettings) -> Result<Self> {
        Self::new(&source.name, &source.url, extractor_for(source.kind), settings)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    async fn run(&self, fetcher: &dyn Fetch) -> Result<Vec<ListingRecord>> {
        let body = self.policy.execute(fetcher, &self.request).await?;
        self.extractor.extract(&self.ctx, &body)
    }
}

/// Runs every source once per cycle and tracks their latest status.
pub struct Orchestrator {
    fetcher: Arc<dyn Fetch>,
    sources: Vec<SourcePipeline>,
    concurrency: usize,
    statuses: Mutex<BTreeMap<String, SourceStatus>>,
}

impl Orchestrator {
    pub fn new(fetcher: Arc<dyn Fetch>, sources: Vec<SourcePipeline>, concurrency: usize) -> Self {
        let statuses = sources
            .iter()
            .map(|s| (s.name.clone(), SourceStatus::NotChecked))
            .collect();
        Self {
            fetcher,
            sources,
            concurrency: concurrency.max(1),
            statuses: Mutex::new(statuses),
        }
    }

    /// Build pipelines for every enabled source in `config`.
    pub fn from_config(config: &Config, fetcher: Arc<dyn Fetch>) -> Result<Self> {
        let settings = BackoffSettings::from(&config.backoff);
        let sources = config
            .enabled_sources()
            .map(|source| SourcePipeline::from_config(source, settings.clone()))
            .collect::<Result<Vec<_>>>()?;
        log::info!(
            "Configured {} sources: {}",
            sources.len(),
            sources
                .iter()
                .map(SourcePipeline::name)
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Self::new(
            fetcher,
            sources,
            config.client.max_concurrent_sources,
        ))
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(SourcePipeline::name)
    }

    /// Poll every source once and return the combined snapshot.
    ///
    /// Never fails: a source that errors or panics contributes no records
    /// and reports its failure as status.
    pub async fn fetch_all(&self) -> CycleOutput {
        let mut output = CycleOutput::default();

        let mut results = stream::iter(&self.sources)
            .map(|source| async move {
                let outcome = AssertUnwindSafe(source.run(self.fetcher.as_ref()))
                    .catch_unwind()
                    .await;
                (source.name(), outcome)
            })
            .buffered(self.concurrency);

        while let Some((name, outcome)) = results.next().await {
            let status = match outcome {
                Ok(Ok(records)) => {
                    log::info!("{}: {} listings", name, records.len());
                    output.records.extend(records);
                    SourceStatus::Available
                }
                Ok(Err(error)) => {
                    log::warn!("{}: {}", name, error);
                    SourceStatus::from(&error)
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    log::error!("{}: pipeline panicked: {}", name, message);
                    SourceStatus::Error(message)
                }
            };
            output.statuses.insert(name.to_string(), status);
        }

        self.with_statuses(|statuses| statuses.extend(output.statuses.clone()));
        log::info!(
            "Cycle finished: {} listings from {} sources",
            output.records.len(),
            self.sources.len()
        );
        output
    }

    /// Latest status of every source.
    pub fn statuses(&self) -> BTreeMap<String, SourceStatus> {
        self.with_statuses(|statuses| statuses.clone())
    }

    /// Backoff health of every source.
    pub fn health(&self) -> BTreeMap<String, SourceHealth> {
        self.sources
            .iter()
            .map(|s| (s.name.clone(), s.policy.health()))
            .collect()
    }

    fn with_statuses<T>(&self, f: impl FnOnce(&mut BTreeMap<String, SourceStatus>) -> T) -> T {
        let mut guard = self.statuses.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
