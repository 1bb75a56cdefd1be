// src/pipeline/monitor.rs

//! Polling loop.
//!
//! The first cycle after startup is a baseline and announces nothing. Every
//! later cycle announces the listings that are new since the previous
//! snapshot, unseen by the persistent cache and accepted by the filter.
//! Shutdown is only honoured between cycles; the cache is always flushed
//! on the way out.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;

use super::diff::{ListingFilter, new_since, snapshot_keys, unseen};
use crate::error::Result;
use crate::models::{Config, CycleOutput, Field, ListingRecord, SourceStatus};
use crate::services::Orchestrator;
use crate::storage::DedupCache;
use crate::utils::http::Fetch;

/// Delivery of new listings to the user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn announce(&self, record: &ListingRecord) -> Result<()>;
}

/// Writes announcements to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn announce(&self, record: &ListingRecord) -> Result<()> {
        let details: Vec<String> = [Field::Rooms, Field::Area, Field::RentWarm, Field::Address]
            .into_iter()
            .filter_map(|field| record.attributes.get(field).map(|v| format!("{field}: {v}")))
            .collect();
        log::info!(
            "New listing [{}] {}{} ({}) {}",
            record.source,
            record.title,
            if record.requires_eligibility_certificate { " [WBS]" } else { "" },
            details.join(", "),
            record.link.as_deref().unwrap_or("-")
        );
        Ok(())
    }
}

pub struct Monitor {
    orchestrator: Orchestrator,
    cache: DedupCache,
    notifier: Arc<dyn Notifier>,
    filter: ListingFilter,
    interval: Duration,
    previous: Option<HashSet<String>>,
}

impl Monitor {
    pub fn new(
        orchestrator: Orchestrator,
        cache: DedupCache,
        notifier: Arc<dyn Notifier>,
        filter: ListingFilter,
        interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            cache,
            notifier,
            filter,
            interval,
            previous: None,
        }
    }

    pub fn from_config(
        config: &Config,
        fetcher: Arc<dyn Fetch>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        Ok(Self::new(
            Orchestrator::from_config(config, fetcher)?,
            DedupCache::from_config(&config.cache),
            notifier,
            ListingFilter::from(&config.monitor),
            config.monitor.interval(),
        ))
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn cache(&self) -> &DedupCache {
        &self.cache
    }

    /// Load the cache and take the baseline snapshot.
    pub async fn startup(&mut self) -> CycleOutput {
        self.cache.load().await;
        self.previous = None;
        let (output, _) = self.run_cycle().await;
        output
    }

    /// Poll once and announce what is new. Returns the snapshot and the
    /// announced records.
    pub async fn run_cycle(&mut self) -> (CycleOutput, Vec<ListingRecord>) {
        let output = self.orchestrator.fetch_all().await;
        let mut keys = snapshot_keys(&output.records);

        let Some(previous) = self.previous.take() else {
            let marked = self.cache.mark_many_seen(keys.iter().cloned());
            log::info!(
                "Baseline: {} listings ({} not cached before)",
                keys.len(),
                marked
            );
            self.cache.save(false).await;
            self.previous = Some(keys);
            return (output, Vec::new());
        };

        let candidates = self
            .filter
            .apply(unseen(&self.cache, new_since(&previous, &output.records)));

        let mut announced = Vec::new();
        for record in candidates {
            match self.notifier.announce(&record).await {
                Ok(()) => {
                    self.cache.mark_seen(record.key());
                    announced.push(record);
                }
                Err(e) => {
                    // retried next cycle
                    log::error!("Failed to announce {}: {}", record.key(), e);
                    keys.remove(&record.key());
                }
            }
        }

        if announced.is_empty() {
            log::debug!("No new listings");
        } else {
            log::info!("Announced {} new listings", announced.len());
        }

        self.cache.save(false).await;
        self.previous = Some(keys);
        (output, announced)
    }

    /// Poll every `interval` until `shutdown` resolves, then flush the cache.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        if self.previous.is_none() {
            self.startup().await;
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("Shutdown requested, stopping monitor");
                    break;
                }
                _ = ticker.tick() => {}
            }
            self.run_cycle().await;
        }

        self.cache.save(true).await;
    }

    /// Forget every seen listing.
    pub async fn reset_cache(&self) {
        self.cache.reset().await;
    }

    pub async fn fetch_all(&self) -> CycleOutput {
        self.orchestrator.fetch_all().await
    }

    pub fn is_duplicate(&self, key: &str) -> bool {
        self.cache.is_seen(key)
    }

    pub fn mark_seen(&self, key: &str) -> bool {
        self.cache.mark_seen(key)
    }

    pub fn statuses(&self) -> BTreeMap<String, SourceStatus> {
        self.orchestrator.statuses()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::error::AppError;
    use crate::models::{ExtractorKind, SourceConfig};
    use crate::services::{BackoffSettings, SourcePipeline};
    use crate::utils::http::FetchRequest;

    const API: &str = "https://api.example/immoSearch";

    /// Serves the scripted bodies in order, repeating the last one.
    struct ScriptedPages {
        pages: Vec<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetch for ScriptedPages {
        async fn fetch(&self, _request: &FetchRequest) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.pages[call.min(self.pages.len() - 1)].clone())
        }
    }

    #[derive(Default)]
    struct Recorder {
        announced: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn announce(&self, record: &ListingRecord) -> Result<()> {
            if self.fail_on == Some(record.id.as_str()) {
                return Err(AppError::unavailable("chat offline"));
            }
            self.announced.lock().unwrap().push(record.id.clone());
            Ok(())
        }
    }

    fn page(flats: &[(&str, &str, &str)]) -> String {
        let data: Vec<_> = flats
            .iter()
            .map(|(id, rooms, headline)| {
                json!({ "headline": headline, "details": { "immoNumber": id, "rooms": rooms } })
            })
            .collect();
        json!({ "data": data }).to_string()
    }

    fn monitor(dir: &TempDir, pages: Vec<String>, notifier: Arc<Recorder>) -> Monitor {
        let source = SourceConfig::new("Stadt und Land", API, ExtractorKind::StadtUndLand);
        let pipeline = SourcePipeline::from_config(&source, BackoffSettings::default()).unwrap();
        let fetcher = Arc::new(ScriptedPages {
            pages,
            calls: AtomicUsize::new(0),
        });
        Monitor::new(
            Orchestrator::new(fetcher, vec![pipeline], 1),
            DedupCache::new(dir.path().join("seen.json"), 10),
            notifier,
            ListingFilter::default(),
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn test_baseline_then_announce_new() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let mut monitor = monitor(
            &dir,
            vec![
                page(&[("1", "2", "Alt")]),
                page(&[
                    ("1", "2", "Alt"),
                    ("2", "3", "Neu"),
                    ("3", "1", "Zu klein"),
                    ("4", "3", "Neu mit WBS"),
                ]),
            ],
            Arc::clone(&recorder),
        );

        let baseline = monitor.startup().await;
        assert_eq!(baseline.records.len(), 1);
        assert!(monitor.is_duplicate("Stadt und Land:1"));

        let (output, announced) = monitor.run_cycle().await;
        assert_eq!(output.records.len(), 4);
        assert_eq!(announced.len(), 1);
        assert_eq!(*recorder.announced.lock().unwrap(), vec!["2".to_string()]);
        assert!(monitor.is_duplicate("Stadt und Land:2"));
        assert!(!monitor.is_duplicate("Stadt und Land:3"));

        // same snapshot again: nothing new
        let (_, announced) = monitor.run_cycle().await;
        assert!(announced.is_empty());
        assert_eq!(monitor.statuses()["Stadt und Land"], SourceStatus::Available);
    }

    #[tokio::test]
    async fn test_seen_listing_not_announced_again() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let mut monitor = monitor(
            &dir,
            vec![page(&[]), page(&[("9", "2", "Schon bekannt")])],
            Arc::clone(&recorder),
        );

        monitor.startup().await;
        assert!(monitor.mark_seen("Stadt und Land:9"));
        let (_, announced) = monitor.run_cycle().await;
        assert!(announced.is_empty());
    }

    #[tokio::test]
    async fn test_failed_announcement_is_retried() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder {
            fail_on: Some("5"),
            ..Recorder::default()
        });
        let mut monitor = monitor(
            &dir,
            vec![page(&[]), page(&[("5", "2", "Neu")])],
            Arc::clone(&recorder),
        );

        monitor.startup().await;
        let (_, announced) = monitor.run_cycle().await;
        assert!(announced.is_empty());
        assert!(!monitor.is_duplicate("Stadt und Land:5"));

        // still considered new on the next cycle
        let (output, _) = monitor.run_cycle().await;
        assert_eq!(output.records.len(), 1);
        assert!(!monitor.is_duplicate("Stadt und Land:5"));
    }

    #[tokio::test]
    async fn test_run_flushes_cache_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let mut monitor = monitor(
            &dir,
            vec![page(&[("1", "2", "Alt")]), page(&[("1", "2", "Alt"), ("2", "2", "Neu")])],
            Arc::clone(&recorder),
        );

        monitor
            .run(tokio::time::sleep(Duration::from_millis(60)))
            .await;

        assert!(monitor.cache().path().exists());
        assert_eq!(*recorder.announced.lock().unwrap(), vec!["2".to_string()]);

        let reloaded = DedupCache::new(dir.path().join("seen.json"), 10);
        reloaded.load().await;
        assert!(reloaded.is_seen("Stadt und Land:1"));
        assert!(reloaded.is_seen("Stadt und Land:2"));
    }

    #[tokio::test]
    async fn test_reset_cache_hook() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&dir, vec![page(&[])], Arc::new(Recorder::default()));

        monitor.mark_seen("x");
        monitor.reset_cache().await;
        assert!(!monitor.is_duplicate("x"));
        assert_eq!(
            monitor.statuses()["Stadt und Land"],
            SourceStatus::NotChecked
        );
    }
}
