//! Scrape-resolve-persist ingestion pipeline
//!
//! One foreground loop walks the id sequence, fetching and parsing one work
//! at a time. Parsed works accumulate into a batch; person credits of
//! unflushed works accumulate into a pending set that is resolved whenever
//! it reaches the person threshold and at every batch handoff. A full batch
//! is moved into a background persistence task while fetching continues.
//!
//! At most one persistence task exists: it is awaited before the next one is
//! spawned and before the foreground creates persons, so store writes are
//! serialized. Whatever ends the walk, the pending persons, the in-flight
//! task and the trailing batch are drained before the run returns.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{Instrument, debug, error, info, warn};

use crate::application::entity_resolver::EntityResolver;
use crate::application::error::{HarvestError, HarvestResult};
use crate::application::run_scope::{RunScope, RunStatus};
use crate::application::sources::WorkSource;
use crate::domain::entities::{PersonId, PersonRef, ScrapedWork, WorkRelations};
use crate::domain::repositories::CatalogStore;

/// External ids to walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdSequence {
    /// Explicit ids, walked in the given order
    List(Vec<i64>),
    /// `start..stop` (stop exclusive), at most `count` ids; unbounded without either
    Range {
        start: i64,
        stop: Option<i64>,
        count: Option<usize>,
    },
}

impl IdSequence {
    pub fn iter(&self) -> Box<dyn Iterator<Item = i64> + Send + '_> {
        match self {
            Self::List(ids) => Box::new(ids.iter().copied()),
            Self::Range { start, stop, count } => {
                let stop = *stop;
                let ids = (*start..).take_while(move |id| stop.is_none_or(|stop| *id < stop));
                match count {
                    Some(count) => Box::new(ids.take(*count)),
                    None => Box::new(ids),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub person_flush_threshold: usize,
    /// Consecutive counted fetch failures tolerated; one more aborts the run
    pub stop_limit: u32,
    /// Pause after every successful work fetch
    pub request_delay: Duration,
}

impl PipelineConfig {
    pub const DEFAULT_BATCH_SIZE: usize = 50;
    pub const DEFAULT_PERSON_FLUSH_THRESHOLD: usize = 100;
    pub const DEFAULT_STOP_LIMIT: u32 = 100;
    pub const DEFAULT_REQUEST_DELAY_MS: u64 = 1000;
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: Self::DEFAULT_BATCH_SIZE,
            person_flush_threshold: Self::DEFAULT_PERSON_FLUSH_THRESHOLD,
            stop_limit: Self::DEFAULT_STOP_LIMIT,
            request_delay: Duration::from_millis(Self::DEFAULT_REQUEST_DELAY_MS),
        }
    }
}

/// Counters of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Works fetched and parsed, or read from a dump
    pub fetched: usize,
    /// Ids skipped without counting toward the breaker (parse errors, invalid requests)
    pub skipped: usize,
    /// Counted fetch failures
    pub failures: usize,
    /// Ids seen again in the same run
    pub duplicates: usize,
    pub batches: usize,
    pub works_persisted: usize,
    /// Works that were already stored when their batch was persisted
    pub works_already_stored: usize,
    pub persons_created: usize,
}

/// Result of one persistence task
#[derive(Debug, Clone, Copy, Default)]
struct BatchOutcome {
    persisted: usize,
    already_stored: usize,
}

/// Where the works of one run come from
enum Feed<'a> {
    Ids(&'a IdSequence),
    Records { works: Vec<ScrapedWork>, start: usize },
}

/// State owned by the foreground loop
struct RunState {
    batch: Vec<ScrapedWork>,
    pending_persons: Vec<PersonRef>,
    pending_ids: HashSet<i64>,
    person_ids: HashMap<i64, PersonId>,
    in_flight: Option<JoinHandle<HarvestResult<BatchOutcome>>>,
    /// Set once person resolution or a persistence task failed
    store_failed: bool,
    report: RunReport,
}

impl RunState {
    fn new(batch_size: usize) -> Self {
        Self {
            batch: Vec::with_capacity(batch_size),
            pending_persons: Vec::new(),
            pending_ids: HashSet::new(),
            person_ids: HashMap::new(),
            in_flight: None,
            store_failed: false,
            report: RunReport::default(),
        }
    }
}

pub struct IngestionPipeline<S: CatalogStore + ?Sized + 'static> {
    resolver: EntityResolver<S>,
    works: Arc<dyn WorkSource>,
    config: PipelineConfig,
}

impl<S: CatalogStore + ?Sized + 'static> IngestionPipeline<S> {
    pub fn new(resolver: EntityResolver<S>, works: Arc<dyn WorkSource>, config: PipelineConfig) -> Self {
        Self {
            resolver,
            works,
            config: PipelineConfig {
                batch_size: config.batch_size.max(1),
                person_flush_threshold: config.person_flush_threshold.max(1),
                ..config
            },
        }
    }

    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Harvest every id of the sequence
    ///
    /// Returns [`HarvestError::CircuitOpen`] once more than `stop_limit`
    /// consecutive fetches failed, after everything fetched so far has been
    /// persisted.
    pub async fn run(&self, ids: &IdSequence) -> HarvestResult<RunReport> {
        self.execute("harvest", Feed::Ids(ids)).await
    }

    /// Push previously scraped records through the same resolve and persist
    /// path, starting at index `start` of the dump
    pub async fn import(&self, works: Vec<ScrapedWork>, start: usize) -> HarvestResult<RunReport> {
        if start > works.len() {
            warn!("Import start {} is past the end of the dump ({} records)", start, works.len());
        }
        self.execute("import", Feed::Records { works, start }).await
    }

    async fn execute(&self, label: &'static str, feed: Feed<'_>) -> HarvestResult<RunReport> {
        let scope = RunScope::start(label);
        let span = scope.span().clone();

        let result = async {
            let mut state = RunState::new(self.config.batch_size);
            let walked = match feed {
                Feed::Ids(ids) => self.walk(ids, &mut state).await,
                Feed::Records { works, start } => self.replay(works, start, &mut state).await,
            };
            let drained = self.drain(&mut state).await;

            match (walked, drained) {
                (Ok(()), Ok(())) => Ok(state.report),
                (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
                (Err(walk_error), Err(drain_error)) => {
                    error!("Walk error superseded by drain failure: {}", walk_error);
                    Err(drain_error)
                }
            }
        }
        .instrument(span)
        .await;

        let status = match &result {
            Ok(report) => {
                info!(
                    "📊 fetched {}, persisted {}, already stored {}, skipped {}, failures {}, persons created {}",
                    report.fetched,
                    report.works_persisted,
                    report.works_already_stored,
                    report.skipped,
                    report.failures,
                    report.persons_created
                );
                RunStatus::Completed
            }
            Err(e) if e.is_circuit_open() => RunStatus::CircuitOpen,
            Err(_) => RunStatus::Failed,
        };
        scope.finish(status);

        result
    }

    async fn replay(&self, works: Vec<ScrapedWork>, start: usize, state: &mut RunState) -> HarvestResult<()> {
        let mut seen = HashSet::new();

        for (index, work) in works.into_iter().enumerate().skip(start) {
            if !seen.insert(work.external_id) {
                debug!("Skipping repeated record #{} ({})", index, work.external_id);
                state.report.duplicates += 1;
                continue;
            }
            debug!("📄 record #{} -> {} ({})", index, work.title, work.external_id);
            state.report.fetched += 1;
            self.enqueue(work, state).await?;
        }

        Ok(())
    }

    async fn walk(&self, ids: &IdSequence, state: &mut RunState) -> HarvestResult<()> {
        let mut seen = HashSet::new();
        let mut consecutive_failures: u32 = 0;

        for external_id in ids.iter() {
            if !seen.insert(external_id) {
                debug!("Skipping repeated id {}", external_id);
                state.report.duplicates += 1;
                continue;
            }

            match self.works.fetch_work(external_id).await {
                Ok(work) => {
                    consecutive_failures = 0;
                    state.report.fetched += 1;
                    debug!("📄 {} -> {}", external_id, work.title);
                    self.enqueue(work, state).await?;
                    sleep(self.config.request_delay).await;
                }
                Err(e) if e.counts_toward_breaker() => {
                    consecutive_failures += 1;
                    state.report.failures += 1;
                    warn!(
                        "Fetch failed for {} ({}/{} consecutive): {}",
                        external_id, consecutive_failures, self.config.stop_limit, e
                    );
                    if consecutive_failures > self.config.stop_limit {
                        return Err(HarvestError::CircuitOpen {
                            failures: consecutive_failures,
                            stop_limit: self.config.stop_limit,
                            last_external_id: external_id,
                        });
                    }
                }
                Err(e) => {
                    state.report.skipped += 1;
                    warn!("Skipping {}: {}", external_id, e);
                }
            }
        }

        Ok(())
    }

    async fn enqueue(&self, work: ScrapedWork, state: &mut RunState) -> HarvestResult<()> {
        for person in work.person_refs() {
            if !state.person_ids.contains_key(&person.external_id) && state.pending_ids.insert(person.external_id) {
                state.pending_persons.push(person.clone());
            }
        }
        state.batch.push(work);

        if state.pending_persons.len() >= self.config.person_flush_threshold {
            self.flush_persons(state).await?;
        }
        if state.batch.len() >= self.config.batch_size {
            self.flush_batch(state).await?;
        }
        Ok(())
    }

    /// Resolve pending credits; creation waits for the in-flight task
    ///
    /// Pending credits are only released once their persons are committed.
    async fn flush_persons(&self, state: &mut RunState) -> HarvestResult<()> {
        if state.pending_persons.is_empty() {
            return Ok(());
        }

        let result = self.resolve_pending(state).await;
        if result.is_err() {
            state.store_failed = true;
        }
        result
    }

    async fn resolve_pending(&self, state: &mut RunState) -> HarvestResult<()> {
        let plan = self.resolver.plan_persons(&state.pending_persons).await?;
        let to_create = plan.to_create.len();
        if !plan.is_noop() {
            self.await_in_flight(state).await?;
        }
        let resolved = self.resolver.commit_persons(plan).await?;

        state.pending_persons.clear();
        state.pending_ids.clear();
        state.report.persons_created += to_create;
        state.person_ids.extend(resolved);
        Ok(())
    }

    /// Hand the current batch to a new persistence task
    async fn flush_batch(&self, state: &mut RunState) -> HarvestResult<()> {
        self.flush_persons(state).await?;
        self.await_in_flight(state).await?;
        self.spawn_persistence(state);
        Ok(())
    }

    fn spawn_persistence(&self, state: &mut RunState) {
        let works = mem::replace(&mut state.batch, Vec::with_capacity(self.config.batch_size));
        let person_ids = mem::take(&mut state.person_ids);
        state.report.batches += 1;
        let batch_no = state.report.batches;

        debug!("Handing batch {} ({} works) to persistence", batch_no, works.len());
        let resolver = self.resolver.clone();
        let task = persist_batch(resolver, works, person_ids, batch_no).in_current_span();
        state.in_flight = Some(tokio::spawn(task));
    }

    async fn await_in_flight(&self, state: &mut RunState) -> HarvestResult<()> {
        let Some(handle) = state.in_flight.take() else {
            return Ok(());
        };
        match handle.await.map_err(HarvestError::from).and_then(std::convert::identity) {
            Ok(outcome) => {
                state.report.works_persisted += outcome.persisted;
                state.report.works_already_stored += outcome.already_stored;
                Ok(())
            }
            Err(e) => {
                state.store_failed = true;
                Err(e)
            }
        }
    }

    /// Pending persons, in-flight task, trailing batch
    ///
    /// After a store failure the trailing batch is left unwritten; its ids
    /// stay gaps for a later run instead of being stored without credits.
    async fn drain(&self, state: &mut RunState) -> HarvestResult<()> {
        let persons = if state.store_failed { Ok(()) } else { self.flush_persons(state).await };
        let in_flight = self.await_in_flight(state).await;
        persons?;
        in_flight?;

        if state.store_failed {
            if !state.batch.is_empty() {
                warn!("Store failed earlier in the run; leaving {} fetched works unwritten", state.batch.len());
            }
            return Ok(());
        }
        if !state.batch.is_empty() {
            self.spawn_persistence(state);
            self.await_in_flight(state).await?;
        }
        Ok(())
    }
}

async fn persist_batch<S: CatalogStore + ?Sized>(
    resolver: EntityResolver<S>,
    works: Vec<ScrapedWork>,
    person_ids: HashMap<i64, PersonId>,
    batch_no: usize,
) -> HarvestResult<BatchOutcome> {
    let store = resolver.store();

    let external_ids: Vec<i64> = works.iter().map(|w| w.external_id).collect();
    let stored: HashSet<i64> = store
        .find_works_by_external_ids(&external_ids)
        .await?
        .into_iter()
        .map(|w| w.external_id)
        .collect();
    let fresh: Vec<&ScrapedWork> = works.iter().filter(|w| !stored.contains(&w.external_id)).collect();

    let genre_names: Vec<String> = fresh.iter().flat_map(|w| w.genres.iter().cloned()).collect();
    let dubbing_names: Vec<String> = fresh.iter().flat_map(|w| w.dubbings.iter().cloned()).collect();
    let genres = resolver.resolve_genres_map(&genre_names).await?;
    let dubbings = resolver.resolve_dubbings_map(&dubbing_names).await?;

    let person_id = |person: &PersonRef| {
        let id = person_ids.get(&person.external_id).copied();
        if id.is_none() {
            warn!("No person id for credit {} ({})", person.external_id, person.name);
        }
        id
    };

    for work in &fresh {
        let relations = WorkRelations {
            genres: unique(work.genres.iter().filter_map(|g| genres.get(g).copied())),
            dubbings: unique(work.dubbings.iter().filter_map(|d| dubbings.get(d).copied())),
            actors: unique(work.actors.iter().filter_map(&person_id)),
            directors: unique(work.directors.iter().filter_map(&person_id)),
        };
        store.create_work_with_relations(&work.to_new_work(), &relations).await?;
    }

    let outcome = BatchOutcome {
        persisted: fresh.len(),
        already_stored: works.len() - fresh.len(),
    };
    info!(
        "💾 Batch {} persisted: {} new, {} already stored",
        batch_no, outcome.persisted, outcome.already_stored
    );
    Ok(outcome)
}

fn unique<T: Copy + Eq + std::hash::Hash>(ids: impl Iterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}
