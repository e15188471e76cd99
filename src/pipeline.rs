use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::warn;

use crate::config::ResolvedConfig;
use crate::domain::Term;
use crate::error::PipelineError;
use crate::feed::TermFeed;
use crate::load::{LoadCoordinator, LoadReport, TableContract};
use crate::ols::{OlsApi, Pager};
use crate::parents::{ChildOutcome, ParentResolver};
use crate::warehouse::{TableReference, Warehouse};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Extract and resolve without committing anything.
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: String,
    pub elapsed_ms: u64,
    pub pages_fetched: usize,
    pub terms_extracted: u64,
    pub parent_lookups: usize,
    pub edges_resolved: usize,
    pub parent_failures: usize,
    pub tables: Vec<LoadReport>,
}

/// End-to-end ingestion run: pager -> term feed -> {terms table, parent
/// fan-out} -> terms_parents table.
///
/// Batching boundary: `terms` commits once per source page, so a fatal
/// listing failure keeps every fully processed page; `terms_parents` commits
/// once after the fan-out drains. A feed failure is fatal but still lets
/// already dispatched parent lookups finish before the run stops.
#[derive(Clone)]
pub struct Pipeline<C: OlsApi, W: Warehouse> {
    client: C,
    warehouse: W,
    config: ResolvedConfig,
}

impl<C: OlsApi, W: Warehouse> Pipeline<C, W> {
    pub fn new(client: C, warehouse: W, config: ResolvedConfig) -> Self {
        Self {
            client,
            warehouse,
            config,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn run(
        &self,
        options: RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, PipelineError> {
        let started_at = chrono::Utc::now().to_rfc3339();
        let start = Instant::now();
        let config = &self.config;

        let pager = Pager::new(
            &self.client,
            config.first_page_url(),
            &config.data_selector,
            &config.next_link_path,
        );
        let mut feed = TermFeed::new(pager, config.limit);

        let mut terms_coordinator =
            LoadCoordinator::new(&self.warehouse, terms_contract(config));
        let mut parents_coordinator =
            LoadCoordinator::new(&self.warehouse, parents_contract(config));

        let workers = if config.parallel_fanout {
            config.fanout_workers
        } else {
            1
        };
        let resolver = ParentResolver::new(&self.client, workers);

        let mut terms_report = LoadReport {
            table: config.terms_table.clone(),
            loaded: 0,
            failed: 0,
        };
        let mut parents_report = LoadReport {
            table: config.parents_table.clone(),
            loaded: 0,
            failed: 0,
        };
        let mut parent_lookups = 0usize;
        let mut edges_resolved = 0usize;
        let mut parent_failures = 0usize;

        thread::scope(|scope| -> Result<(), PipelineError> {
            let (term_tx, term_rx) =
                crossbeam_channel::bounded::<Term>(resolver.workers() * 2);
            let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded::<ChildOutcome>();
            scope.spawn(|| resolver.run(term_rx, outcome_tx));

            let feed_result = (|| -> Result<(), PipelineError> {
                while let Some(page) = feed.next_page() {
                    let terms = page?;
                    sink.event(ProgressEvent {
                        message: format!(
                            "phase=Extract; page {} ({} terms)",
                            feed.pages_fetched(),
                            terms.len()
                        ),
                        elapsed: Some(start.elapsed()),
                    });
                    if terms.is_empty() {
                        continue;
                    }
                    if !options.dry_run {
                        let report = terms_coordinator.load(&terms)?;
                        terms_report.absorb(&report);
                    }
                    for term in &terms {
                        if term.parent_url.is_some() {
                            parent_lookups += 1;
                            if term_tx.send(term.clone()).is_err() {
                                break;
                            }
                        }
                    }
                }
                Ok(())
            })();
            drop(term_tx);

            // Dispatched lookups drain to completion even on a fatal feed
            // failure; no new dispatches occur.
            let mut edges = Vec::new();
            for outcome in outcome_rx.iter() {
                match outcome.result {
                    Ok(batch) => edges.extend(batch),
                    Err(error) => {
                        parent_failures += 1;
                        warn!(child = %outcome.child_iri, error = %error, "parent lookup failed");
                        sink.event(ProgressEvent {
                            message: format!(
                                "phase=Resolve; parent lookup failed for {}",
                                outcome.child_iri
                            ),
                            elapsed: Some(start.elapsed()),
                        });
                    }
                }
            }
            feed_result?;

            edges_resolved = edges.len();
            if !options.dry_run && !edges.is_empty() {
                sink.event(ProgressEvent {
                    message: format!(
                        "phase=Load; committing {} edges into {}",
                        edges.len(),
                        config.parents_table
                    ),
                    elapsed: Some(start.elapsed()),
                });
                let report = parents_coordinator.load(&edges)?;
                parents_report.absorb(&report);
            }
            Ok(())
        })?;

        let summary = RunSummary {
            started_at,
            elapsed_ms: start.elapsed().as_millis() as u64,
            pages_fetched: feed.pages_fetched(),
            terms_extracted: feed.terms_yielded(),
            parent_lookups,
            edges_resolved,
            parent_failures,
            tables: vec![terms_report, parents_report],
        };
        sink.event(ProgressEvent {
            message: format!(
                "phase=Summary; {} terms, {} edges, {} failed lookups",
                summary.terms_extracted, summary.edges_resolved, summary.parent_failures
            ),
            elapsed: Some(start.elapsed()),
        });
        Ok(summary)
    }
}

fn terms_contract(config: &ResolvedConfig) -> TableContract {
    TableContract {
        table: config.terms_table.clone(),
        primary_key: "iri".to_string(),
        write_disposition: config.write_disposition,
        schema_contract: config.schema_contract,
        references: Vec::new(),
    }
}

fn parents_contract(config: &ResolvedConfig) -> TableContract {
    TableContract {
        table: config.parents_table.clone(),
        primary_key: "iri".to_string(),
        write_disposition: config.write_disposition,
        schema_contract: config.schema_contract,
        references: vec![TableReference {
            referenced_table: config.terms_table.clone(),
            columns: vec!["child_iri".to_string()],
            referenced_columns: vec!["iri".to_string()],
        }],
    }
}
