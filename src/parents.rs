use std::thread;

use crossbeam_channel::{Receiver, Sender};
use serde_json::Value;

use crate::domain::{Iri, ParentEdge, Term};
use crate::error::PipelineError;
use crate::normalize::normalize_parent;
use crate::ols::OlsApi;

/// Result of one child term's parent lookup. A failed lookup loses that
/// child's edges only; it never aborts the rest of the fan-out.
#[derive(Debug)]
pub struct ChildOutcome {
    pub child_iri: Iri,
    pub result: Result<Vec<ParentEdge>, PipelineError>,
}

#[derive(Debug)]
pub struct ResolveFailure {
    pub child_iri: Iri,
    pub error: PipelineError,
}

#[derive(Debug, Default)]
pub struct ResolveOutcome {
    pub lookups: usize,
    pub edges: Vec<ParentEdge>,
    pub failures: Vec<ResolveFailure>,
}

/// Fan-out transformer: one independent parent lookup per input term, run by
/// a bounded worker pool. Output order across terms is not guaranteed; all
/// edges for one child are produced together or not at all.
pub struct ParentResolver<'a> {
    client: &'a dyn OlsApi,
    workers: usize,
}

impl<'a> ParentResolver<'a> {
    pub fn new(client: &'a dyn OlsApi, workers: usize) -> Self {
        Self {
            client,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Resolves one term. A term without a parent lookup URL contributes zero
    /// edges and performs no fetch.
    pub fn resolve_one(&self, term: &Term) -> ChildOutcome {
        ChildOutcome {
            child_iri: term.iri.clone(),
            result: fetch_edges(self.client, term),
        }
    }

    /// Drains `terms`, resolving with up to `workers` concurrent lookups, and
    /// sends one outcome per received term. Returns once the input channel
    /// closes and every dispatched lookup has completed, so a cancelled feed
    /// never leaves in-flight work orphaned.
    pub fn run(&self, terms: Receiver<Term>, outcomes: Sender<ChildOutcome>) {
        thread::scope(|scope| {
            for _ in 0..self.workers {
                let terms = terms.clone();
                let outcomes = outcomes.clone();
                scope.spawn(move || {
                    for term in terms.iter() {
                        if outcomes.send(self.resolve_one(&term)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
    }

    /// Convenience over [`run`](Self::run) for a fully materialized input:
    /// dispatches every term carrying a parent URL and collects the outcome.
    pub fn resolve<I>(&self, terms: I) -> ResolveOutcome
    where
        I: IntoIterator<Item = Term>,
    {
        let (term_tx, term_rx) = crossbeam_channel::bounded::<Term>(self.workers * 2);
        let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded::<ChildOutcome>();

        let mut outcome = ResolveOutcome::default();
        thread::scope(|scope| {
            scope.spawn(move || self.run(term_rx, outcome_tx));

            for term in terms {
                if term.parent_url.is_none() {
                    continue;
                }
                outcome.lookups += 1;
                if term_tx.send(term).is_err() {
                    break;
                }
            }
            drop(term_tx);

            for child in outcome_rx.iter() {
                match child.result {
                    Ok(edges) => outcome.edges.extend(edges),
                    Err(error) => outcome.failures.push(ResolveFailure {
                        child_iri: child.child_iri,
                        error,
                    }),
                }
            }
        });
        outcome
    }
}

/// Fetches and normalizes the parent list for one term. The body's embedded
/// parent list lives under `_embedded.terms`, same shape as the listing feed;
/// an absent list means a childless lookup, not an error.
pub fn fetch_edges(client: &dyn OlsApi, term: &Term) -> Result<Vec<ParentEdge>, PipelineError> {
    let Some(url) = term.parent_url.as_deref() else {
        return Ok(Vec::new());
    };

    let body = client.fetch_parents(url)?;
    let Some(parents) = body
        .get("_embedded")
        .and_then(|v| v.get("terms"))
        .and_then(Value::as_array)
    else {
        return Ok(Vec::new());
    };

    parents
        .iter()
        .map(|parent| normalize_parent(parent, &term.iri))
        .collect()
}
