use std::collections::VecDeque;

use serde_json::Value;

use crate::domain::Term;
use crate::error::PipelineError;
use crate::normalize::normalize_term;

/// Lazy sequence of canonical terms over a page source.
///
/// Flattens batches in source page order, preserving within-page order, and
/// enforces an optional yield limit: once `limit` terms have come out, no
/// further page is requested from the source, even when the limit lands
/// mid-page.
pub struct TermFeed<P> {
    pages: P,
    current: VecDeque<Term>,
    limit: Option<u64>,
    yielded: u64,
    pages_fetched: usize,
    done: bool,
}

impl<P> TermFeed<P>
where
    P: Iterator<Item = Result<Vec<Value>, PipelineError>>,
{
    pub fn new(pages: P, limit: Option<u64>) -> Self {
        Self {
            pages,
            current: VecDeque::new(),
            limit,
            yielded: 0,
            pages_fetched: 0,
            done: false,
        }
    }

    /// Count of pages pulled from the source so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Count of terms yielded so far.
    pub fn terms_yielded(&self) -> u64 {
        self.yielded
    }

    fn limit_reached(&self) -> bool {
        self.limit.is_some_and(|limit| self.yielded >= limit)
    }

    /// Pulls the next page and returns its normalized terms, truncated at the
    /// yield limit. `None` once the source is drained or the limit was hit; a
    /// page fetch or normalization failure ends the feed with that error.
    pub fn next_page(&mut self) -> Option<Result<Vec<Term>, PipelineError>> {
        if self.done || self.limit_reached() {
            self.done = true;
            return None;
        }

        let raw = match self.pages.next() {
            Some(Ok(raw)) => raw,
            Some(Err(err)) => {
                self.done = true;
                return Some(Err(err));
            }
            None => {
                self.done = true;
                return None;
            }
        };
        self.pages_fetched += 1;

        let mut terms = Vec::with_capacity(raw.len());
        for record in &raw {
            if self.limit_reached() {
                break;
            }
            match normalize_term(record) {
                Ok(term) => {
                    terms.push(term);
                    self.yielded += 1;
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
        Some(Ok(terms))
    }
}

impl<P> Iterator for TermFeed<P>
where
    P: Iterator<Item = Result<Vec<Value>, PipelineError>>,
{
    type Item = Result<Term, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(term) = self.current.pop_front() {
                return Some(Ok(term));
            }
            match self.next_page()? {
                Ok(terms) => self.current.extend(terms),
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
