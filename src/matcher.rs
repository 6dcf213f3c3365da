//! Thread-safe access to the active rule engine.

use std::collections::HashMap;

use hickory_proto::rr::RecordType;
use parking_lot::RwLock;

use crate::rules::{DnsRequest, DnsResult, RuleEngine};

/// The engine and the translations of its rules, always replaced together.
#[derive(Debug)]
struct EngineState<E> {
    engine: E,
    translations: HashMap<String, String>,
}

/// Matches requests against the most recently committed rule engine.
///
/// Query handlers share the matcher through an `Arc` and only take the read
/// lock, the refresh cycle is the single writer.
#[derive(Debug)]
pub struct RequestMatcher<E> {
    state: RwLock<Option<EngineState<E>>>,
}

impl<E> Default for RequestMatcher<E> {
    fn default() -> Self {
        Self {
            state: RwLock::new(None),
        }
    }
}

impl<E: RuleEngine> RequestMatcher<E> {
    /// Create a matcher without an engine, matching nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Match the request against the active engine.
    ///
    /// Only A, AAAA and PTR requests are supported, anything else returns
    /// `None`.
    pub fn match_request(&self, request: &DnsRequest) -> Option<DnsResult> {
        if !matches!(
            request.qtype,
            RecordType::A | RecordType::AAAA | RecordType::PTR
        ) {
            return None;
        }

        let state = self.state.read();
        state.as_ref()?.engine.match_request(request)
    }

    /// Returns the hosts line a generated rule was produced from.
    pub fn translate(&self, rule: &str) -> Option<String> {
        self.state.read().as_ref()?.translations.get(rule).cloned()
    }

    /// Returns the number of rules in the active engine.
    pub fn rules_count(&self) -> usize {
        self.state
            .read()
            .as_ref()
            .map_or(0, |state| state.engine.rules_count())
    }

    /// Replace the engine and its translations at once.
    pub(crate) fn swap(&self, engine: E, translations: HashMap<String, String>) {
        let next = EngineState {
            engine,
            translations,
        };

        // Drop the previous engine outside of the critical section.
        let prev = self.state.write().replace(next);
        drop(prev);
    }
}
