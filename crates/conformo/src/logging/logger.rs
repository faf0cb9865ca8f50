//! Result sink and the default in-memory logger.

use super::record::CaseResult;
use crate::result::CtsResult;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Destination for case results, keyed by case query string
///
/// Writing the same key twice replaces the earlier result.
pub trait ResultSink: Send + Sync {
    /// Store a result
    fn put(&self, query: &str, result: CaseResult);

    /// Fetch a stored result
    fn get(&self, query: &str) -> Option<CaseResult>;
}

#[derive(Debug, Default)]
struct LoggerState {
    order: Vec<String>,
    results: HashMap<String, CaseResult>,
}

/// In-memory result sink preserving first-insertion order
#[derive(Debug, Default)]
pub struct Logger {
    state: Mutex<LoggerState>,
}

impl Logger {
    /// Create an empty logger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored results
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().order.len()
    }

    /// Whether no results are stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all results in insertion order
    #[must_use]
    pub fn results(&self) -> Vec<(String, CaseResult)> {
        let state = self.state();
        state
            .order
            .iter()
            .filter_map(|q| state.results.get(q).map(|r| (q.clone(), r.clone())))
            .collect()
    }

    /// All results as a JSON object keyed by query
    pub fn as_json(&self) -> CtsResult<String> {
        let map: serde_json::Map<String, serde_json::Value> = self
            .results()
            .into_iter()
            .map(|(q, r)| serde_json::to_value(r).map(|v| (q, v)))
            .collect::<Result<_, _>>()?;
        Ok(serde_json::to_string_pretty(&map)?)
    }

    fn state(&self) -> MutexGuard<'_, LoggerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResultSink for Logger {
    fn put(&self, query: &str, result: CaseResult) {
        let mut state = self.state();
        if !state.results.contains_key(query) {
            state.order.push(query.to_string());
        }
        state.results.insert(query.to_string(), result);
    }

    fn get(&self, query: &str) -> Option<CaseResult> {
        self.state().results.get(query).cloned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::logging::CaseStatus;

    #[test]
    fn test_put_get() {
        let logger = Logger::new();
        assert!(logger.is_empty());
        logger.put("s:f:t:{}", CaseResult::new(CaseStatus::Pass));
        assert_eq!(logger.get("s:f:t:{}").unwrap().status, CaseStatus::Pass);
        assert!(logger.get("s:f:other:{}").is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let logger = Logger::new();
        logger.put("q", CaseResult::running());
        logger.put("q", CaseResult::new(CaseStatus::Fail));
        assert_eq!(logger.len(), 1);
        assert_eq!(logger.get("q").unwrap().status, CaseStatus::Fail);
    }

    #[test]
    fn test_results_keep_insertion_order() {
        let logger = Logger::new();
        logger.put("b", CaseResult::new(CaseStatus::Pass));
        logger.put("a", CaseResult::new(CaseStatus::Skip));
        logger.put("b", CaseResult::new(CaseStatus::Warn));
        let keys: Vec<_> = logger.results().into_iter().map(|(q, _)| q).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn test_as_json() {
        let logger = Logger::new();
        logger.put("s:f:t:{}", CaseResult::new(CaseStatus::Pass));
        let json: serde_json::Value = serde_json::from_str(&logger.as_json().unwrap()).unwrap();
        assert_eq!(json["s:f:t:{}"]["status"], "pass");
    }

    #[test]
    fn test_poisoned_lock_still_records() {
        let logger = std::sync::Arc::new(Logger::new());
        let poisoner = std::sync::Arc::clone(&logger);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.state.lock().unwrap();
            panic!("poison the results lock");
        })
        .join();
        assert!(logger.state.is_poisoned());
        logger.put("s:f:t:{}", CaseResult::new(CaseStatus::Pass));
        assert_eq!(logger.len(), 1);
        assert_eq!(logger.get("s:f:t:{}").unwrap().status, CaseStatus::Pass);
    }
}
