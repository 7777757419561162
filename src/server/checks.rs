//! Named health predicates evaluated on every probe
//!
//! One registry per probe kind. Evaluation takes the read lock, so probes run
//! concurrently; `add`/`remove` take the write lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

/// Result string recorded for a passing check
pub const CHECK_OK: &str = "OK";

/// A zero-argument health predicate; `Err` carries the reason it failed
pub type Check = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Outcome of evaluating every registered check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// False if any check failed; true for an empty registry
    pub healthy: bool,
    /// Check name -> "OK" or the failure message
    pub results: BTreeMap<String, String>,
}

/// Mapping of check name to predicate
#[derive(Default)]
pub struct CheckRegistry {
    checks: RwLock<HashMap<String, Check>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a check, replacing any existing one with the same name
    pub fn add<F>(&self, name: impl Into<String>, check: F)
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.checks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::new(check));
    }

    /// Remove a check; unknown names are ignored
    pub fn remove(&self, name: &str) {
        self.checks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    pub fn len(&self) -> usize {
        self.checks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every check and aggregate the results
    pub fn evaluate(&self) -> Evaluation {
        let checks = self.checks.read().unwrap_or_else(PoisonError::into_inner);

        checks.iter().fold(
            Evaluation {
                healthy: true,
                results: BTreeMap::new(),
            },
            |mut evaluation, (name, check)| {
                match check() {
                    Ok(()) => {
                        evaluation.results.insert(name.clone(), CHECK_OK.to_string());
                    }
                    Err(e) => {
                        evaluation.healthy = false;
                        evaluation.results.insert(name.clone(), format!("{:#}", e));
                    }
                }
                evaluation
            },
        )
    }
}
