use gauntlet_verdict_model::ScenarioResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CollectorError {
    #[error("Result submitted for unknown scenario id '{0}'")]
    UnknownScenario(String),
    #[error("Duplicate result submitted for scenario id '{0}'")]
    DuplicateResult(String),
}

/// Accumulates at most one result per expected scenario.
///
/// The slot map is fixed at construction, so submissions for distinct ids never contend with
/// each other; the lock on each slot serialises writers for the same id. Both error cases are
/// setup bugs rather than scenario failures: a well-formed run submits exactly once per
/// registered id.
#[derive(Debug)]
pub struct Collector {
    slots: HashMap<String, Mutex<Option<ScenarioResult>>>,
}

impl Collector {
    pub fn new(expected_ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            slots: expected_ids
                .into_iter()
                .map(|id| (id, Mutex::new(None)))
                .collect(),
        }
    }

    /// Record the result for its scenario.
    ///
    /// Rejects results for ids that were never registered and second results for an id that
    /// already has one.
    pub fn submit(&self, result: ScenarioResult) -> Result<(), CollectorError> {
        let slot = self
            .slots
            .get(&result.id)
            .ok_or_else(|| CollectorError::UnknownScenario(result.id.clone()))?;

        let mut guard = slot.lock();
        if guard.is_some() {
            return Err(CollectorError::DuplicateResult(result.id.clone()));
        }

        log::debug!("Recorded {} result for scenario {}", result.status, result.id);
        *guard = Some(result);

        Ok(())
    }

    /// Snapshot of every result recorded so far.
    pub fn results(&self) -> Vec<ScenarioResult> {
        self.slots
            .values()
            .filter_map(|slot| slot.lock().clone())
            .collect()
    }
}
