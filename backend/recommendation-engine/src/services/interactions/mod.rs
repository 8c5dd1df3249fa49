/// Interaction Store
///
/// Append-only log of learner feedback. It is the source of truth for batch
/// retraining; the CF engine only ever sees a copy of it.
///
/// # Guarantees
/// - Records are never mutated or removed once appended
/// - Sequence numbers are dense and start at 0
/// - Per-learner lookups go through a DashMap index, so readers never block
///   each other
use dashmap::DashMap;
use parking_lot::RwLock;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{RecommendError, Result};
use crate::models::InteractionRecord;

#[derive(Default)]
pub struct InteractionStore {
    log: RwLock<Vec<InteractionRecord>>,
    /// learner id → positions in `log`
    by_learner: DashMap<String, Vec<usize>>,
}

impl InteractionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<InteractionRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.append(record);
        }
        store
    }

    /// Append a record and return its sequence number
    pub fn append(&self, record: InteractionRecord) -> usize {
        let mut log = self.log.write();
        let seq = log.len();

        self.by_learner
            .entry(record.learner_id.clone())
            .or_default()
            .push(seq);
        debug!(
            seq = seq,
            learner_id = %record.learner_id,
            candidate_id = %record.candidate_id,
            interaction_type = record.interaction_type.as_str(),
            "Interaction recorded"
        );
        log.push(record);

        seq
    }

    pub fn len(&self) -> usize {
        self.log.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn learner_count(&self) -> usize {
        self.by_learner.len()
    }

    /// Copy of the whole log, in append order
    pub fn snapshot(&self) -> Vec<InteractionRecord> {
        self.log.read().clone()
    }

    /// Records appended at or after `seq`
    pub fn since(&self, seq: usize) -> Vec<InteractionRecord> {
        self.log.read().iter().skip(seq).cloned().collect()
    }

    /// One learner's records, in append order
    pub fn for_learner(&self, learner_id: &str) -> Vec<InteractionRecord> {
        // Release the index entry before taking the log lock; `append` locks
        // in the opposite order
        let positions = match self.by_learner.get(learner_id) {
            Some(entry) => entry.value().clone(),
            None => return Vec::new(),
        };
        let log = self.log.read();
        positions.iter().filter_map(|&i| log.get(i).cloned()).collect()
    }

    /// Load a JSON array of records
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RecommendError::Serialization(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))
        })?;
        let records: Vec<InteractionRecord> = serde_json::from_str(&raw)?;

        info!(
            path = %path.display(),
            records = records.len(),
            "Interactions loaded"
        );
        Ok(Self::from_records(records))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&*self.log.read())?)
    }
}
