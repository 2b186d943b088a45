use crate::*;
use std::path::PathBuf;

/// Simulation identifier, allocated by the registry
pub type SimulationId = u64;

// Reserved entry holding the next id to allocate
const META_KEY: &str = "_meta";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStatus {
    /// The saga is still creating resources, or died while doing so
    Provisioning,

    /// Every resource exists and the tally concluded; waiting for teardown
    Completed,
}

/// Provisioning progress of one simulation run.
///
/// `voter_ids` only ever lists voters that really exist in the identity store,
/// in creation order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SimulationRecord {
    pub election_id: Option<ElectionId>,
    pub category: String,
    pub topic: String,
    pub voter_ids: Vec<VoterId>,
    pub status: SimulationStatus,
}

impl SimulationRecord {
    pub fn new(category: &str, topic: &str) -> Self {
        SimulationRecord {
            election_id: None,
            category: category.to_owned(),
            topic: topic.to_owned(),
            voter_ids: vec![],
            status: SimulationStatus::Provisioning,
        }
    }
}

#[derive(Serialize, Deserialize, Default)]
struct Meta {
    next_id: Option<SimulationId>,
}

/// Persisted simulation records, one [`FileStore`] entry per simulation
pub struct SimulationRegistry {
    store: FileStore,
}

impl SimulationRegistry {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        Ok(SimulationRegistry {
            store: FileStore::open(path)?,
        })
    }

    /// Allocate a fresh, strictly increasing simulation id.
    ///
    /// The counter is persisted, so ids are never reused across restarts.
    pub fn allocate_id(&self) -> Result<SimulationId, Error> {
        self.store.update(|mapping| {
            let meta: Meta = match mapping.get(META_KEY) {
                Some(value) => serde_json::from_value(value.clone()).unwrap_or_default(),
                None => Meta::default(),
            };

            // Without a counter, continue after the highest id on file
            let id = meta.next_id.unwrap_or_else(|| {
                mapping
                    .keys()
                    .filter_map(|k| k.parse::<SimulationId>().ok())
                    .max()
                    .unwrap_or(0)
                    + 1
            });

            let meta = Meta {
                next_id: Some(id + 1),
            };
            mapping.insert(META_KEY.to_owned(), serde_json::to_value(&meta)?);
            Ok(id)
        })
    }

    pub fn put(&self, id: SimulationId, record: &SimulationRecord) -> Result<(), Error> {
        self.store.put(&id.to_string(), record)
    }

    pub fn get(&self, id: SimulationId) -> Result<Option<SimulationRecord>, Error> {
        self.store.get_valid(&id.to_string())
    }

    /// Remove a record, returning whether it existed
    pub fn remove(&self, id: SimulationId) -> Result<bool, Error> {
        self.store.remove(&id.to_string())
    }

    /// All simulation records, in id order
    pub fn list(&self) -> Result<Vec<(SimulationId, SimulationRecord)>, Error> {
        let mapping = self.store.read()?;
        let mut records: Vec<(SimulationId, SimulationRecord)> = mapping
            .into_iter()
            .filter_map(|(key, value)| {
                let id = key.parse::<SimulationId>().ok()?;
                let record = serde_json::from_value(value).ok()?;
                Some((id, record))
            })
            .collect();
        records.sort_by_key(|(id, _)| *id);
        Ok(records)
    }

    /// Apply `f` to an existing record and persist it, atomically.
    ///
    /// An unreadable record is dropped and reported as missing.
    pub fn modify<F>(&self, id: SimulationId, f: F) -> Result<SimulationRecord, Error>
    where
        F: FnOnce(&mut SimulationRecord),
    {
        let key = id.to_string();
        let modified = self.store.update(|mapping| {
            let value = match mapping.get(&key) {
                Some(value) => value,
                None => return Err(Error::SimulationNotFound(id)),
            };
            let mut record: SimulationRecord = match self.store.decode(&key, value) {
                Some(record) => record,
                None => {
                    mapping.remove(&key);
                    return Ok(None);
                }
            };
            f(&mut record);
            mapping.insert(key.clone(), serde_json::to_value(&record)?);
            Ok(Some(record))
        })?;
        modified.ok_or(Error::SimulationNotFound(id))
    }

    /// Checkpoint the election created for a simulation
    pub fn record_election(
        &self,
        id: SimulationId,
        election: &ElectionId,
    ) -> Result<SimulationRecord, Error> {
        self.modify(id, |record| record.election_id = Some(election.clone()))
    }

    /// Checkpoint one more created voter
    pub fn record_voter(&self, id: SimulationId, voter: &str) -> Result<SimulationRecord, Error> {
        self.modify(id, |record| record.voter_ids.push(voter.to_owned()))
    }

    pub fn mark_completed(&self, id: SimulationId) -> Result<SimulationRecord, Error> {
        self.modify(id, |record| record.status = SimulationStatus::Completed)
    }
}
