use crate::*;
use num_bigint::BigUint;
use std::path::PathBuf;
use tracing::debug;

/// Running encrypted sum for one election that has not been finalized yet
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AccumulatorRecord {
    #[serde(with = "crate::serde_decimal")]
    pub ciphertext: BigUint,
    pub exponent: i64,
    pub count: u64,
}

impl AccumulatorRecord {
    pub fn encrypted(&self) -> EncryptedNumber {
        EncryptedNumber {
            ciphertext: self.ciphertext.clone(),
            exponent: self.exponent,
        }
    }
}

/// Per-election accumulators, persisted in a [`FileStore`] keyed by election id.
///
/// A record exists exactly while its election has at least one vote and has not
/// been finalized.
pub struct AccumulatorStore {
    store: FileStore,
}

impl AccumulatorStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        Ok(AccumulatorStore {
            store: FileStore::open(path)?,
        })
    }

    pub fn get(&self, election: &ElectionId) -> Result<Option<AccumulatorRecord>, Error> {
        self.store.get_valid(election.as_str())
    }

    /// Replace the record wholesale
    pub fn set(
        &self,
        election: &ElectionId,
        ciphertext: BigUint,
        exponent: i64,
        count: u64,
    ) -> Result<(), Error> {
        let record = AccumulatorRecord {
            ciphertext,
            exponent,
            count,
        };
        self.store.put(election.as_str(), &record)
    }

    /// Remove the record; a missing record is a no-op
    pub fn clear(&self, election: &ElectionId) -> Result<(), Error> {
        self.store.remove(election.as_str())?;
        Ok(())
    }

    /// Fold one ballot into the election's accumulator as a single atomic step.
    ///
    /// The first ballot seeds the record with `count = 1`; later ones are added
    /// homomorphically and bump the count. An unreadable record is replaced as if the
    /// election had no votes yet. Returns the updated record.
    pub fn accumulate(
        &self,
        election: &ElectionId,
        public_key: &PublicKey,
        ballot: &EncryptedNumber,
    ) -> Result<AccumulatorRecord, Error> {
        let key = election.as_str();
        self.store.update(|mapping| {
            let current = mapping
                .get(key)
                .and_then(|value| self.store.decode::<AccumulatorRecord>(key, value));
            let updated = match current {
                None => AccumulatorRecord {
                    ciphertext: ballot.ciphertext.clone(),
                    exponent: ballot.exponent,
                    count: 1,
                },
                Some(current) => {
                    let sum = public_key.add(&current.encrypted(), ballot)?;
                    AccumulatorRecord {
                        ciphertext: sum.ciphertext,
                        exponent: sum.exponent,
                        count: current.count + 1,
                    }
                }
            };
            mapping.insert(key.to_owned(), serde_json::to_value(&updated)?);
            debug!(election = %election, count = updated.count, "ballot accumulated");
            Ok(updated)
        })
    }
}
