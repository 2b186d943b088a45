use crate::*;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

/// Final plaintext totals of an election
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub yes: u64,
    pub no: u64,
}

impl Tally {
    pub fn total(&self) -> u64 {
        self.yes + self.no
    }
}

/// Answer to a result request.
///
/// `NotConcluded` is not a failure: the caller should poll again later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TallyOutcome {
    Concluded(Tally),
    NotConcluded { count: u64, expected: u64 },
}

impl TallyOutcome {
    pub fn tally(&self) -> Option<Tally> {
        match self {
            TallyOutcome::Concluded(tally) => Some(*tally),
            TallyOutcome::NotConcluded { .. } => None,
        }
    }
}

/// Hands out one async lock per election
#[derive(Default)]
struct ElectionLocks {
    inner: Mutex<HashMap<ElectionId, Arc<AsyncMutex<()>>>>,
}

impl ElectionLocks {
    fn get(&self, election: &ElectionId) -> Arc<AsyncMutex<()>> {
        self.inner
            .lock()
            .entry(election.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    // Drop the entry once nobody else holds or waits on it
    fn release(&self, election: &ElectionId) {
        let mut inner = self.inner.lock();
        if let Some(lock) = inner.get(election) {
            if Arc::strong_count(lock) == 1 {
                inner.remove(election);
            }
        }
    }
}

/// Owns the vote submission and finalization protocol.
///
/// Per election: no votes -> accumulating -> finalized. Every mutation of one
/// election's accumulator, and its finalization, runs under that election's lock,
/// so concurrent submissions never lose an update and finalization happens once.
pub struct TallyCoordinator {
    accumulators: AccumulatorStore,
    authority: Arc<dyn Authority>,
    elections: Arc<dyn ElectionStore>,
    locks: ElectionLocks,
    timeout: Duration,
}

impl TallyCoordinator {
    pub fn new(
        accumulators: AccumulatorStore,
        authority: Arc<dyn Authority>,
        elections: Arc<dyn ElectionStore>,
    ) -> Self {
        TallyCoordinator {
            accumulators,
            authority,
            elections,
            locks: ElectionLocks::default(),
            timeout: DEFAULT_COLLABORATOR_TIMEOUT,
        }
    }

    /// Set the deadline applied to every Authority and election store call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn accumulators(&self) -> &AccumulatorStore {
        &self.accumulators
    }

    /// Fold one encrypted ballot (a decimal ciphertext string) into the election's sum.
    ///
    /// Returns the number of ballots accumulated so far, or `ElectionConcluded` once
    /// the election has been finalized.
    pub async fn submit_vote(&self, election: &ElectionId, ciphertext: &str) -> Result<u64, Error> {
        let ciphertext = parse_decimal(ciphertext).ok_or_else(|| {
            Error::InvalidPayload(format!("ciphertext is not an integer: {:?}", ciphertext))
        })?;

        let public_key = bounded(
            "authority",
            self.timeout,
            self.authority.public_key(election),
        )
        .await?;
        let ballot = public_key.ballot(ciphertext)?;

        let lock = self.locks.get(election);
        let _guard = lock.lock().await;

        // A concluded election takes no more ballots
        let current = bounded("election store", self.timeout, self.elections.get(election)).await?;
        match current {
            None => return Err(Error::ElectionNotFound(election.clone())),
            Some(record) if record.concluded => {
                return Err(Error::ElectionConcluded(election.clone()))
            }
            Some(_) => {}
        }

        let record = self
            .accumulators
            .accumulate(election, &public_key, &ballot)?;

        debug!(election = %election, count = record.count, "vote accepted");
        Ok(record.count)
    }

    /// Return the election's totals, finalizing it if enough ballots have arrived.
    ///
    /// An already concluded election answers from the election store without decrypting again.
    pub async fn get_result(
        &self,
        election: &ElectionId,
        expected_voters: u64,
    ) -> Result<TallyOutcome, Error> {
        let outcome = {
            let lock = self.locks.get(election);
            let _guard = lock.lock().await;
            self.finalize(election, expected_voters).await?
        };

        if let TallyOutcome::Concluded(_) = outcome {
            self.locks.release(election);
        }
        Ok(outcome)
    }

    // Must run under the election's lock
    async fn finalize(
        &self,
        election: &ElectionId,
        expected_voters: u64,
    ) -> Result<TallyOutcome, Error> {
        let record = bounded("election store", self.timeout, self.elections.get(election))
            .await?
            .ok_or_else(|| Error::ElectionNotFound(election.clone()))?;

        if record.concluded {
            return match (record.yes, record.no) {
                (Some(yes), Some(no)) => Ok(TallyOutcome::Concluded(Tally { yes, no })),
                _ => Err(Error::rejected(
                    "election store",
                    format!("election {} is concluded but has no totals", election),
                )),
            };
        }

        let accumulator = self
            .accumulators
            .get(election)?
            .ok_or_else(|| Error::NoVotesYet(election.clone()))?;

        if accumulator.count < expected_voters {
            debug!(
                election = %election,
                count = accumulator.count,
                expected = expected_voters,
                "election not concluded yet"
            );
            return Ok(TallyOutcome::NotConcluded {
                count: accumulator.count,
                expected: expected_voters,
            });
        }

        let yes = bounded(
            "authority",
            self.timeout,
            self.authority.decrypt(election, &accumulator.ciphertext),
        )
        .await?;
        if yes > accumulator.count {
            return Err(Error::DecryptionFailed(format!(
                "decrypted sum {} exceeds the {} ballots cast",
                yes, accumulator.count
            )));
        }
        let tally = Tally {
            yes,
            no: accumulator.count - yes,
        };

        bounded(
            "election store",
            self.timeout,
            self.elections.update(election, tally.yes, tally.no, true),
        )
        .await?;
        self.accumulators.clear(election)?;

        info!(election = %election, yes = tally.yes, no = tally.no, "election finalized");
        Ok(TallyOutcome::Concluded(tally))
    }
}
