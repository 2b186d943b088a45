use crate::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Smallest number of synthetic voters a simulation may ask for
pub const MIN_SIMULATED_VOTERS: usize = 10;

/// Largest number of synthetic voters a simulation may ask for
pub const MAX_SIMULATED_VOTERS: usize = 30;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SimulationRequest {
    pub count: usize,
    pub category: String,
    #[serde(default)]
    pub topic: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationTotals {
    pub yes: u64,
    pub no: u64,
    pub total: u64,
}

/// Everything a finished simulation produced
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SimulationReport {
    pub simulation_id: SimulationId,
    pub election_id: ElectionId,
    pub category: String,
    pub generated_voters: Vec<GeneratedVoter>,
    pub result: SimulationTotals,
}

/// A forward step whose effect outlives the saga unless undone
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    ElectionCreated(ElectionId),
    VoterCreated(VoterId),
}

// Steps recorded in a checkpoint, in the order they happened
fn completed_steps(record: &SimulationRecord) -> Vec<Step> {
    let mut steps = Vec::with_capacity(record.voter_ids.len() + 1);
    if let Some(election) = &record.election_id {
        steps.push(Step::ElectionCreated(election.clone()));
    }
    for voter in &record.voter_ids {
        steps.push(Step::VoterCreated(voter.clone()));
    }
    steps
}

/// Provisions a throwaway election with synthetic voters, votes on it and tallies it.
///
/// Each step is checkpointed in the [`SimulationRegistry`] before the next one starts.
/// If any step fails, or the saga is dropped mid-flight, every checkpointed step is
/// undone in reverse order.
#[derive(Clone)]
pub struct SimulationSaga {
    coordinator: Arc<TallyCoordinator>,
    authority: Arc<dyn Authority>,
    elections: Arc<dyn ElectionStore>,
    identities: Arc<dyn IdentityStore>,
    registry: Arc<SimulationRegistry>,
    timeout: Duration,
}

impl SimulationSaga {
    pub fn new(
        coordinator: Arc<TallyCoordinator>,
        authority: Arc<dyn Authority>,
        elections: Arc<dyn ElectionStore>,
        identities: Arc<dyn IdentityStore>,
        registry: Arc<SimulationRegistry>,
    ) -> Self {
        SimulationSaga {
            coordinator,
            authority,
            elections,
            identities,
            registry,
            timeout: DEFAULT_COLLABORATOR_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &SimulationRegistry {
        &self.registry
    }

    /// Run a whole simulation.
    ///
    /// On success the record stays in the registry, marked completed, until
    /// [`SimulationSaga::end`] tears the simulation down.
    pub async fn start(&self, request: &SimulationRequest) -> Result<SimulationReport, Error> {
        if request.count < MIN_SIMULATED_VOTERS || request.count > MAX_SIMULATED_VOTERS {
            return Err(Error::InvalidRequest(format!(
                "count must be between {} and {}, got {}",
                MIN_SIMULATED_VOTERS, MAX_SIMULATED_VOTERS, request.count
            )));
        }

        let id = self.registry.allocate_id()?;
        let topic = match request.topic.as_deref().map(str::trim) {
            Some(topic) if !topic.is_empty() => topic.to_owned(),
            _ => format!("Simulation {}", id),
        };
        self.registry
            .put(id, &SimulationRecord::new(&request.category, &topic))?;
        info!(simulation = id, count = request.count, "simulation started");

        let mut guard = CompensationGuard::arm(self.clone(), id);
        let result = self.run(id, request.count, &request.category, &topic).await;

        // Armed until compensation has returned
        match result {
            Ok(report) => {
                guard.disarm();
                info!(
                    simulation = id,
                    election = %report.election_id,
                    yes = report.result.yes,
                    no = report.result.no,
                    "simulation completed"
                );
                Ok(report)
            }
            Err(cause) => {
                warn!(simulation = id, error = %cause, "simulation failed, compensating");
                let compensated = self.compensate(id).await;
                guard.disarm();
                compensated?;
                Err(Error::SimulationFailed {
                    simulation_id: id,
                    cause: Box::new(cause),
                })
            }
        }
    }

    async fn run(
        &self,
        id: SimulationId,
        count: usize,
        category: &str,
        topic: &str,
    ) -> Result<SimulationReport, Error> {
        let mut rng = StdRng::from_entropy();

        // Election
        let election = bounded(
            "election store",
            self.timeout,
            self.elections.create(topic, category),
        )
        .await?;
        self.registry.record_election(id, &election)?;
        info!(simulation = id, election = %election, "election created");

        // Voters, strictly one after the other
        let mut generated_voters = Vec::with_capacity(count);
        for index in 0..count {
            let voter = SyntheticVoter::generate(&mut rng, id, index);
            let voter_id = bounded(
                "identity store",
                self.timeout,
                self.identities.create(&voter.identity(id)),
            )
            .await?;
            self.registry.record_voter(id, &voter_id)?;

            bounded(
                "identity store",
                self.timeout,
                self.identities
                    .update_profile(&voter_id, &voter.profile(category)),
            )
            .await?;

            debug!(simulation = id, voter = %voter_id, "synthetic voter created");
            generated_voters.push(GeneratedVoter {
                id: voter_id,
                first_name: voter.first_name,
                last_name: voter.last_name,
                category: category.to_owned(),
            });
        }
        info!(simulation = id, voters = count, "synthetic voters created");

        // One public key for every ballot
        let public_key = bounded(
            "authority",
            self.timeout,
            self.authority.public_key(&election),
        )
        .await?;

        for _ in &generated_voters {
            let vote: u64 = rng.gen_range(0..=1);
            let ballot = public_key.encrypt(vote, &mut rng);
            self.coordinator
                .submit_vote(&election, &ballot.ciphertext.to_str_radix(10))
                .await?;
        }

        match self.coordinator.get_result(&election, count as u64).await? {
            TallyOutcome::Concluded(_) => {}
            TallyOutcome::NotConcluded { count, expected } => {
                return Err(Error::NotConcluded {
                    election,
                    count,
                    expected,
                })
            }
        }

        // Read the tally back from where it was persisted
        let record = bounded("election store", self.timeout, self.elections.get(&election))
            .await?
            .ok_or_else(|| Error::ElectionNotFound(election.clone()))?;
        let (yes, no) = match (record.yes, record.no) {
            (Some(yes), Some(no)) if record.concluded => (yes, no),
            _ => {
                return Err(Error::rejected(
                    "election store",
                    format!("election {} has no final tally", election),
                ))
            }
        };

        self.registry.mark_completed(id)?;

        Ok(SimulationReport {
            simulation_id: id,
            election_id: election,
            category: category.to_owned(),
            generated_voters,
            result: SimulationTotals {
                yes,
                no,
                total: yes + no,
            },
        })
    }

    /// Undo every checkpointed step of an unfinished simulation, then forget it.
    ///
    /// Individual deletions are best effort: failures are logged and skipped.
    /// A completed simulation is left alone.
    pub async fn compensate(&self, id: SimulationId) -> Result<(), Error> {
        let record = self
            .registry
            .get(id)?
            .ok_or(Error::SimulationNotFound(id))?;

        if record.status == SimulationStatus::Completed {
            debug!(simulation = id, "simulation completed, nothing to compensate");
            return Ok(());
        }

        for step in completed_steps(&record).into_iter().rev() {
            if let Err(e) = self.undo(&step).await {
                warn!(simulation = id, step = ?step, error = %e, "compensation step failed");
            }
        }

        self.registry.remove(id)?;
        info!(simulation = id, "simulation rolled back");
        Ok(())
    }

    async fn undo(&self, step: &Step) -> Result<(), Error> {
        match step {
            Step::ElectionCreated(election) => {
                // Ballots may already have been accumulated for it
                self.coordinator.accumulators().clear(election)?;
                bounded(
                    "election store",
                    self.timeout,
                    self.elections.delete(election),
                )
                .await
            }
            Step::VoterCreated(voter) => {
                bounded("identity store", self.timeout, self.identities.delete(voter)).await
            }
        }
    }

    /// Tear down a completed simulation: delete its election, then its voters.
    ///
    /// Unlike compensation, any failure is reported and the record is kept so the
    /// teardown can be retried.
    pub async fn end(&self, id: SimulationId) -> Result<(), Error> {
        let record = self
            .registry
            .get(id)?
            .ok_or(Error::SimulationNotFound(id))?;

        if record.status != SimulationStatus::Completed {
            return Err(Error::InvalidRequest(format!(
                "simulation {} has not completed; unfinished simulations are rolled back by recovery",
                id
            )));
        }

        if let Some(election) = &record.election_id {
            bounded(
                "election store",
                self.timeout,
                self.elections.delete(election),
            )
            .await?;
        }
        for voter in &record.voter_ids {
            bounded("identity store", self.timeout, self.identities.delete(voter)).await?;
        }

        self.registry.remove(id)?;
        info!(simulation = id, "simulation ended");
        Ok(())
    }

    /// Roll back simulations left unfinished by a previous process.
    ///
    /// Only call this while no saga is running, since in-flight sagas look unfinished too.
    pub async fn recover(&self) -> Result<Vec<SimulationId>, Error> {
        let mut recovered = vec![];
        for (id, record) in self.registry.list()? {
            if record.status == SimulationStatus::Provisioning {
                warn!(simulation = id, "found interrupted simulation, rolling back");
                self.compensate(id).await?;
                recovered.push(id);
            }
        }
        Ok(recovered)
    }
}

// Compensates on drop unless disarmed, so a cancelled saga still cleans up
struct CompensationGuard {
    saga: Option<SimulationSaga>,
    simulation: SimulationId,
}

impl CompensationGuard {
    fn arm(saga: SimulationSaga, simulation: SimulationId) -> Self {
        CompensationGuard {
            saga: Some(saga),
            simulation,
        }
    }

    fn disarm(&mut self) {
        self.saga = None;
    }
}

impl Drop for CompensationGuard {
    fn drop(&mut self) {
        let saga = match self.saga.take() {
            Some(saga) => saga,
            None => return,
        };
        let id = self.simulation;
        warn!(simulation = id, "simulation cancelled, compensating");

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = saga.compensate(id).await {
                        warn!(simulation = id, error = %e, "compensation after cancel failed");
                    }
                });
            }
            Err(_) => {
                warn!(simulation = id, "no runtime to compensate on, left for recovery");
            }
        }
    }
}
