use aggregator::*;
use anyhow::anyhow;
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod command_result;
mod command_simulation;
mod command_vote;
mod config;

use command_result::command_result;
use command_simulation::{command_end_simulation, command_recover, command_simulate};
use command_vote::command_vote;
use config::Config;

#[tokio::main]
async fn main() {
    let matches = App::new("Aggregator CLI")
        .version("0.1")
        .about("Aggregates encrypted ballots and runs election simulations")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("uri")
                .long("uri")
                .takes_value(true)
                .help("Set the Authority uri - can also be set with AGGREGATOR_AUTHORITY_URI"),
        )
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("vote")
                .about("Submit an encrypted ballot")
                .arg(
                    Arg::with_name("ELECTION-ID")
                        .index(1)
                        .required(true)
                        .help("Election to vote in"),
                )
                .arg(
                    Arg::with_name("BALLOT")
                        .index(2)
                        .required(true)
                        .help("Ciphertext as a decimal integer, or 0/1 with --encrypt"),
                )
                .arg(
                    Arg::with_name("encrypt")
                        .long("encrypt")
                        .help("Encrypt a plaintext 0/1 ballot with the election's public key first"),
                ),
        )
        .subcommand(
            SubCommand::with_name("result")
                .about("Get the result of an election, finalizing it once every ballot is in")
                .arg(
                    Arg::with_name("ELECTION-ID")
                        .index(1)
                        .required(true)
                        .help("Election to tally"),
                )
                .arg(
                    Arg::with_name("EXPECTED-VOTERS")
                        .index(2)
                        .required(true)
                        .help("Number of ballots the election waits for"),
                ),
        )
        .subcommand(
            SubCommand::with_name("simulate")
                .about("Run a simulated election with synthetic voters")
                .arg(
                    Arg::with_name("COUNT")
                        .index(1)
                        .required(true)
                        .help("Number of synthetic voters (10 to 30)"),
                )
                .arg(
                    Arg::with_name("CATEGORY")
                        .index(2)
                        .required(true)
                        .help("Category shared by the election and its voters"),
                )
                .arg(
                    Arg::with_name("topic")
                        .long("topic")
                        .takes_value(true)
                        .help("Election topic, defaults to \"Simulation <id>\""),
                ),
        )
        .subcommand(
            SubCommand::with_name("end-simulation")
                .about("Delete a completed simulation's election and voters")
                .arg(
                    Arg::with_name("SIMULATION-ID")
                        .index(1)
                        .required(true)
                        .help("Simulation to tear down"),
                ),
        )
        .subcommand(
            SubCommand::with_name("recover")
                .about("Roll back simulations interrupted by a crash; run while no simulation is active"),
        )
        .get_matches();

    init_logging(matches.occurrences_of("v"));

    if let Err(e) = run(&matches).await {
        eprintln!("aggregator: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbosity: u64) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

async fn run(matches: &ArgMatches<'_>) -> anyhow::Result<()> {
    let mut config = Config::from_env()?;
    if let Some(uri) = matches.value_of("uri") {
        config.authority_uri = expand(uri);
    }
    debug!(authority = %config.authority_uri, data = ?config.data_dir, "configured");

    let services = Services::new(&config)?;

    match matches.subcommand() {
        ("vote", Some(matches)) => command_vote(matches, &services).await,
        ("result", Some(matches)) => command_result(matches, &services).await,
        ("simulate", Some(matches)) => command_simulate(matches, &services).await,
        ("end-simulation", Some(matches)) => command_end_simulation(matches, &services).await,
        ("recover", Some(_)) => command_recover(&services).await,
        _ => Err(anyhow!("unknown command, see --help")),
    }
}

/// The core wired to the REST collaborators
pub struct Services {
    pub authority: Arc<dyn Authority>,
    pub coordinator: Arc<TallyCoordinator>,
    pub saga: SimulationSaga,
}

impl Services {
    fn new(config: &Config) -> anyhow::Result<Self> {
        let authority: Arc<dyn Authority> =
            Arc::new(RestAuthority::new(&config.authority_uri, config.timeout)?);
        let backend = Backend::new(&config.db_uri, &config.db_key, config.timeout)?;
        let elections: Arc<dyn ElectionStore> = Arc::new(RestElectionStore::new(backend.clone()));
        let identities: Arc<dyn IdentityStore> = Arc::new(RestIdentityStore::new(backend));

        let coordinator = Arc::new(
            TallyCoordinator::new(
                AccumulatorStore::open(config.accumulators_path())?,
                authority.clone(),
                elections.clone(),
            )
            .with_timeout(config.timeout),
        );
        let registry = Arc::new(SimulationRegistry::open(config.simulations_path())?);
        let saga = SimulationSaga::new(
            coordinator.clone(),
            authority.clone(),
            elections,
            identities,
            registry,
        )
        .with_timeout(config.timeout);

        Ok(Services {
            authority,
            coordinator,
            saga,
        })
    }
}

/// Required positional argument
pub fn arg<'a>(matches: &'a ArgMatches, name: &str) -> anyhow::Result<&'a str> {
    matches
        .value_of(name)
        .ok_or_else(|| anyhow!("{} is required", name))
}

/// Expand `~` and environment variables
pub fn expand(input: &str) -> String {
    match shellexpand::full(input) {
        Ok(expanded) => expanded.into_owned(),
        Err(_) => input.to_owned(),
    }
}

pub fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
