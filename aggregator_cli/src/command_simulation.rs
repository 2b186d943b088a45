use crate::{arg, print_json, Services};
use aggregator::*;
use anyhow::Context;
use serde_json::json;

pub async fn command_simulate(
    matches: &clap::ArgMatches<'_>,
    services: &Services,
) -> anyhow::Result<()> {
    let request = SimulationRequest {
        count: arg(matches, "COUNT")?
            .trim()
            .parse()
            .context("COUNT must be a number")?,
        category: arg(matches, "CATEGORY")?.to_owned(),
        topic: matches.value_of("topic").map(str::to_owned),
    };

    let report = services.saga.start(&request).await?;
    print_json(&serde_json::to_value(&report)?)
}

pub async fn command_end_simulation(
    matches: &clap::ArgMatches<'_>,
    services: &Services,
) -> anyhow::Result<()> {
    let id: SimulationId = arg(matches, "SIMULATION-ID")?
        .trim()
        .parse()
        .context("SIMULATION-ID must be a number")?;

    services.saga.end(id).await?;
    print_json(&json!({ "status": "ok", "simulation_id": id }))
}

pub async fn command_recover(services: &Services) -> anyhow::Result<()> {
    let recovered = services.saga.recover().await?;
    print_json(&json!({ "status": "ok", "rolled_back": recovered }))
}
