use crate::{arg, expand, print_json, Services};
use aggregator::*;
use anyhow::Context;
use serde_json::json;

pub async fn command_result(
    matches: &clap::ArgMatches<'_>,
    services: &Services,
) -> anyhow::Result<()> {
    let election = ElectionId::parse(&expand(arg(matches, "ELECTION-ID")?))?;
    let expected: u64 = arg(matches, "EXPECTED-VOTERS")?
        .trim()
        .parse()
        .context("EXPECTED-VOTERS must be a non-negative integer")?;

    let outcome = services.coordinator.get_result(&election, expected).await?;

    let output = match outcome {
        TallyOutcome::Concluded(tally) => json!({
            "status": "ok",
            "yes": tally.yes,
            "no": tally.no,
            "total": tally.total(),
        }),
        TallyOutcome::NotConcluded { count, expected } => json!({
            "status": "not_concluded",
            "count": count,
            "expected": expected,
        }),
    };
    print_json(&output)
}
