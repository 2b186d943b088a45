use crate::{arg, expand, print_json, Services};
use aggregator::*;
use anyhow::bail;
use serde_json::json;

pub async fn command_vote(matches: &clap::ArgMatches<'_>, services: &Services) -> anyhow::Result<()> {
    let election = ElectionId::parse(&expand(arg(matches, "ELECTION-ID")?))?;
    let ballot = arg(matches, "BALLOT")?.trim();

    let ciphertext = if matches.is_present("encrypt") {
        let vote: u64 = match ballot {
            "0" => 0,
            "1" => 1,
            _ => bail!("a plaintext ballot is 0 or 1, got {:?}", ballot),
        };
        let public_key = services.authority.public_key(&election).await?;
        public_key
            .encrypt(vote, &mut rand::thread_rng())
            .ciphertext
            .to_str_radix(10)
    } else {
        ballot.to_owned()
    };

    let count = services.coordinator.submit_vote(&election, &ciphertext).await?;

    print_json(&json!({
        "status": "ok",
        "election_id": election,
        "count": count,
    }))
}
