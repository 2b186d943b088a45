use anyhow::{anyhow, Context};
use std::env::var;
use std::path::PathBuf;
use std::time::Duration;

pub struct Config {
    pub authority_uri: String,
    pub db_uri: String,
    pub db_key: String,
    pub data_dir: PathBuf,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|val| !val.trim().is_empty())
                .ok_or_else(|| anyhow!("{} environment variable must be set", name))
        };

        let authority_uri = required("AGGREGATOR_AUTHORITY_URI")?;
        let db_uri = required("AGGREGATOR_DB_URI")?;
        let db_key = required("AGGREGATOR_DB_KEY")?;

        let data_dir = match lookup("AGGREGATOR_DATA_DIR") {
            Some(val) => PathBuf::from(crate::expand(&val)),
            None => PathBuf::from("./data"),
        };

        let timeout = match lookup("AGGREGATOR_TIMEOUT_SECS") {
            Some(val) => {
                let secs: u64 = val
                    .trim()
                    .parse()
                    .with_context(|| format!("AGGREGATOR_TIMEOUT_SECS is not a number: {}", val))?;
                Duration::from_secs(secs)
            }
            None => aggregator::DEFAULT_COLLABORATOR_TIMEOUT,
        };

        Ok(Config {
            authority_uri,
            db_uri,
            db_key,
            data_dir,
            timeout,
        })
    }

    pub fn accumulators_path(&self) -> PathBuf {
        self.data_dir.join("elections").join("accumulators.json")
    }

    pub fn simulations_path(&self) -> PathBuf {
        self.data_dir.join("simulations").join("simulations.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("AGGREGATOR_AUTHORITY_URI", "http://authority/api/authority"),
        ("AGGREGATOR_DB_URI", "http://db"),
        ("AGGREGATOR_DB_KEY", "service-key"),
    ];

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup(REQUIRED)).unwrap();
        assert_eq!(config.authority_uri, "http://authority/api/authority");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(
            config.accumulators_path(),
            PathBuf::from("./data/elections/accumulators.json")
        );
        assert_eq!(
            config.simulations_path(),
            PathBuf::from("./data/simulations/simulations.json")
        );
    }

    #[test]
    fn overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("AGGREGATOR_DATA_DIR", "/var/lib/aggregator"));
        vars.push(("AGGREGATOR_TIMEOUT_SECS", "5"));
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/aggregator"));
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn missing_and_invalid() {
        let err = Config::from_lookup(lookup(&REQUIRED[..2])).err().unwrap();
        assert!(err.to_string().contains("AGGREGATOR_DB_KEY"));

        let mut vars = REQUIRED.to_vec();
        vars.push(("AGGREGATOR_TIMEOUT_SECS", "soon"));
        assert!(Config::from_lookup(lookup(&vars)).is_err());
    }
}
