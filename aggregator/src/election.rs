use crate::*;
use async_trait::async_trait;
use std::fmt;

/// Opaque election identifier, assigned by the election store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElectionId(String);

impl ElectionId {
    pub fn new(id: impl Into<String>) -> Self {
        ElectionId(id.into())
    }

    /// Parse a caller-supplied id, rejecting blank ones
    pub fn parse(id: &str) -> Result<Self, Error> {
        let id = id.trim();
        if id.is_empty() {
            return Err(Error::InvalidPayload("election id must not be empty".into()));
        }
        Ok(ElectionId(id.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for ElectionId {
    fn from(id: i64) -> Self {
        ElectionId(id.to_string())
    }
}

/// The persisted election record, as seen by the aggregator
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ElectionRecord {
    pub id: ElectionId,
    pub topic: String,
    pub category: String,
    pub concluded: bool,
    pub yes: Option<u64>,
    pub no: Option<u64>,
}

/// External database holding election records
#[async_trait]
pub trait ElectionStore: Send + Sync {
    async fn create(&self, topic: &str, category: &str) -> Result<ElectionId, Error>;

    async fn update(&self, id: &ElectionId, yes: u64, no: u64, concluded: bool)
        -> Result<(), Error>;

    async fn delete(&self, id: &ElectionId) -> Result<(), Error>;

    async fn get(&self, id: &ElectionId) -> Result<Option<ElectionRecord>, Error>;
}
