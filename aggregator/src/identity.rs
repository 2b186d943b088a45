use crate::*;
use async_trait::async_trait;
use serde_json::Value;

/// Identifier of a voter in the identity store
pub type VoterId = String;

/// Credentials and metadata for an identity to create
#[derive(Debug, Clone, Serialize)]
pub struct NewIdentity {
    pub email: String,
    pub password: String,
    pub metadata: Value,
}

/// Public profile attached to an identity
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VoterProfile {
    pub first_name: String,
    pub last_name: String,
    pub category: String,
}

/// External store of voter identities
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn create(&self, identity: &NewIdentity) -> Result<VoterId, Error>;

    async fn update_profile(&self, id: &str, profile: &VoterProfile) -> Result<(), Error>;

    async fn delete(&self, id: &str) -> Result<(), Error>;
}
