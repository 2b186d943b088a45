//! HTTP implementations of the collaborators.
//!
//! The Authority speaks its own small JSON API. Elections and identities live in a
//! PostgREST database fronted by a GoTrue admin API, both authenticated with one
//! service key.

use crate::*;
use async_trait::async_trait;
use num_bigint::BigUint;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

fn build_client(collaborator: &'static str, timeout: Duration) -> Result<Client, Error> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::unavailable(collaborator, e))
}

fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

// Overloaded or broken servers may recover; anything else is a refusal
async fn check(collaborator: &'static str, response: Response) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let reason = format!("{}: {}", status, body.trim());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(Error::unavailable(collaborator, reason))
    } else {
        Err(Error::rejected(collaborator, reason))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct PublicKeyResponse {
    n: String,
    g: String,
    pk_fingerprint: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct DecryptTallyResponse {
    plain_sum: u64,
}

/// Authority reached over HTTP
pub struct RestAuthority {
    base_uri: String,
    client: Client,
}

impl RestAuthority {
    pub fn new(base_uri: &str, timeout: Duration) -> Result<Self, Error> {
        Ok(RestAuthority {
            base_uri: base_uri.to_owned(),
            client: build_client("authority", timeout)?,
        })
    }
}

#[async_trait]
impl Authority for RestAuthority {
    async fn public_key(&self, election: &ElectionId) -> Result<PublicKey, Error> {
        let response = self
            .client
            .post(&join(&self.base_uri, "elections"))
            .json(&json!({ "votazione_id": election.as_str() }))
            .send()
            .await
            .map_err(|e| Error::unavailable("authority", e))?;

        let status = response.status();
        if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::ElectionNotFound(election.clone()));
        }
        let key: PublicKeyResponse = check("authority", response)
            .await?
            .json()
            .await
            .map_err(|e| Error::rejected("authority", e))?;

        PublicKey::from_decimal(&key.n, &key.g, key.pk_fingerprint)
    }

    async fn decrypt(&self, election: &ElectionId, ciphertext_sum: &BigUint) -> Result<u64, Error> {
        debug!(election = %election, "requesting decryption");
        let response = self
            .client
            .post(&join(&self.base_uri, "elections/decrypt_tally"))
            .json(&json!({
                "votazione_id": election.as_str(),
                "ciphertext_sum": ciphertext_sum.to_str_radix(10),
            }))
            .send()
            .await
            .map_err(|e| Error::unavailable("authority", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::DecryptionFailed(format!("{}: {}", status, body.trim())));
        }
        let tally: DecryptTallyResponse = response
            .json()
            .await
            .map_err(|e| Error::DecryptionFailed(e.to_string()))?;
        Ok(tally.plain_sum)
    }
}

/// Connection to the database backend shared by the election and identity stores
#[derive(Clone)]
pub struct Backend {
    base_uri: String,
    service_key: String,
    client: Client,
}

impl Backend {
    pub fn new(base_uri: &str, service_key: &str, timeout: Duration) -> Result<Self, Error> {
        Ok(Backend {
            base_uri: base_uri.to_owned(),
            service_key: service_key.to_owned(),
            client: build_client("database", timeout)?,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, &join(&self.base_uri, path))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        self.request(method, &format!("rest/v1/{}", table))
    }
}

// One row of the `votazioni` table
#[derive(Serialize, Deserialize, Debug, Clone)]
struct ElectionRow {
    id: i64,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    categoria: Option<String>,
    #[serde(default)]
    concluded: Option<bool>,
    #[serde(default)]
    si: Option<u64>,
    #[serde(default)]
    no: Option<u64>,
}

impl From<ElectionRow> for ElectionRecord {
    fn from(row: ElectionRow) -> Self {
        ElectionRecord {
            id: ElectionId::from(row.id),
            topic: row.topic.unwrap_or_default(),
            category: row.categoria.unwrap_or_default(),
            concluded: row.concluded.unwrap_or(false),
            yes: row.si,
            no: row.no,
        }
    }
}

fn eq(id: &str) -> String {
    format!("eq.{}", id)
}

/// Elections kept in the `votazioni` table
pub struct RestElectionStore {
    backend: Backend,
}

impl RestElectionStore {
    pub fn new(backend: Backend) -> Self {
        RestElectionStore { backend }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, Error> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::unavailable("election store", e))?;
        check("election store", response).await
    }
}

#[async_trait]
impl ElectionStore for RestElectionStore {
    async fn create(&self, topic: &str, category: &str) -> Result<ElectionId, Error> {
        let rows: Vec<ElectionRow> = self
            .send(
                self.backend
                    .table(Method::POST, "votazioni")
                    .header("Prefer", "return=representation")
                    .json(&json!({ "topic": topic, "categoria": category, "concluded": false })),
            )
            .await?
            .json()
            .await
            .map_err(|e| Error::rejected("election store", e))?;

        rows.into_iter()
            .next()
            .map(|row| ElectionId::from(row.id))
            .ok_or_else(|| Error::rejected("election store", "insert returned no row"))
    }

    async fn update(
        &self,
        id: &ElectionId,
        yes: u64,
        no: u64,
        concluded: bool,
    ) -> Result<(), Error> {
        self.send(
            self.backend
                .table(Method::PATCH, "votazioni")
                .query(&[("id", eq(id.as_str()))])
                .json(&json!({ "si": yes, "no": no, "concluded": concluded })),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, id: &ElectionId) -> Result<(), Error> {
        // Votes reference the election, so they go first
        self.send(
            self.backend
                .table(Method::DELETE, "votes")
                .query(&[("votazione_id", eq(id.as_str()))]),
        )
        .await?;
        self.send(
            self.backend
                .table(Method::DELETE, "votazioni")
                .query(&[("id", eq(id.as_str()))]),
        )
        .await?;
        Ok(())
    }

    async fn get(&self, id: &ElectionId) -> Result<Option<ElectionRecord>, Error> {
        let rows: Vec<ElectionRow> = self
            .send(
                self.backend
                    .table(Method::GET, "votazioni")
                    .query(&[("select", "*".to_owned()), ("id", eq(id.as_str()))]),
            )
            .await?
            .json()
            .await
            .map_err(|e| Error::rejected("election store", e))?;

        Ok(rows.into_iter().next().map(ElectionRecord::from))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct CreatedUser {
    id: String,
}

/// Voter identities kept by the auth admin API, with profiles in the `profiles` table
pub struct RestIdentityStore {
    backend: Backend,
}

impl RestIdentityStore {
    pub fn new(backend: Backend) -> Self {
        RestIdentityStore { backend }
    }
}

#[async_trait]
impl IdentityStore for RestIdentityStore {
    async fn create(&self, identity: &NewIdentity) -> Result<VoterId, Error> {
        let response = self
            .backend
            .request(Method::POST, "auth/v1/admin/users")
            .json(&json!({
                "email": identity.email,
                "password": identity.password,
                "email_confirm": true,
                "user_metadata": identity.metadata,
            }))
            .send()
            .await
            .map_err(|e| Error::unavailable("identity store", e))?;

        let user: CreatedUser = check("identity store", response)
            .await?
            .json()
            .await
            .map_err(|e| Error::rejected("identity store", e))?;
        if user.id.is_empty() {
            return Err(Error::rejected("identity store", "created user has no id"));
        }
        Ok(user.id)
    }

    async fn update_profile(&self, id: &str, profile: &VoterProfile) -> Result<(), Error> {
        let response = self
            .backend
            .table(Method::PATCH, "profiles")
            .query(&[("id", eq(id))])
            .json(&json!({
                "nome": profile.first_name,
                "cognome": profile.last_name,
                "categoria": profile.category,
            }))
            .send()
            .await
            .map_err(|e| Error::unavailable("identity store", e))?;
        check("identity store", response).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), Error> {
        let response = self
            .backend
            .request(Method::DELETE, &format!("auth/v1/admin/users/{}", id))
            .send()
            .await
            .map_err(|e| Error::unavailable("identity store", e))?;

        // Already gone
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check("identity store", response).await?;
        Ok(())
    }
}
