//! In-memory collaborators for tests.

use crate::*;
use async_trait::async_trait;
use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, ToPrimitive};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

// The 1,000,000th and 2,000,000th primes: tiny, but a real Paillier key
const P: u64 = 15_485_863;
const Q: u64 = 32_452_843;

/// A full Paillier key pair, so tests can check what the Authority would decrypt
pub struct TestKeyPair {
    public: PublicKey,
    lambda: BigUint,
    mu: BigUint,
}

impl TestKeyPair {
    pub fn new() -> Self {
        let p = BigUint::from(P);
        let q = BigUint::from(Q);
        let n = &p * &q;
        let g = &n + BigUint::one();
        let lambda = (&p - BigUint::one()).lcm(&(&q - BigUint::one()));
        let mu = lambda.modinv(&n).unwrap();
        TestKeyPair {
            public: PublicKey::new(n, g, "test-fingerprint".into()).unwrap(),
            lambda,
            mu,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public.clone()
    }

    pub fn decrypt(&self, ciphertext: &BigUint) -> u64 {
        let n = &self.public.n;
        let x = ciphertext.modpow(&self.lambda, self.public.nsquare());
        let l = (x - BigUint::one()) / n;
        ((l * &self.mu) % n).to_u64().unwrap()
    }
}

pub struct MemAuthority {
    keys: TestKeyPair,
    auto_init: bool,
    initialized: Mutex<HashSet<ElectionId>>,
    decrypt_calls: AtomicUsize,
    refuse: AtomicBool,
    stall: AtomicBool,
}

impl MemAuthority {
    /// Only elections passed to `init` have keys
    pub fn new() -> Self {
        MemAuthority {
            keys: TestKeyPair::new(),
            auto_init: false,
            initialized: Mutex::new(HashSet::new()),
            decrypt_calls: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
            stall: AtomicBool::new(false),
        }
    }

    /// Issues a key for any election on first request, like the deployed Authority
    pub fn auto_initializing() -> Self {
        MemAuthority {
            auto_init: true,
            ..MemAuthority::new()
        }
    }

    pub fn init(&self, election: &ElectionId) {
        self.initialized.lock().insert(election.clone());
    }

    pub fn keys(&self) -> &TestKeyPair {
        &self.keys
    }

    pub fn decrypt_calls(&self) -> usize {
        self.decrypt_calls.load(Ordering::SeqCst)
    }

    pub fn refuse_decryption(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Make decrypt hang until switched back
    pub fn stall_decryption(&self, stall: bool) {
        self.stall.store(stall, Ordering::SeqCst);
    }
}

#[async_trait]
impl Authority for MemAuthority {
    async fn public_key(&self, election: &ElectionId) -> Result<PublicKey, Error> {
        let mut initialized = self.initialized.lock();
        if !initialized.contains(election) {
            if !self.auto_init {
                return Err(Error::ElectionNotFound(election.clone()));
            }
            initialized.insert(election.clone());
        }
        Ok(self.keys.public_key())
    }

    async fn decrypt(&self, election: &ElectionId, ciphertext_sum: &BigUint) -> Result<u64, Error> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        if self.stall.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::DecryptionFailed("refused by test".into()));
        }
        if !self.initialized.lock().contains(election) {
            return Err(Error::DecryptionFailed(format!("no key for {}", election)));
        }
        Ok(self.keys.decrypt(ciphertext_sum))
    }
}

/// Never answers
pub struct StalledAuthority;

#[async_trait]
impl Authority for StalledAuthority {
    async fn public_key(&self, _election: &ElectionId) -> Result<PublicKey, Error> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(Error::unavailable("authority", "stalled"))
    }

    async fn decrypt(&self, _election: &ElectionId, _sum: &BigUint) -> Result<u64, Error> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(Error::unavailable("authority", "stalled"))
    }
}

#[derive(Default)]
pub struct MemElectionStore {
    records: Mutex<BTreeMap<ElectionId, ElectionRecord>>,
    next_id: AtomicI64,
    update_calls: AtomicUsize,
    fail_create: AtomicBool,
    fail_update: AtomicBool,
    fail_delete: AtomicBool,
}

impl MemElectionStore {
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ElectionStore for MemElectionStore {
    async fn create(&self, topic: &str, category: &str) -> Result<ElectionId, Error> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::rejected("election store", "create refused by test"));
        }
        let id = ElectionId::from(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.records.lock().insert(
            id.clone(),
            ElectionRecord {
                id: id.clone(),
                topic: topic.to_owned(),
                category: category.to_owned(),
                concluded: false,
                yes: None,
                no: None,
            },
        );
        Ok(id)
    }

    async fn update(
        &self,
        id: &ElectionId,
        yes: u64,
        no: u64,
        concluded: bool,
    ) -> Result<(), Error> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(Error::unavailable("election store", "update dropped by test"));
        }
        let mut records = self.records.lock();
        let record = records
            .get_mut(id)
            .ok_or_else(|| Error::ElectionNotFound(id.clone()))?;
        record.yes = Some(yes);
        record.no = Some(no);
        record.concluded = concluded;
        Ok(())
    }

    async fn delete(&self, id: &ElectionId) -> Result<(), Error> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Error::unavailable("election store", "delete dropped by test"));
        }
        self.records.lock().remove(id);
        Ok(())
    }

    async fn get(&self, id: &ElectionId) -> Result<Option<ElectionRecord>, Error> {
        Ok(self.records.lock().get(id).cloned())
    }
}

#[derive(Default)]
pub struct MemIdentityStore {
    identities: Mutex<BTreeMap<VoterId, (NewIdentity, Option<VoterProfile>)>>,
    created: AtomicUsize,
    fail_create_at: Mutex<Option<usize>>,
    stall_create_at: Mutex<Option<usize>>,
    undeletable: Mutex<HashSet<VoterId>>,
    stall_delete_once: Mutex<Option<VoterId>>,
    delete_calls: AtomicUsize,
}

impl MemIdentityStore {
    /// Make the n-th create call (1-based) fail
    pub fn fail_create_at(&self, n: usize) {
        *self.fail_create_at.lock() = Some(n);
    }

    /// Make the n-th create call (1-based) never return
    pub fn stall_create_at(&self, n: usize) {
        *self.stall_create_at.lock() = Some(n);
    }

    /// Make deleting this identity fail
    pub fn undeletable(&self, id: &str) {
        self.undeletable.lock().insert(id.to_owned());
    }

    /// Make the first delete of this identity never return
    pub fn stall_delete_once(&self, id: &str) {
        *self.stall_delete_once.lock() = Some(id.to_owned());
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn ids(&self) -> Vec<VoterId> {
        self.identities.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.identities.lock().len()
    }

    pub fn profile(&self, id: &str) -> Option<VoterProfile> {
        self.identities
            .lock()
            .get(id)
            .and_then(|(_, profile)| profile.clone())
    }

    pub fn identity(&self, id: &str) -> Option<NewIdentity> {
        self.identities.lock().get(id).map(|(identity, _)| identity.clone())
    }
}

#[async_trait]
impl IdentityStore for MemIdentityStore {
    async fn create(&self, identity: &NewIdentity) -> Result<VoterId, Error> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.fail_create_at.lock() == Some(n) {
            return Err(Error::unavailable("identity store", "create dropped by test"));
        }
        let stall = *self.stall_create_at.lock() == Some(n);
        if stall {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let id = format!("voter-{}", n);
        self.identities
            .lock()
            .insert(id.clone(), (identity.clone(), None));
        Ok(id)
    }

    async fn update_profile(&self, id: &str, profile: &VoterProfile) -> Result<(), Error> {
        let mut identities = self.identities.lock();
        let entry = identities
            .get_mut(id)
            .ok_or_else(|| Error::rejected("identity store", format!("no identity {}", id)))?;
        entry.1 = Some(profile.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), Error> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let stall = {
            let mut once = self.stall_delete_once.lock();
            if once.as_deref() == Some(id) {
                *once = None;
                true
            } else {
                false
            }
        };
        if stall {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.undeletable.lock().contains(id) {
            return Err(Error::rejected("identity store", "delete refused by test"));
        }
        self.identities.lock().remove(id);
        Ok(())
    }
}
