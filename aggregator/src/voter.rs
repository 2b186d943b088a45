use crate::*;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;

const FIRST_NAMES: &[&str] = &[
    "Marco",
    "Sara",
    "Elisa",
    "Paolo",
    "Chiara",
    "Davide",
    "Marta",
    "Giorgio",
    "Francesca",
    "Alessio",
    "Irene",
    "Stefano",
];

const LAST_NAMES: &[&str] = &[
    "Rossi", "Bianchi", "Verdi", "Neri", "Gialli", "Blu", "Fontana", "Greco", "Marini", "Ferrari",
    "Conti", "Scola",
];

const PASSWORD_LEN: usize = 14;
const EMAIL_DOMAIN: &str = "example.com";

/// A fake voter about to be created for a simulation
#[derive(Debug, Clone)]
pub struct SyntheticVoter {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

impl SyntheticVoter {
    /// Generate the `index`-th (0-based) voter of a simulation
    pub fn generate<R: Rng>(rng: &mut R, simulation: SimulationId, index: usize) -> Self {
        let first_name = FIRST_NAMES.choose(rng).copied().unwrap_or("Voter");
        let last_name = LAST_NAMES.choose(rng).copied().unwrap_or("Anon");
        let password: String = (0..PASSWORD_LEN)
            .map(|_| char::from(rng.sample(Alphanumeric)))
            .collect();

        SyntheticVoter {
            first_name: first_name.to_owned(),
            last_name: last_name.to_owned(),
            email: make_email(first_name, last_name, simulation, index),
            password,
        }
    }

    pub fn identity(&self, simulation: SimulationId) -> NewIdentity {
        NewIdentity {
            email: self.email.clone(),
            password: self.password.clone(),
            metadata: serde_json::json!({ "simulation_id": simulation }),
        }
    }

    pub fn profile(&self, category: &str) -> VoterProfile {
        VoterProfile {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            category: category.to_owned(),
        }
    }
}

/// A voter created by a simulation, as reported back to the caller
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GeneratedVoter {
    pub id: VoterId,
    pub first_name: String,
    pub last_name: String,
    pub category: String,
}

/// Build `first.last.<simulation>.<index+1>@example.com`, normalized to a safe local part
pub fn make_email(first: &str, last: &str, simulation: SimulationId, index: usize) -> String {
    let raw = format!("{}.{}.{}.{}", first, last, simulation, index + 1).to_lowercase();

    let mut local = String::with_capacity(raw.len());
    for c in raw.chars() {
        let keep = c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+');
        // No runs of dots
        if keep && !(c == '.' && local.ends_with('.')) {
            local.push(c);
        }
    }

    let mut local: String = local.trim_matches('.').chars().take(64).collect();
    if local.is_empty() {
        local.push_str("user");
    }
    format!("{}@{}", local, EMAIL_DOMAIN)
}

/// Loose structural check: `local@domain.tld` with a 2+ letter tld
pub fn is_valid_email(email: &str) -> bool {
    let (local, domain) = match email.split_once('@') {
        Some(parts) => parts,
        None => return false,
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let local_ok = local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "._%+-!#$&'*/=?^`{|}~".contains(c));
    let (host, tld) = match domain.rsplit_once('.') {
        Some(parts) => parts,
        None => return false,
    };
    let host_ok = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    let tld_ok = tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic());
    local_ok && host_ok && tld_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape() {
        assert_eq!(make_email("Sara", "Rossi", 3, 0), "sara.rossi.3.1@example.com");
        assert_eq!(
            make_email("Anna Maria", "D'Amico", 7, 9),
            "annamaria.damico.7.10@example.com"
        );
        assert_eq!(make_email("..", "..", 1, 0), "1.1@example.com");
    }

    #[test]
    fn email_local_part_is_truncated() {
        let long = "x".repeat(100);
        let email = make_email(&long, "y", 1, 0);
        let (local, _) = email.split_once('@').unwrap();
        assert_eq!(local.len(), 64);
        assert!(is_valid_email(&email));
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a.b@example.com"));
        assert!(!is_valid_email("a.b@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("a b@example.com"));
        assert!(!is_valid_email("a@b@example.com"));
        assert!(!is_valid_email("a@example.c0m"));
    }

    #[test]
    fn generated_voters_are_valid() {
        let mut rng = rand::thread_rng();
        for i in 0..20 {
            let voter = SyntheticVoter::generate(&mut rng, 5, i);
            assert!(is_valid_email(&voter.email), "{}", voter.email);
            assert!(voter.email.contains(&format!(".5.{}@", i + 1)));
            assert_eq!(voter.password.len(), PASSWORD_LEN);
            assert!(voter.password.chars().all(|c| c.is_ascii_alphanumeric()));

            let identity = voter.identity(5);
            assert_eq!(identity.metadata["simulation_id"], 5);
            assert_eq!(voter.profile("staff").category, "staff");
        }
    }
}
