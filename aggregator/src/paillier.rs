//! Public-key half of the Paillier additive scheme.
//!
//! Only what the aggregator needs lives here: parsing the Authority's public key,
//! validating submitted ciphertexts, encrypting simulated ballots and adding
//! ciphertexts together. Key generation and decryption belong to the Authority.

use crate::*;
use num_bigint::{BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::{CryptoRng, Rng};
use std::str::FromStr;

/// An election's public key as issued by the Authority
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub n: BigUint,
    pub g: BigUint,
    pub fingerprint: String,
    nsquare: BigUint,
}

impl PublicKey {
    pub fn new(n: BigUint, g: BigUint, fingerprint: String) -> Result<Self, Error> {
        if n <= BigUint::one() {
            return Err(Error::InvalidPayload("public key modulus must be > 1".into()));
        }
        let nsquare = &n * &n;
        if g.is_zero() || g >= nsquare {
            return Err(Error::InvalidPayload(
                "public key generator out of range".into(),
            ));
        }
        Ok(PublicKey {
            n,
            g,
            fingerprint,
            nsquare,
        })
    }

    /// Build a key from the decimal strings used on the wire
    pub fn from_decimal(n: &str, g: &str, fingerprint: String) -> Result<Self, Error> {
        let n = parse_decimal(n)
            .ok_or_else(|| Error::InvalidPayload(format!("bad public key modulus: {:?}", n)))?;
        let g = parse_decimal(g)
            .ok_or_else(|| Error::InvalidPayload(format!("bad public key generator: {:?}", g)))?;
        Self::new(n, g, fingerprint)
    }

    pub fn nsquare(&self) -> &BigUint {
        &self.nsquare
    }

    /// Encrypt a small plaintext, producing an exponent-0 encrypted number
    pub fn encrypt<R: Rng + CryptoRng>(&self, plaintext: u64, rng: &mut R) -> EncryptedNumber {
        let r = loop {
            let candidate = rng.gen_biguint_range(&BigUint::one(), &self.n);
            if candidate.gcd(&self.n).is_one() {
                break candidate;
            }
        };

        let gm = self.g.modpow(&BigUint::from(plaintext), &self.nsquare);
        let rn = r.modpow(&self.n, &self.nsquare);

        EncryptedNumber {
            ciphertext: (gm * rn) % &self.nsquare,
            exponent: 0,
        }
    }

    /// Homomorphically add two encrypted numbers.
    ///
    /// Both operands must share the same exponent; mixed exponents are rejected.
    pub fn add(&self, a: &EncryptedNumber, b: &EncryptedNumber) -> Result<EncryptedNumber, Error> {
        if a.exponent != b.exponent {
            return Err(Error::ExponentMismatch {
                expected: a.exponent,
                found: b.exponent,
            });
        }
        Ok(EncryptedNumber {
            ciphertext: (&a.ciphertext * &b.ciphertext) % &self.nsquare,
            exponent: a.exponent,
        })
    }

    /// Wrap a raw ciphertext submitted by a voter, checking that it belongs to this key's group
    pub fn ballot(&self, ciphertext: BigUint) -> Result<EncryptedNumber, Error> {
        if ciphertext.is_zero() || ciphertext >= self.nsquare {
            return Err(Error::InvalidPayload(
                "ciphertext is outside the range of the election public key".into(),
            ));
        }
        Ok(EncryptedNumber {
            ciphertext,
            exponent: 0,
        })
    }
}

/// One homomorphically encrypted value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedNumber {
    pub ciphertext: BigUint,
    pub exponent: i64,
}

/// Parse a non-negative decimal integer, tolerating surrounding whitespace
pub fn parse_decimal(s: &str) -> Option<BigUint> {
    let s = s.trim();
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    BigUint::from_str(s).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestKeyPair;

    #[test]
    fn parse_decimal_strings() {
        assert_eq!(parse_decimal(" 42 "), Some(BigUint::from(42u32)));
        assert_eq!(parse_decimal("-1"), None);
        assert_eq!(parse_decimal("0x10"), None);
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("12ab"), None);
    }

    #[test]
    fn rejects_bad_keys() {
        assert!(PublicKey::from_decimal("1", "2", "fp".into()).is_err());
        assert!(PublicKey::from_decimal("abc", "2", "fp".into()).is_err());
        assert!(PublicKey::from_decimal("15", "0", "fp".into()).is_err());
        assert!(PublicKey::from_decimal("15", "16", "fp".into()).is_ok());
    }

    #[test]
    fn ballot_range_is_checked() {
        let keys = TestKeyPair::new();
        let pk = keys.public_key();
        assert!(pk.ballot(BigUint::zero()).is_err());
        assert!(pk.ballot(pk.nsquare().clone()).is_err());
        assert!(pk.ballot(BigUint::from(7u32)).is_ok());
    }

    #[test]
    fn addition_is_homomorphic() {
        let keys = TestKeyPair::new();
        let pk = keys.public_key();
        let mut rng = rand::thread_rng();

        let a = pk.encrypt(1, &mut rng);
        let b = pk.encrypt(0, &mut rng);
        let c = pk.encrypt(1, &mut rng);

        // Encryption is randomized
        assert_ne!(pk.encrypt(1, &mut rng), pk.encrypt(1, &mut rng));

        let ab = pk.add(&a, &b).unwrap();
        let sum = pk.add(&ab, &c).unwrap();
        assert_eq!(keys.decrypt(&sum.ciphertext), 2);

        // Order does not matter
        let ca = pk.add(&c, &a).unwrap();
        let other = pk.add(&ca, &b).unwrap();
        assert_eq!(keys.decrypt(&other.ciphertext), 2);
    }

    #[test]
    fn mixed_exponents_are_rejected() {
        let keys = TestKeyPair::new();
        let pk = keys.public_key();
        let mut rng = rand::thread_rng();

        let a = pk.encrypt(1, &mut rng);
        let mut b = pk.encrypt(1, &mut rng);
        b.exponent = -1;

        match pk.add(&a, &b) {
            Err(Error::ExponentMismatch { expected, found }) => {
                assert_eq!(expected, 0);
                assert_eq!(found, -1);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
