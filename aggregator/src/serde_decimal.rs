//! `#[serde(with)]` helper storing arbitrary-precision integers as decimal strings,
//! which is how ciphertexts travel on the wire and sit on disk.

use num_bigint::BigUint;
use serde::{de, Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_str_radix(10))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    crate::parse_decimal(&s)
        .ok_or_else(|| de::Error::custom(format!("invalid decimal integer: {:?}", s)))
}
