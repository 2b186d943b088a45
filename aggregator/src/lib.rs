#[macro_use]
extern crate serde;

mod accumulator;
mod authority;
mod election;
mod error;
mod identity;
mod paillier;
mod rest;
mod saga;
mod serde_decimal;
mod simulation;
mod store;
mod tally;
mod util;
mod voter;

pub use accumulator::*;
pub use authority::*;
pub use election::*;
pub use error::*;
pub use identity::*;
pub use paillier::*;
pub use rest::*;
pub use saga::*;
pub use simulation::*;
pub use store::*;
pub use tally::*;
pub use util::*;
pub use voter::*;

#[cfg(test)]
mod testing;
