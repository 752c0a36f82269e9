//! Cashu shared types and functions.
//!
//! This crate is the base foundation for the CMK (Cashu Mint Kit) crates: the protocol wire types,
//! amounts, the blind Diffie-Hellman key exchange and keyset derivation.

pub mod amount;
pub mod dhke;
pub mod nuts;
pub mod secret;
pub mod util;

// re-exporting external crates
pub use bitcoin;
pub use lightning_invoice::{self, Bolt11Invoice};

pub use self::amount::Amount;
pub use self::nuts::*;
pub use self::util::SECP256K1;
