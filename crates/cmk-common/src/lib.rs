//! Shared mint-side types and traits.
//!
//! This crate is the contract between the CMK (Cashu Mint Kit) mint and its collaborators: the
//! error taxonomy, the storage trait, the Lightning backend trait and the quote and keyset
//! records they exchange.

pub mod common;
pub mod database;
pub mod error;
pub mod lightning;
pub mod mint;
pub mod state;

// re-exporting external crates
pub use bitcoin;
pub use cashu::amount::{self, Amount};
pub use cashu::lightning_invoice::{self, Bolt11Invoice};
pub use cashu::nuts::{self, *};
pub use cashu::{dhke, secret, util, SECP256K1};

pub use self::error::{Error, ErrorCode, ErrorKind, ErrorResponse};
