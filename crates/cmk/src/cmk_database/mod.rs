//! CMK Database

pub use cmk_common::database::{Error, MintDatabase};

pub mod mint_memory;

pub use mint_memory::MintMemoryDatabase;
