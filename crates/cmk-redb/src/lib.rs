//! Redb storage backend for CMK

#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod error;

#[cfg(feature = "mint")]
pub mod mint;

#[cfg(feature = "mint")]
pub use mint::MintRedbDatabase;
