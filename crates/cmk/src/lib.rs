//! Cashu mint
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod cmk_database;

pub mod cmk_lightning {
    //! CMK Lightning
    pub use cmk_common::lightning::{
        CreateInvoiceResponse, Error, MintLightning, PayInvoiceResponse, PaymentQuoteResponse,
        Settings,
    };
}

#[cfg(feature = "mint")]
pub mod mint;

pub mod fees;

/// Re-export amount type
#[doc(hidden)]
pub use cmk_common::{
    amount, common as types, dhke, ensure_cmk,
    error::{self, Error},
    lightning_invoice, nuts, secret, util, Amount, Bolt11Invoice,
};

#[doc(hidden)]
pub use cmk_common::bitcoin::secp256k1;
#[cfg(feature = "mint")]
#[doc(hidden)]
pub use mint::Mint;

#[doc(hidden)]
pub use self::util::SECP256K1;

/// Re-export futures::Stream
pub use futures::{Stream, StreamExt};
