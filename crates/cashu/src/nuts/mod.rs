//! Nuts
//!
//! See all at <https://github.com/cashubtc/nuts>

pub mod nut00;
pub mod nut01;
pub mod nut02;
pub mod nut03;
pub mod nut04;
pub mod nut05;
pub mod nut07;
pub mod nut12;

#[cfg(feature = "wallet")]
pub use nut00::{PreMint, PreMintSecrets};
pub use nut00::{
    BlindSignature, BlindedMessage, CurrencyUnit, PaymentMethod, Proof, Proofs, ProofsMethods,
};
pub use nut01::{Keys, KeysResponse, MintKeyPair, MintKeys, PublicKey, SecretKey};
#[cfg(feature = "mint")]
pub use nut02::MintKeySet;
pub use nut02::{Id, KeySet, KeySetInfo, KeysetResponse};
pub use nut03::{SwapRequest, SwapResponse};
pub use nut04::{
    MintBolt11Request, MintBolt11Response, MintQuoteBolt11Request, MintQuoteBolt11Response,
    QuoteState as MintQuoteState,
};
pub use nut05::{
    MeltBolt11Request, MeltQuoteBolt11Request, MeltQuoteBolt11Response,
    QuoteState as MeltQuoteState,
};
pub use nut07::{CheckStateRequest, CheckStateResponse, ProofState, State};
pub use nut12::{BlindSignatureDleq, ProofDleq};
