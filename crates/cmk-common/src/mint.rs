//! Mint types

use cashu::util::unix_time;
use cashu::{MeltQuoteBolt11Response, MintQuoteBolt11Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::nuts::{MeltQuoteState, MintQuoteState};
use crate::{Amount, CurrencyUnit, Id, KeySetInfo};

/// Mint Quote Info
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintQuote {
    /// Quote id
    pub id: Uuid,
    /// Amount of quote
    pub amount: Amount,
    /// Unit of quote
    pub unit: CurrencyUnit,
    /// Quote payment request e.g. bolt11
    pub request: String,
    /// Quote state
    pub state: MintQuoteState,
    /// Expiration time of quote
    pub expiry: u64,
    /// Value used by ln backend to look up state of request
    pub request_lookup_id: String,
    /// Unix time quote was created
    #[serde(default)]
    pub created_time: u64,
    /// Unix time quote was paid
    #[serde(default)]
    pub paid_time: Option<u64>,
}

impl MintQuote {
    /// Create new [`MintQuote`]
    pub fn new(
        request: String,
        unit: CurrencyUnit,
        amount: Amount,
        expiry: u64,
        request_lookup_id: String,
    ) -> Self {
        let id = Uuid::new_v4();

        Self {
            id,
            amount,
            unit,
            request,
            state: MintQuoteState::Unpaid,
            expiry,
            request_lookup_id,
            created_time: unix_time(),
            paid_time: None,
        }
    }

    /// Quote is past its expiry and was never paid
    pub fn is_expired(&self, now: u64) -> bool {
        self.state == MintQuoteState::Unpaid && self.expiry <= now
    }
}

/// Melt Quote Info
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltQuote {
    /// Quote id
    pub id: Uuid,
    /// Quote unit
    pub unit: CurrencyUnit,
    /// Quote amount
    pub amount: Amount,
    /// Quote Payment request e.g. bolt11
    pub request: String,
    /// Quote fee reserve
    pub fee_reserve: Amount,
    /// Quote state
    pub state: MeltQuoteState,
    /// Expiration time of quote
    pub expiry: u64,
    /// Payment preimage
    pub payment_preimage: Option<String>,
    /// Value used by ln backend to look up state of request
    pub request_lookup_id: String,
    /// Unix time quote was created
    #[serde(default)]
    pub created_time: u64,
    /// Unix time quote was paid
    #[serde(default)]
    pub paid_time: Option<u64>,
}

impl MeltQuote {
    /// Create new [`MeltQuote`]
    pub fn new(
        request: String,
        unit: CurrencyUnit,
        amount: Amount,
        fee_reserve: Amount,
        expiry: u64,
        request_lookup_id: String,
    ) -> Self {
        let id = Uuid::new_v4();

        Self {
            id,
            amount,
            unit,
            request,
            fee_reserve,
            state: MeltQuoteState::Unpaid,
            expiry,
            payment_preimage: None,
            request_lookup_id,
            created_time: unix_time(),
            paid_time: None,
        }
    }

    /// Quote is past its expiry and no melt was started on it
    pub fn is_expired(&self, now: u64) -> bool {
        self.state == MeltQuoteState::Unpaid && self.expiry <= now
    }
}

/// Mint Keyset Info
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintKeySetInfo {
    /// Keyset [`Id`]
    pub id: Id,
    /// Keyset [`CurrencyUnit`]
    pub unit: CurrencyUnit,
    /// Keyset active or inactive
    /// Mint will only issue new signatures on active keysets
    pub active: bool,
    /// Starting unix time Keyset is valid from
    pub valid_from: u64,
    /// Derivation path the keyset was generated from
    pub derivation_path: String,
    /// DerivationPath index of Keyset
    pub derivation_path_index: Option<u32>,
    /// Max order of keyset
    pub max_order: u8,
    /// Input Fee ppk
    #[serde(default = "default_fee")]
    pub input_fee_ppk: u64,
}

/// Default fee
pub fn default_fee() -> u64 {
    0
}

impl From<MintKeySetInfo> for KeySetInfo {
    fn from(keyset_info: MintKeySetInfo) -> Self {
        Self {
            id: keyset_info.id,
            unit: keyset_info.unit,
            active: keyset_info.active,
            input_fee_ppk: keyset_info.input_fee_ppk,
        }
    }
}

impl From<MintQuote> for MintQuoteBolt11Response {
    fn from(mint_quote: MintQuote) -> MintQuoteBolt11Response {
        MintQuoteBolt11Response {
            quote: mint_quote.id.to_string(),
            request: mint_quote.request,
            state: mint_quote.state,
            expiry: Some(mint_quote.expiry),
        }
    }
}

impl From<&MeltQuote> for MeltQuoteBolt11Response {
    fn from(melt_quote: &MeltQuote) -> MeltQuoteBolt11Response {
        MeltQuoteBolt11Response {
            quote: melt_quote.id.to_string(),
            amount: melt_quote.amount,
            fee_reserve: melt_quote.fee_reserve,
            state: melt_quote.state,
            expiry: melt_quote.expiry,
            payment_preimage: melt_quote.payment_preimage.clone(),
            change: None,
        }
    }
}

impl From<MeltQuote> for MeltQuoteBolt11Response {
    fn from(melt_quote: MeltQuote) -> MeltQuoteBolt11Response {
        MeltQuoteBolt11Response::from(&melt_quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_quote_expiry_only_applies_to_unpaid() {
        let mut quote = MintQuote::new(
            "lnbc".to_string(),
            CurrencyUnit::Sat,
            Amount::from(100),
            1_000,
            "hash".to_string(),
        );

        assert_eq!(quote.state, MintQuoteState::Unpaid);
        assert!(!quote.is_expired(999));
        assert!(quote.is_expired(1_000));

        quote.state = MintQuoteState::Paid;
        assert!(!quote.is_expired(2_000));
    }

    #[test]
    fn melt_quote_response_carries_quote_fields() {
        let quote = MeltQuote::new(
            "lnbc".to_string(),
            CurrencyUnit::Sat,
            Amount::from(100),
            Amount::from(2),
            1_000,
            "hash".to_string(),
        );

        let response = MeltQuoteBolt11Response::from(&quote);

        assert_eq!(response.quote, quote.id.to_string());
        assert_eq!(response.fee_reserve, Amount::from(2));
        assert_eq!(response.state, MeltQuoteState::Unpaid);
        assert!(response.change.is_none());
    }
}
