//! Types

use serde::{Deserialize, Serialize};

use crate::nuts::{CurrencyUnit, PaymentMethod};
use crate::Amount;

/// Key used in hashmap of ln backends to identify what unit and payment method
/// it is for
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct LnKey {
    /// Unit of Payment backend
    pub unit: CurrencyUnit,
    /// Method of payment backend
    pub method: PaymentMethod,
}

impl LnKey {
    /// Create new [`LnKey`]
    pub fn new(unit: CurrencyUnit, method: PaymentMethod) -> Self {
        Self { unit, method }
    }
}

/// Seconds quotes are valid
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteTTL {
    /// Seconds mint quote is valid
    pub mint_ttl: u64,
    /// Seconds melt quote is valid
    pub melt_ttl: u64,
}

impl QuoteTTL {
    /// Create new [`QuoteTTL`]
    pub fn new(mint_ttl: u64, melt_ttl: u64) -> QuoteTTL {
        Self { mint_ttl, melt_ttl }
    }
}

impl Default for QuoteTTL {
    fn default() -> Self {
        Self {
            mint_ttl: 60 * 60, // 1 hour
            melt_ttl: 60,      // 1 minute
        }
    }
}

/// Mint Fee Reserve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeReserve {
    /// Absolute expected min fee
    pub min_fee_reserve: Amount,
    /// Percentage expected fee
    pub percent_fee_reserve: f32,
}

impl Default for FeeReserve {
    fn default() -> Self {
        Self {
            min_fee_reserve: Amount::from(2),
            percent_fee_reserve: 0.02,
        }
    }
}

impl FeeReserve {
    /// Routing fee to hold back when paying `amount`
    ///
    /// `max(min_fee_reserve, ceil(percent_fee_reserve * amount))`
    pub fn reserve_for(&self, amount: Amount) -> Amount {
        let relative = (self.percent_fee_reserve * u64::from(amount) as f32).ceil() as u64;

        Amount::from(relative.max(self.min_fee_reserve.to_u64()))
    }
}
