//! Mint Builder

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use cmk_common::common::{LnKey, QuoteTTL};
use cmk_common::database::{self, MintDatabase};

use super::{LnBackend, DEFAULT_MELT_TIMEOUT};
use crate::amount::Amount;
use crate::mint::Mint;
use crate::nuts::{CurrencyUnit, PaymentMethod};

/// Default max order of a keyset, one key per power of two up to 2^63
const DEFAULT_MAX_ORDER: u8 = 64;

/// Cashu Mint builder
#[derive(Default)]
pub struct MintBuilder {
    /// Mint Storage backend
    localstore: Option<Arc<dyn MintDatabase<Err = database::Error> + Send + Sync>>,
    /// Ln backends for mint
    ln: HashMap<LnKey, LnBackend>,
    limits: HashMap<LnKey, MintMeltLimits>,
    seed: Option<Vec<u8>>,
    quote_ttl: Option<QuoteTTL>,
    melt_timeout: Option<Duration>,
    invoice_description: Option<String>,
    supported_units: HashMap<CurrencyUnit, (u64, u8)>,
}

impl std::fmt::Debug for MintBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MintBuilder")
            .field("ln", &self.ln.keys().collect::<Vec<_>>())
            .field("limits", &self.limits)
            .field("quote_ttl", &self.quote_ttl)
            .field("melt_timeout", &self.melt_timeout)
            .field("invoice_description", &self.invoice_description)
            .field("supported_units", &self.supported_units)
            .finish()
    }
}

impl MintBuilder {
    /// New mint builder
    pub fn new() -> MintBuilder {
        MintBuilder::default()
    }

    /// Set localstore
    pub fn with_localstore(
        mut self,
        localstore: Arc<dyn MintDatabase<Err = database::Error> + Send + Sync>,
    ) -> MintBuilder {
        self.localstore = Some(localstore);
        self
    }

    /// Set seed
    pub fn with_seed(mut self, seed: Vec<u8>) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Add ln backend
    ///
    /// The unit gets a keyset without input fee unless [`MintBuilder::with_input_fee_ppk`] sets
    /// one.
    pub fn add_ln_backend(
        mut self,
        unit: CurrencyUnit,
        method: PaymentMethod,
        limits: MintMeltLimits,
        ln_backend: LnBackend,
    ) -> Self {
        let ln_key = LnKey {
            unit: unit.clone(),
            method,
        };

        self.ln.insert(ln_key.clone(), ln_backend);
        self.limits.insert(ln_key, limits);

        self.supported_units
            .entry(unit)
            .or_insert((0, DEFAULT_MAX_ORDER));

        self
    }

    /// Set the input fee of a unit's keyset
    pub fn with_input_fee_ppk(mut self, unit: CurrencyUnit, input_fee_ppk: u64) -> Self {
        self.supported_units
            .entry(unit)
            .and_modify(|(fee, _)| *fee = input_fee_ppk)
            .or_insert((input_fee_ppk, DEFAULT_MAX_ORDER));
        self
    }

    /// Set quote ttl
    pub fn with_quote_ttl(mut self, mint_ttl: u64, melt_ttl: u64) -> Self {
        let quote_ttl = QuoteTTL { mint_ttl, melt_ttl };

        self.quote_ttl = Some(quote_ttl);

        self
    }

    /// Set how long a melt waits on the Lightning backend
    pub fn with_melt_timeout(mut self, melt_timeout: Duration) -> Self {
        self.melt_timeout = Some(melt_timeout);
        self
    }

    /// Set the description put on invoices of mint quotes
    pub fn with_invoice_description(mut self, description: String) -> Self {
        self.invoice_description = Some(description);
        self
    }

    /// Build mint
    pub async fn build(&self) -> anyhow::Result<Mint> {
        if self.ln.is_empty() {
            return Err(anyhow!("Ln backends not set"));
        }

        let mut mint = Mint::new(
            self.seed.as_ref().ok_or(anyhow!("Mint seed not set"))?,
            self.quote_ttl.unwrap_or_default(),
            self.melt_timeout.unwrap_or(DEFAULT_MELT_TIMEOUT),
            self.localstore
                .clone()
                .ok_or(anyhow!("Localstore not set"))?,
            self.ln.clone(),
            self.limits.clone(),
            self.supported_units.clone(),
        )
        .await?;

        mint.invoice_description = self.invoice_description.clone();

        Ok(mint)
    }
}

/// Mint Melt Limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MintMeltLimits {
    /// Min mint amount
    pub mint_min: Amount,
    /// Max mint amount
    pub mint_max: Amount,
    /// Min melt amount
    pub melt_min: Amount,
    /// Max melt amount
    pub melt_max: Amount,
}

impl Default for MintMeltLimits {
    fn default() -> Self {
        Self {
            mint_min: Amount::ONE,
            mint_max: Amount::from(u64::MAX),
            melt_min: Amount::ONE,
            melt_max: Amount::from(u64::MAX),
        }
    }
}

impl MintMeltLimits {
    /// Create new [`MintMeltLimits`] with the same range for minting and melting
    pub fn new(min: u64, max: u64) -> Self {
        Self {
            mint_min: min.into(),
            mint_max: max.into(),
            melt_min: min.into(),
            melt_max: max.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmk_database::MintMemoryDatabase;

    #[tokio::test]
    async fn build_requires_seed_and_backend() {
        let builder =
            MintBuilder::new().with_localstore(Arc::new(MintMemoryDatabase::default()));

        assert!(builder.build().await.is_err());
    }

    #[test]
    fn input_fee_applies_to_backend_unit() {
        let builder = MintBuilder::new().with_input_fee_ppk(CurrencyUnit::Sat, 100);

        assert_eq!(
            builder.supported_units.get(&CurrencyUnit::Sat),
            Some(&(100, DEFAULT_MAX_ORDER))
        );
    }
}
