//! Helpers shared by the mint integration tests

#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use cashu::dhke::construct_proofs;
use cmk::cmk_database::MintMemoryDatabase;
use cmk::mint::{MintBuilder, MintMeltLimits};
use cmk::nuts::{
    CurrencyUnit, Id, Keys, MintBolt11Request, MintQuoteBolt11Request, PaymentMethod,
    PreMintSecrets, Proofs, SwapRequest,
};
use cmk::types::FeeReserve;
use cmk::{Amount, Mint};
use cmk_fake_wallet::FakeWallet;
use uuid::Uuid;

/// A mint with a fake Lightning backend for `sat`
pub struct TestMint {
    pub mint: Mint,
    pub ln: Arc<FakeWallet>,
}

pub fn fee_reserve() -> FeeReserve {
    FeeReserve {
        min_fee_reserve: Amount::from(4),
        percent_fee_reserve: 0.02,
    }
}

pub async fn create_mint() -> Result<TestMint> {
    create_mint_with(|builder| builder).await
}

/// Build a test mint, letting the caller adjust the builder
pub async fn create_mint_with<F>(configure: F) -> Result<TestMint>
where
    F: FnOnce(MintBuilder) -> MintBuilder,
{
    let ln = Arc::new(FakeWallet::new(fee_reserve(), CurrencyUnit::Sat, None));
    let mnemonic = bip39::Mnemonic::generate(12)?;

    let builder = MintBuilder::new()
        .with_localstore(Arc::new(MintMemoryDatabase::default()))
        .with_seed(mnemonic.to_seed_normalized("").to_vec())
        .with_melt_timeout(Duration::from_secs(5))
        .add_ln_backend(
            CurrencyUnit::Sat,
            PaymentMethod::Bolt11,
            MintMeltLimits::default(),
            ln.clone(),
        );

    let mint = configure(builder).build().await?;

    Ok(TestMint { mint, ln })
}

impl TestMint {
    /// Active `sat` keyset and its public keys
    pub async fn active_keys(&self) -> Result<(Id, Keys)> {
        let keyset = self
            .mint
            .pubkeys()
            .await?
            .keysets
            .into_iter()
            .find(|k| k.unit == CurrencyUnit::Sat)
            .ok_or(anyhow!("No active sat keyset"))?;

        Ok((keyset.id, keyset.keys))
    }

    /// Create a mint quote and settle its invoice
    pub async fn paid_quote(&self, amount: u64) -> Result<Uuid> {
        let quote = self
            .mint
            .get_mint_bolt11_quote(MintQuoteBolt11Request {
                amount: Amount::from(amount),
                unit: CurrencyUnit::Sat,
            })
            .await?;

        let quote_id = Uuid::from_str(&quote.quote)?;
        self.settle(&quote_id).await?;

        Ok(quote_id)
    }

    /// Settle the invoice of a mint quote and deliver the settlement to the mint
    pub async fn settle(&self, quote_id: &Uuid) -> Result<()> {
        let lookup_id = self.request_lookup_id(quote_id).await?;

        self.ln.settle_invoice(&lookup_id).await?;
        self.mint.pay_mint_quote_for_request_id(&lookup_id).await?;

        Ok(())
    }

    pub async fn request_lookup_id(&self, quote_id: &Uuid) -> Result<String> {
        Ok(self
            .mint
            .localstore
            .get_mint_quote(quote_id)
            .await?
            .ok_or(anyhow!("Unknown quote"))?
            .request_lookup_id)
    }

    /// Issue proofs of the given denominations through a paid mint quote
    pub async fn mint_proofs(&self, amounts: &[u64]) -> Result<Proofs> {
        let total = amounts.iter().sum();
        let quote_id = self.paid_quote(total).await?;

        let (keyset_id, keys) = self.active_keys().await?;
        let amounts: Vec<Amount> = amounts.iter().copied().map(Amount::from).collect();
        let premint = PreMintSecrets::from_amounts(keyset_id, &amounts)?;

        let response = self
            .mint
            .process_mint_request(MintBolt11Request {
                quote: quote_id.to_string(),
                outputs: premint.blinded_messages(),
            })
            .await?;

        Ok(construct_proofs(
            response.signatures,
            premint.rs(),
            premint.secrets(),
            &keys,
        )?)
    }

    /// Swap `inputs` for fresh proofs of the given denominations
    pub async fn swap(&self, inputs: Proofs, amounts: &[u64]) -> Result<Proofs, cmk::Error> {
        let (keyset_id, keys) = self
            .active_keys()
            .await
            .map_err(|_| cmk::Error::Internal)?;
        let amounts: Vec<Amount> = amounts.iter().copied().map(Amount::from).collect();
        let premint = PreMintSecrets::from_amounts(keyset_id, &amounts)?;

        let response = self
            .mint
            .process_swap_request(SwapRequest {
                inputs,
                outputs: premint.blinded_messages(),
            })
            .await?;

        Ok(construct_proofs(
            response.signatures,
            premint.rs(),
            premint.secrets(),
            &keys,
        )?)
    }
}
