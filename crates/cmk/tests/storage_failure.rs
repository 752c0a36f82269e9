//! Swap behaviour when the store fails to mark inputs spent

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use cmk::cmk_database::{Error as DbError, MintDatabase, MintMemoryDatabase};
use cmk::mint::{MeltQuote, MintKeySetInfo, MintQuote};
use cmk::nuts::{
    BlindSignature, CheckStateRequest, CurrencyUnit, Id, MeltBolt11Request, MeltQuoteState,
    MintQuoteState, PreMintSecrets, Proof, Proofs, ProofsMethods, PublicKey, State, SwapRequest,
};
use cmk::types::LnKey;
use cmk::{Amount, Error};
use common::create_mint_with;
use uuid::Uuid;

/// Memory store whose spend of proofs can be switched to fail
#[derive(Default)]
struct FlakySpendDatabase {
    inner: MintMemoryDatabase,
    fail_spend: AtomicBool,
}

#[async_trait]
impl MintDatabase for FlakySpendDatabase {
    type Err = DbError;

    async fn set_active_keyset(&self, unit: CurrencyUnit, id: Id) -> Result<(), DbError> {
        self.inner.set_active_keyset(unit, id).await
    }
    async fn get_active_keyset_id(&self, unit: &CurrencyUnit) -> Result<Option<Id>, DbError> {
        self.inner.get_active_keyset_id(unit).await
    }
    async fn get_active_keysets(&self) -> Result<HashMap<CurrencyUnit, Id>, DbError> {
        self.inner.get_active_keysets().await
    }
    async fn add_mint_quote(&self, quote: MintQuote) -> Result<(), DbError> {
        self.inner.add_mint_quote(quote).await
    }
    async fn get_mint_quote(&self, quote_id: &Uuid) -> Result<Option<MintQuote>, DbError> {
        self.inner.get_mint_quote(quote_id).await
    }
    async fn update_mint_quote_state(
        &self,
        quote_id: &Uuid,
        state: MintQuoteState,
    ) -> Result<MintQuoteState, DbError> {
        self.inner.update_mint_quote_state(quote_id, state).await
    }
    async fn set_mint_quote_paid(
        &self,
        quote_id: &Uuid,
        paid_time: u64,
    ) -> Result<MintQuoteState, DbError> {
        self.inner.set_mint_quote_paid(quote_id, paid_time).await
    }
    async fn get_mint_quote_by_request(&self, request: &str) -> Result<Option<MintQuote>, DbError> {
        self.inner.get_mint_quote_by_request(request).await
    }
    async fn get_mint_quote_by_request_lookup_id(
        &self,
        request_lookup_id: &str,
    ) -> Result<Option<MintQuote>, DbError> {
        self.inner
            .get_mint_quote_by_request_lookup_id(request_lookup_id)
            .await
    }
    async fn get_mint_quotes(&self) -> Result<Vec<MintQuote>, DbError> {
        self.inner.get_mint_quotes().await
    }
    async fn remove_mint_quote(&self, quote_id: &Uuid) -> Result<(), DbError> {
        self.inner.remove_mint_quote(quote_id).await
    }
    async fn add_melt_quote(&self, quote: MeltQuote) -> Result<(), DbError> {
        self.inner.add_melt_quote(quote).await
    }
    async fn get_melt_quote(&self, quote_id: &Uuid) -> Result<Option<MeltQuote>, DbError> {
        self.inner.get_melt_quote(quote_id).await
    }
    async fn update_melt_quote_state(
        &self,
        quote_id: &Uuid,
        state: MeltQuoteState,
        payment_preimage: Option<String>,
    ) -> Result<MeltQuoteState, DbError> {
        self.inner
            .update_melt_quote_state(quote_id, state, payment_preimage)
            .await
    }
    async fn get_melt_quotes(&self) -> Result<Vec<MeltQuote>, DbError> {
        self.inner.get_melt_quotes().await
    }
    async fn remove_melt_quote(&self, quote_id: &Uuid) -> Result<(), DbError> {
        self.inner.remove_melt_quote(quote_id).await
    }
    async fn add_melt_request(
        &self,
        quote_id: &Uuid,
        melt_request: MeltBolt11Request,
        ln_key: LnKey,
    ) -> Result<(), DbError> {
        self.inner
            .add_melt_request(quote_id, melt_request, ln_key)
            .await
    }
    async fn get_melt_request(
        &self,
        quote_id: &Uuid,
    ) -> Result<Option<(MeltBolt11Request, LnKey)>, DbError> {
        self.inner.get_melt_request(quote_id).await
    }
    async fn add_keyset_info(&self, keyset: MintKeySetInfo) -> Result<(), DbError> {
        self.inner.add_keyset_info(keyset).await
    }
    async fn get_keyset_info(&self, id: &Id) -> Result<Option<MintKeySetInfo>, DbError> {
        self.inner.get_keyset_info(id).await
    }
    async fn get_keyset_infos(&self) -> Result<Vec<MintKeySetInfo>, DbError> {
        self.inner.get_keyset_infos().await
    }
    async fn add_proofs(&self, proofs: Proofs, quote_id: Option<Uuid>) -> Result<(), DbError> {
        self.inner.add_proofs(proofs, quote_id).await
    }
    async fn remove_proofs(&self, ys: &[PublicKey], quote_id: Option<Uuid>) -> Result<(), DbError> {
        self.inner.remove_proofs(ys, quote_id).await
    }
    async fn get_proofs_by_ys(&self, ys: &[PublicKey]) -> Result<Vec<Option<Proof>>, DbError> {
        self.inner.get_proofs_by_ys(ys).await
    }
    async fn get_proof_ys_by_quote_id(&self, quote_id: &Uuid) -> Result<Vec<PublicKey>, DbError> {
        self.inner.get_proof_ys_by_quote_id(quote_id).await
    }
    async fn get_proofs_states(&self, ys: &[PublicKey]) -> Result<Vec<Option<State>>, DbError> {
        self.inner.get_proofs_states(ys).await
    }
    async fn update_proofs_states(
        &self,
        ys: &[PublicKey],
        proofs_state: State,
    ) -> Result<Vec<Option<State>>, DbError> {
        if proofs_state == State::Spent && self.fail_spend.load(Ordering::SeqCst) {
            return Err(DbError::Database("disk full".into()));
        }

        self.inner.update_proofs_states(ys, proofs_state).await
    }
    async fn add_blind_signatures(
        &self,
        blinded_messages: &[PublicKey],
        blind_signatures: &[BlindSignature],
        quote_id: Option<Uuid>,
    ) -> Result<(), DbError> {
        self.inner
            .add_blind_signatures(blinded_messages, blind_signatures, quote_id)
            .await
    }
    async fn remove_blind_signatures(&self, blinded_messages: &[PublicKey]) -> Result<(), DbError> {
        self.inner.remove_blind_signatures(blinded_messages).await
    }
    async fn get_blind_signatures(
        &self,
        blinded_messages: &[PublicKey],
    ) -> Result<Vec<Option<BlindSignature>>, DbError> {
        self.inner.get_blind_signatures(blinded_messages).await
    }
    async fn get_blind_signatures_for_quote(
        &self,
        quote_id: &Uuid,
    ) -> Result<Vec<BlindSignature>, DbError> {
        self.inner.get_blind_signatures_for_quote(quote_id).await
    }
}

#[tokio::test]
async fn test_failed_spend_leaves_swap_retryable() -> Result<()> {
    let store = Arc::new(FlakySpendDatabase::default());
    let localstore: Arc<dyn MintDatabase<Err = DbError> + Send + Sync> = store.clone();
    let test_mint = create_mint_with(|builder| builder.with_localstore(localstore)).await?;

    let (keyset_id, _) = test_mint.active_keys().await?;
    let proofs = test_mint.mint_proofs(&[8, 4]).await?;
    let premint = PreMintSecrets::from_amounts(keyset_id, &[Amount::from(8), Amount::from(4)])?;
    let swap_request = SwapRequest {
        inputs: proofs.clone(),
        outputs: premint.blinded_messages(),
    };

    store.fail_spend.store(true, Ordering::SeqCst);

    let result = test_mint
        .mint
        .process_swap_request(swap_request.clone())
        .await;
    assert!(matches!(result, Err(Error::Database(_))));

    let states = test_mint
        .mint
        .check_state(&CheckStateRequest { ys: proofs.ys()? })
        .await?;
    assert!(states.states.iter().all(|s| s.state == State::Unspent));

    let blinded: Vec<PublicKey> = premint
        .blinded_messages()
        .iter()
        .map(|b| b.blinded_secret)
        .collect();
    assert_eq!(
        store.get_blind_signatures(&blinded).await?,
        vec![None, None]
    );

    store.fail_spend.store(false, Ordering::SeqCst);

    let response = test_mint.mint.process_swap_request(swap_request).await?;
    assert_eq!(response.signatures.len(), 2);

    Ok(())
}
