//! Mint in memory database

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cmk_common::common::LnKey;
use cmk_common::mint::{self, MintKeySetInfo, MintQuote};
use cmk_common::state::{
    check_melt_quote_state_transition, check_mint_quote_state_transition, check_state_transition,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Error, MintDatabase};
use crate::dhke::hash_to_curve;
use crate::nuts::{
    BlindSignature, CurrencyUnit, Id, MeltBolt11Request, MeltQuoteState, MintQuoteState, Proof,
    Proofs, PublicKey, State,
};

/// Mint Memory Database
///
/// Every write takes the write lock of the map it touches, so the transition checks and the write
/// are one critical section.
#[derive(Debug, Clone, Default)]
#[allow(clippy::type_complexity)]
pub struct MintMemoryDatabase {
    active_keysets: Arc<RwLock<HashMap<CurrencyUnit, Id>>>,
    keysets: Arc<RwLock<HashMap<Id, MintKeySetInfo>>>,
    mint_quotes: Arc<RwLock<HashMap<Uuid, MintQuote>>>,
    melt_quotes: Arc<RwLock<HashMap<Uuid, mint::MeltQuote>>>,
    proofs: Arc<RwLock<HashMap<[u8; 33], (Proof, State)>>>,
    quote_proofs: Arc<RwLock<HashMap<Uuid, Vec<PublicKey>>>>,
    blinded_signatures: Arc<RwLock<HashMap<[u8; 33], BlindSignature>>>,
    quote_signatures: Arc<RwLock<HashMap<Uuid, Vec<BlindSignature>>>>,
    melt_requests: Arc<RwLock<HashMap<Uuid, (MeltBolt11Request, LnKey)>>>,
}

impl MintMemoryDatabase {
    /// Create new [`MintMemoryDatabase`] holding existing records
    pub fn new(
        active_keysets: HashMap<CurrencyUnit, Id>,
        keysets: Vec<MintKeySetInfo>,
        mint_quotes: Vec<MintQuote>,
        melt_quotes: Vec<mint::MeltQuote>,
        pending_proofs: Proofs,
        spent_proofs: Proofs,
    ) -> Result<Self, Error> {
        let mut proofs = HashMap::new();

        for proof in pending_proofs {
            let y = hash_to_curve(proof.secret.as_bytes())?.to_bytes();
            proofs.insert(y, (proof, State::Pending));
        }

        for proof in spent_proofs {
            let y = hash_to_curve(proof.secret.as_bytes())?.to_bytes();
            proofs.insert(y, (proof, State::Spent));
        }

        Ok(Self {
            active_keysets: Arc::new(RwLock::new(active_keysets)),
            keysets: Arc::new(RwLock::new(
                keysets.into_iter().map(|k| (k.id, k)).collect(),
            )),
            mint_quotes: Arc::new(RwLock::new(
                mint_quotes.into_iter().map(|q| (q.id, q)).collect(),
            )),
            melt_quotes: Arc::new(RwLock::new(
                melt_quotes.into_iter().map(|q| (q.id, q)).collect(),
            )),
            proofs: Arc::new(RwLock::new(proofs)),
            ..Default::default()
        })
    }
}

#[async_trait]
impl MintDatabase for MintMemoryDatabase {
    type Err = Error;

    async fn set_active_keyset(&self, unit: CurrencyUnit, id: Id) -> Result<(), Self::Err> {
        self.active_keysets.write().await.insert(unit, id);
        Ok(())
    }

    async fn get_active_keyset_id(&self, unit: &CurrencyUnit) -> Result<Option<Id>, Self::Err> {
        Ok(self.active_keysets.read().await.get(unit).cloned())
    }

    async fn get_active_keysets(&self) -> Result<HashMap<CurrencyUnit, Id>, Self::Err> {
        Ok(self.active_keysets.read().await.clone())
    }

    async fn add_mint_quote(&self, quote: MintQuote) -> Result<(), Self::Err> {
        let mut mint_quotes = self.mint_quotes.write().await;

        if mint_quotes.contains_key(&quote.id)
            || mint_quotes
                .values()
                .any(|q| q.request_lookup_id == quote.request_lookup_id)
        {
            return Err(Error::Duplicate);
        }

        mint_quotes.insert(quote.id, quote);
        Ok(())
    }

    async fn get_mint_quote(&self, quote_id: &Uuid) -> Result<Option<MintQuote>, Self::Err> {
        Ok(self.mint_quotes.read().await.get(quote_id).cloned())
    }

    async fn update_mint_quote_state(
        &self,
        quote_id: &Uuid,
        state: MintQuoteState,
    ) -> Result<MintQuoteState, Self::Err> {
        let mut mint_quotes = self.mint_quotes.write().await;

        let quote = mint_quotes.get_mut(quote_id).ok_or(Error::UnknownQuote)?;

        let current_state = quote.state;
        check_mint_quote_state_transition(current_state, state)?;
        quote.state = state;

        Ok(current_state)
    }

    async fn set_mint_quote_paid(
        &self,
        quote_id: &Uuid,
        paid_time: u64,
    ) -> Result<MintQuoteState, Self::Err> {
        let mut mint_quotes = self.mint_quotes.write().await;

        let quote = mint_quotes.get_mut(quote_id).ok_or(Error::UnknownQuote)?;

        let current_state = quote.state;
        match current_state {
            MintQuoteState::Unpaid | MintQuoteState::Expired => {
                check_mint_quote_state_transition(current_state, MintQuoteState::Paid)?;
                quote.state = MintQuoteState::Paid;
                quote.paid_time = Some(paid_time);
            }
            _ => (),
        }

        Ok(current_state)
    }

    async fn get_mint_quote_by_request(
        &self,
        request: &str,
    ) -> Result<Option<MintQuote>, Self::Err> {
        Ok(self
            .mint_quotes
            .read()
            .await
            .values()
            .find(|q| q.request == request)
            .cloned())
    }

    async fn get_mint_quote_by_request_lookup_id(
        &self,
        request_lookup_id: &str,
    ) -> Result<Option<MintQuote>, Self::Err> {
        Ok(self
            .mint_quotes
            .read()
            .await
            .values()
            .find(|q| q.request_lookup_id == request_lookup_id)
            .cloned())
    }

    async fn get_mint_quotes(&self) -> Result<Vec<MintQuote>, Self::Err> {
        Ok(self.mint_quotes.read().await.values().cloned().collect())
    }

    async fn remove_mint_quote(&self, quote_id: &Uuid) -> Result<(), Self::Err> {
        self.mint_quotes.write().await.remove(quote_id);

        Ok(())
    }

    async fn add_melt_quote(&self, quote: mint::MeltQuote) -> Result<(), Self::Err> {
        let mut melt_quotes = self.melt_quotes.write().await;

        if melt_quotes.contains_key(&quote.id) {
            return Err(Error::Duplicate);
        }

        melt_quotes.insert(quote.id, quote);
        Ok(())
    }

    async fn get_melt_quote(&self, quote_id: &Uuid) -> Result<Option<mint::MeltQuote>, Self::Err> {
        Ok(self.melt_quotes.read().await.get(quote_id).cloned())
    }

    async fn update_melt_quote_state(
        &self,
        quote_id: &Uuid,
        state: MeltQuoteState,
        payment_preimage: Option<String>,
    ) -> Result<MeltQuoteState, Self::Err> {
        let mut melt_quotes = self.melt_quotes.write().await;

        let quote = melt_quotes.get_mut(quote_id).ok_or(Error::UnknownQuote)?;

        let current_state = quote.state;
        check_melt_quote_state_transition(current_state, state)?;

        quote.state = state;
        if payment_preimage.is_some() {
            quote.payment_preimage = payment_preimage;
        }
        if state == MeltQuoteState::Paid {
            quote.paid_time = Some(crate::util::unix_time());
        }

        Ok(current_state)
    }

    async fn get_melt_quotes(&self) -> Result<Vec<mint::MeltQuote>, Self::Err> {
        Ok(self.melt_quotes.read().await.values().cloned().collect())
    }

    async fn remove_melt_quote(&self, quote_id: &Uuid) -> Result<(), Self::Err> {
        self.melt_quotes.write().await.remove(quote_id);

        Ok(())
    }

    async fn add_melt_request(
        &self,
        quote_id: &Uuid,
        melt_request: MeltBolt11Request,
        ln_key: LnKey,
    ) -> Result<(), Self::Err> {
        self.melt_requests
            .write()
            .await
            .insert(*quote_id, (melt_request, ln_key));
        Ok(())
    }

    async fn get_melt_request(
        &self,
        quote_id: &Uuid,
    ) -> Result<Option<(MeltBolt11Request, LnKey)>, Self::Err> {
        Ok(self.melt_requests.read().await.get(quote_id).cloned())
    }

    async fn add_keyset_info(&self, keyset: MintKeySetInfo) -> Result<(), Self::Err> {
        self.keysets.write().await.insert(keyset.id, keyset);
        Ok(())
    }

    async fn get_keyset_info(&self, keyset_id: &Id) -> Result<Option<MintKeySetInfo>, Self::Err> {
        Ok(self.keysets.read().await.get(keyset_id).cloned())
    }

    async fn get_keyset_infos(&self) -> Result<Vec<MintKeySetInfo>, Self::Err> {
        Ok(self.keysets.read().await.values().cloned().collect())
    }

    async fn add_proofs(&self, proofs: Proofs, quote_id: Option<Uuid>) -> Result<(), Self::Err> {
        let mut db_proofs = self.proofs.write().await;

        let mut ys = Vec::with_capacity(proofs.len());
        for proof in &proofs {
            let y = hash_to_curve(proof.secret.as_bytes())?;
            if db_proofs.contains_key(&y.to_bytes()) || ys.contains(&y) {
                return Err(Error::Duplicate);
            }
            ys.push(y);
        }

        for (y, proof) in ys.iter().zip(proofs) {
            db_proofs.insert(y.to_bytes(), (proof, State::Pending));
        }

        if let Some(quote_id) = quote_id {
            self.quote_proofs.write().await.insert(quote_id, ys);
        }

        Ok(())
    }

    async fn remove_proofs(
        &self,
        ys: &[PublicKey],
        quote_id: Option<Uuid>,
    ) -> Result<(), Self::Err> {
        let mut db_proofs = self.proofs.write().await;

        if ys.iter().any(|y| {
            db_proofs
                .get(&y.to_bytes())
                .is_some_and(|(_, state)| *state == State::Spent)
        }) {
            return Err(Error::AttemptRemoveSpentProof);
        }

        for y in ys {
            db_proofs.remove(&y.to_bytes());
        }

        if let Some(quote_id) = quote_id {
            self.quote_proofs.write().await.remove(&quote_id);
        }

        Ok(())
    }

    async fn get_proofs_by_ys(&self, ys: &[PublicKey]) -> Result<Vec<Option<Proof>>, Self::Err> {
        let db_proofs = self.proofs.read().await;

        Ok(ys
            .iter()
            .map(|y| db_proofs.get(&y.to_bytes()).map(|(proof, _)| proof.clone()))
            .collect())
    }

    async fn get_proof_ys_by_quote_id(&self, quote_id: &Uuid) -> Result<Vec<PublicKey>, Self::Err> {
        Ok(self
            .quote_proofs
            .read()
            .await
            .get(quote_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_proofs_states(&self, ys: &[PublicKey]) -> Result<Vec<Option<State>>, Self::Err> {
        let db_proofs = self.proofs.read().await;

        Ok(ys
            .iter()
            .map(|y| db_proofs.get(&y.to_bytes()).map(|(_, state)| *state))
            .collect())
    }

    async fn update_proofs_states(
        &self,
        ys: &[PublicKey],
        proofs_state: State,
    ) -> Result<Vec<Option<State>>, Self::Err> {
        let mut db_proofs = self.proofs.write().await;

        let mut states = Vec::with_capacity(ys.len());
        for y in ys {
            let current = db_proofs
                .get(&y.to_bytes())
                .map(|(_, state)| *state)
                .ok_or(Error::ProofNotFound)?;
            check_state_transition(current, proofs_state)?;
            states.push(Some(current));
        }

        for y in ys {
            if let Some((_, state)) = db_proofs.get_mut(&y.to_bytes()) {
                *state = proofs_state;
            }
        }

        Ok(states)
    }

    async fn add_blind_signatures(
        &self,
        blinded_messages: &[PublicKey],
        blind_signatures: &[BlindSignature],
        quote_id: Option<Uuid>,
    ) -> Result<(), Self::Err> {
        let mut current_blinded_signatures = self.blinded_signatures.write().await;

        if blinded_messages
            .iter()
            .any(|b| current_blinded_signatures.contains_key(&b.to_bytes()))
        {
            return Err(Error::Duplicate);
        }

        for (blinded_message, blind_signature) in blinded_messages.iter().zip(blind_signatures) {
            current_blinded_signatures.insert(blinded_message.to_bytes(), blind_signature.clone());
        }

        if let Some(quote_id) = quote_id {
            self.quote_signatures
                .write()
                .await
                .entry(quote_id)
                .or_default()
                .extend_from_slice(blind_signatures);
        }

        Ok(())
    }

    async fn remove_blind_signatures(
        &self,
        blinded_messages: &[PublicKey],
    ) -> Result<(), Self::Err> {
        let mut current_blinded_signatures = self.blinded_signatures.write().await;

        for blinded_message in blinded_messages {
            current_blinded_signatures.remove(&blinded_message.to_bytes());
        }

        Ok(())
    }

    async fn get_blind_signatures(
        &self,
        blinded_messages: &[PublicKey],
    ) -> Result<Vec<Option<BlindSignature>>, Self::Err> {
        let blinded_signatures = self.blinded_signatures.read().await;

        Ok(blinded_messages
            .iter()
            .map(|b| blinded_signatures.get(&b.to_bytes()).cloned())
            .collect())
    }

    async fn get_blind_signatures_for_quote(
        &self,
        quote_id: &Uuid,
    ) -> Result<Vec<BlindSignature>, Self::Err> {
        Ok(self
            .quote_signatures
            .read()
            .await
            .get(quote_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use cmk_common::state;

    use super::*;
    use crate::nuts::SecretKey;
    use crate::secret::Secret;
    use crate::Amount;

    fn proof(keyset_id: Id) -> Proof {
        Proof::new(
            Amount::from(8),
            keyset_id,
            Secret::generate(),
            SecretKey::generate().public_key(),
        )
    }

    fn keyset_id() -> Id {
        Id::from_bytes(&[0, 1, 2, 3, 4, 5, 6, 7]).unwrap()
    }

    #[tokio::test]
    async fn add_proofs_is_all_or_nothing() {
        let db = MintMemoryDatabase::default();
        let first = proof(keyset_id());
        let second = proof(keyset_id());

        db.add_proofs(vec![first.clone()], None).await.unwrap();

        let result = db.add_proofs(vec![second.clone(), first.clone()], None).await;
        assert!(matches!(result, Err(Error::Duplicate)));

        let ys = [first.y().unwrap(), second.y().unwrap()];
        let states = db.get_proofs_states(&ys).await.unwrap();
        assert_eq!(states, vec![Some(State::Pending), None]);
    }

    #[tokio::test]
    async fn spent_proofs_cannot_move_or_be_removed() {
        let db = MintMemoryDatabase::default();
        let proof = proof(keyset_id());
        let y = proof.y().unwrap();

        db.add_proofs(vec![proof], None).await.unwrap();
        let previous = db.update_proofs_states(&[y], State::Spent).await.unwrap();
        assert_eq!(previous, vec![Some(State::Pending)]);

        assert!(matches!(
            db.update_proofs_states(&[y], State::Pending).await,
            Err(Error::AttemptUpdateSpentProof)
        ));
        assert!(matches!(
            db.remove_proofs(&[y], None).await,
            Err(Error::AttemptRemoveSpentProof)
        ));
    }

    #[tokio::test]
    async fn mint_quote_transitions_are_checked() {
        let db = MintMemoryDatabase::default();
        let quote = MintQuote::new(
            "lnbc".to_string(),
            CurrencyUnit::Sat,
            Amount::from(100),
            u64::MAX,
            "hash".to_string(),
        );
        db.add_mint_quote(quote.clone()).await.unwrap();

        let result = db
            .update_mint_quote_state(&quote.id, MintQuoteState::Pending)
            .await;
        assert!(matches!(
            result,
            Err(Error::InvalidStateTransition(state::Error::QuoteUnpaid))
        ));

        assert_eq!(
            db.set_mint_quote_paid(&quote.id, 10).await.unwrap(),
            MintQuoteState::Unpaid
        );
        // a repeated settlement leaves the quote alone
        assert_eq!(
            db.set_mint_quote_paid(&quote.id, 20).await.unwrap(),
            MintQuoteState::Paid
        );

        db.update_mint_quote_state(&quote.id, MintQuoteState::Pending)
            .await
            .unwrap();
        assert_eq!(
            db.set_mint_quote_paid(&quote.id, 30).await.unwrap(),
            MintQuoteState::Pending
        );

        let stored = db.get_mint_quote(&quote.id).await.unwrap().unwrap();
        assert_eq!(stored.state, MintQuoteState::Pending);
        assert_eq!(stored.paid_time, Some(10));
    }

    #[tokio::test]
    async fn duplicate_lookup_id_is_rejected() {
        let db = MintMemoryDatabase::default();
        let quote = |lookup: &str| {
            MintQuote::new(
                "lnbc".to_string(),
                CurrencyUnit::Sat,
                Amount::from(1),
                0,
                lookup.to_string(),
            )
        };

        db.add_mint_quote(quote("a")).await.unwrap();
        assert!(matches!(
            db.add_mint_quote(quote("a")).await,
            Err(Error::Duplicate)
        ));
    }

    #[tokio::test]
    async fn expired_quote_cannot_be_paid() {
        let db = MintMemoryDatabase::default();
        let quote = MintQuote::new(
            "lnbc".to_string(),
            CurrencyUnit::Sat,
            Amount::from(1),
            0,
            "hash".to_string(),
        );
        db.add_mint_quote(quote.clone()).await.unwrap();
        db.update_mint_quote_state(&quote.id, MintQuoteState::Expired)
            .await
            .unwrap();

        assert!(matches!(
            db.set_mint_quote_paid(&quote.id, 1).await,
            Err(Error::InvalidStateTransition(state::Error::QuoteExpired))
        ));
    }
}
