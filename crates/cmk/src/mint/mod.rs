//! Cashu Mint

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use cmk_common::common::{LnKey, QuoteTTL};
use cmk_common::database::{self, MintDatabase};
use cmk_common::lightning::{self, MintLightning};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::fees::calculate_fee;
use crate::nuts::*;
use crate::{Amount, Error};

mod builder;
mod check_spendable;
mod expiry;
mod issue;
mod keysets;
mod ln;
mod melt;
mod proof_writer;
mod start_up_check;
mod swap;
mod verification;

pub use builder::{MintBuilder, MintMeltLimits};
pub use cmk_common::mint::{MeltQuote, MintKeySetInfo, MintQuote};
pub use proof_writer::ProofWriter;
pub use verification::Verification;

/// Time a melt waits on the Lightning backend before leaving the quote pending
pub const DEFAULT_MELT_TIMEOUT: Duration = Duration::from_secs(60);

/// Lightning backend handle
pub type LnBackend = Arc<dyn MintLightning<Err = lightning::Error> + Send + Sync>;

/// Cashu Mint
#[derive(Clone)]
pub struct Mint {
    /// Mint Storage backend
    pub localstore: Arc<dyn MintDatabase<Err = database::Error> + Send + Sync>,
    /// Ln backends for mint
    pub ln: HashMap<LnKey, LnBackend>,
    limits: HashMap<LnKey, MintMeltLimits>,
    quote_ttl: QuoteTTL,
    melt_timeout: Duration,
    invoice_description: Option<String>,
    seed: Arc<[u8]>,
    /// Keysets regenerated from the seed. Rotation publishes a new map, readers never block.
    keysets: Arc<ArcSwap<HashMap<Id, MintKeySet>>>,
    rotation: Arc<Mutex<()>>,
}

impl std::fmt::Debug for Mint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mint")
            .field("ln", &self.ln.keys().collect::<Vec<_>>())
            .field("quote_ttl", &self.quote_ttl)
            .field("melt_timeout", &self.melt_timeout)
            .field("keysets", &self.keysets.load().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Mint {
    /// Create new [`Mint`]
    ///
    /// Regenerates every stored keyset from `seed` and makes sure each unit in
    /// `supported_units` (`unit -> (input_fee_ppk, max_order)`) has an active keyset with that
    /// configuration, rotating when it differs.
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        seed: &[u8],
        quote_ttl: QuoteTTL,
        melt_timeout: Duration,
        localstore: Arc<dyn MintDatabase<Err = database::Error> + Send + Sync>,
        ln: HashMap<LnKey, LnBackend>,
        limits: HashMap<LnKey, MintMeltLimits>,
        supported_units: HashMap<CurrencyUnit, (u64, u8)>,
    ) -> Result<Self, Error> {
        let mut keysets = HashMap::new();

        for keyset_info in localstore.get_keyset_infos().await? {
            let keyset =
                MintKeySet::generate(seed, &keyset_info.derivation_path, keyset_info.max_order)?;

            if keyset.id != keyset_info.id {
                tracing::error!(
                    "Keyset {} regenerated as {}, the mint seed does not match the database",
                    keyset_info.id,
                    keyset.id
                );
                return Err(Error::Internal);
            }

            keysets.insert(keyset.id, keyset);
        }

        let mint = Self {
            localstore,
            ln,
            limits,
            quote_ttl,
            melt_timeout,
            invoice_description: None,
            seed: Arc::from(seed),
            keysets: Arc::new(ArcSwap::from_pointee(keysets)),
            rotation: Arc::new(Mutex::new(())),
        };

        for (unit, (input_fee_ppk, max_order)) in supported_units {
            let active = match mint.localstore.get_active_keyset_id(&unit).await? {
                Some(id) => mint.localstore.get_keyset_info(&id).await?,
                None => None,
            };

            match active {
                Some(info) if info.input_fee_ppk == input_fee_ppk && info.max_order == max_order => {
                    tracing::debug!("Using active keyset {} for {}", info.id, unit);
                }
                _ => {
                    mint.rotate_next_keyset(unit, max_order, input_fee_ppk)
                        .await?;
                }
            }
        }

        Ok(mint)
    }

    /// Quote time to live
    pub fn quote_ttl(&self) -> QuoteTTL {
        self.quote_ttl
    }

    /// Wait for any invoice to be paid
    /// For each backend starts a task that waits for any invoice to be paid
    /// Once invoice is paid mint quote status is updated
    #[instrument(skip_all)]
    pub async fn wait_for_paid_invoices(&self, shutdown: CancellationToken) -> Result<(), Error> {
        let mint_arc = Arc::new(self.clone());

        let mut join_set = JoinSet::new();

        for (key, ln) in self.ln.iter() {
            let mint = Arc::clone(&mint_arc);
            let ln = Arc::clone(ln);
            let shutdown = shutdown.clone();
            let key = key.clone();

            join_set.spawn(async move {
                tracing::info!("Waiting for paid invoices on {} {}", key.unit, key.method);

                'outer: loop {
                    let mut stream = tokio::select! {
                        _ = shutdown.cancelled() => break 'outer,
                        result = ln.wait_any_invoice() => match result {
                            Ok(stream) => stream,
                            Err(err) => {
                                tracing::warn!("Could not get invoice stream for {}: {}", key.unit, err);
                                tokio::select! {
                                    _ = shutdown.cancelled() => break 'outer,
                                    _ = tokio::time::sleep(Duration::from_secs(5)) => continue 'outer,
                                }
                            }
                        },
                    };

                    loop {
                        tokio::select! {
                            _ = shutdown.cancelled() => break 'outer,
                            next = stream.next() => match next {
                                Some(request_lookup_id) => {
                                    if let Err(err) =
                                        mint.pay_mint_quote_for_request_id(&request_lookup_id).await
                                    {
                                        tracing::warn!(
                                            "Could not process payment for {}: {}",
                                            request_lookup_id,
                                            err
                                        );
                                    }
                                }
                                None => {
                                    tracing::warn!("Invoice stream for {} ended", key.unit);
                                    continue 'outer;
                                }
                            }
                        }
                    }
                }

                tracing::info!("Stopped waiting for paid invoices on {}", key.unit);
            });
        }

        while let Some(result) = join_set.join_next().await {
            if let Err(err) = result {
                tracing::warn!("Invoice task failed: {}", err);
            }
        }

        Ok(())
    }

    /// Fee required for proof set
    #[instrument(skip_all)]
    pub async fn get_proofs_fee(&self, proofs: &Proofs) -> Result<Amount, Error> {
        let proofs_per_keyset = proofs.count_by_keyset();

        let mut fee_per_keyset = HashMap::new();
        for keyset_id in proofs_per_keyset.keys() {
            let keyset_info = self
                .localstore
                .get_keyset_info(keyset_id)
                .await?
                .ok_or(Error::UnknownKeySet(*keyset_id))?;

            fee_per_keyset.insert(*keyset_id, keyset_info.input_fee_ppk);
        }

        calculate_fee(&proofs_per_keyset, &fee_per_keyset)
    }

    /// Blind Sign
    ///
    /// Signs with the key of the requested amount in the referenced keyset and attaches a DLEQ
    /// proof.
    #[instrument(skip_all)]
    pub async fn blind_sign(
        &self,
        blinded_message: &BlindedMessage,
    ) -> Result<BlindSignature, Error> {
        let BlindedMessage {
            amount,
            blinded_secret,
            keyset_id,
        } = blinded_message;

        let keyset = self.keyset_keys(keyset_id)?;

        let key_pair = keyset.keys.get(amount).ok_or(Error::AmountKey)?;

        let c = crate::dhke::sign_message(&key_pair.secret_key, blinded_secret)?;

        Ok(BlindSignature::new(
            *amount,
            c,
            keyset.id,
            blinded_secret,
            &key_pair.secret_key,
        )?)
    }

    /// Signatures issued for a quote, for clients repeating a mint or melt request
    #[instrument(skip(self))]
    pub async fn get_blind_signatures_for_quote(
        &self,
        quote_id: &uuid::Uuid,
    ) -> Result<Vec<BlindSignature>, Error> {
        Ok(self
            .localstore
            .get_blind_signatures_for_quote(quote_id)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use cmk_common::common::QuoteTTL;

    use super::*;
    use crate::cmk_database::MintMemoryDatabase;

    async fn create_mint(
        localstore: Arc<MintMemoryDatabase>,
        supported_units: HashMap<CurrencyUnit, (u64, u8)>,
    ) -> Result<Mint, Error> {
        Mint::new(
            &[7; 32],
            QuoteTTL::default(),
            DEFAULT_MELT_TIMEOUT,
            localstore,
            HashMap::new(),
            HashMap::new(),
            supported_units,
        )
        .await
    }

    #[tokio::test]
    async fn mint_mod_new_mint() {
        let mint = create_mint(Arc::new(MintMemoryDatabase::default()), HashMap::new())
            .await
            .unwrap();

        assert_eq!(mint.keysets().await.unwrap(), KeysetResponse { keysets: vec![] });
        assert!(mint.pubkeys().await.unwrap().keysets.is_empty());
    }

    #[tokio::test]
    async fn mint_mod_creates_active_keyset_per_unit() {
        let units = HashMap::from([
            (CurrencyUnit::Sat, (0, 32)),
            (CurrencyUnit::Usd, (100, 16)),
        ]);
        let mint = create_mint(Arc::new(MintMemoryDatabase::default()), units)
            .await
            .unwrap();

        let keysets = mint.keysets().await.unwrap().keysets;
        assert_eq!(keysets.len(), 2);
        assert!(keysets.iter().all(|k| k.active));

        let usd = keysets
            .iter()
            .find(|k| k.unit == CurrencyUnit::Usd)
            .unwrap();
        assert_eq!(usd.input_fee_ppk, 100);

        let keys = mint.keyset_pubkeys(&usd.id).await.unwrap();
        assert_eq!(keys.keysets[0].keys.keys().len(), 16);
    }

    #[tokio::test]
    async fn mint_mod_restart_regenerates_keysets() {
        let localstore = Arc::new(MintMemoryDatabase::default());
        let units = HashMap::from([(CurrencyUnit::Sat, (0, 32))]);

        let first = create_mint(Arc::clone(&localstore), units.clone())
            .await
            .unwrap();
        let before = first.pubkeys().await.unwrap();

        let second = create_mint(localstore, units).await.unwrap();

        assert_eq!(second.pubkeys().await.unwrap(), before);
        assert_eq!(second.keysets().await.unwrap().keysets.len(), 1);
    }

    #[tokio::test]
    async fn mint_mod_config_change_rotates() {
        let localstore = Arc::new(MintMemoryDatabase::default());

        let first = create_mint(
            Arc::clone(&localstore),
            HashMap::from([(CurrencyUnit::Sat, (0, 32))]),
        )
        .await
        .unwrap();
        let old_id = first.keysets().await.unwrap().keysets[0].id;

        let second = create_mint(localstore, HashMap::from([(CurrencyUnit::Sat, (1000, 32))]))
            .await
            .unwrap();

        let keysets = second.keysets().await.unwrap().keysets;
        assert_eq!(keysets.len(), 2);

        let old = keysets.iter().find(|k| k.id == old_id).unwrap();
        assert!(!old.active);

        let new = keysets.iter().find(|k| k.id != old_id).unwrap();
        assert!(new.active);
        assert_eq!(new.input_fee_ppk, 1000);
    }

    #[tokio::test]
    async fn mint_mod_wrong_seed_is_rejected() {
        let localstore = Arc::new(MintMemoryDatabase::default());
        create_mint(
            Arc::clone(&localstore),
            HashMap::from([(CurrencyUnit::Sat, (0, 32))]),
        )
        .await
        .unwrap();

        let result = Mint::new(
            &[8; 32],
            QuoteTTL::default(),
            DEFAULT_MELT_TIMEOUT,
            localstore,
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
        )
        .await;

        assert!(matches!(result, Err(Error::Internal)));
    }

    #[tokio::test]
    async fn mint_mod_unknown_keyset_fee() {
        let mint = create_mint(Arc::new(MintMemoryDatabase::default()), HashMap::new())
            .await
            .unwrap();

        let proof = Proof::new(
            Amount::from(1),
            Id::from_str("001711afb1de20cb").unwrap(),
            crate::secret::Secret::generate(),
            SecretKey::generate().public_key(),
        );

        assert!(matches!(
            mint.get_proofs_fee(&vec![proof]).await,
            Err(Error::UnknownKeySet(_))
        ));
    }
}
