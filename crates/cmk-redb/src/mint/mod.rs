//! Redb Storage for the CMK mint

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use cmk_common::common::LnKey;
use cmk_common::database::{self, MintDatabase};
use cmk_common::dhke::hash_to_curve;
use cmk_common::mint::{self, MintKeySetInfo, MintQuote};
use cmk_common::nuts::{
    BlindSignature, CurrencyUnit, Id, MeltBolt11Request, MeltQuoteState, MintQuoteState, Proof,
    Proofs, PublicKey, State,
};
use cmk_common::state::{
    check_melt_quote_state_transition, check_mint_quote_state_transition, check_state_transition,
};
use cmk_common::util::unix_time;
use redb::{
    Database, MultimapTableDefinition, ReadableMultimapTable, ReadableTable, TableDefinition,
};
use uuid::Uuid;

use super::error::Error;

const ACTIVE_KEYSETS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("active_keysets");
const KEYSETS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("keysets");
const MINT_QUOTES_TABLE: TableDefinition<[u8; 16], &str> = TableDefinition::new("mint_quotes");
const MELT_QUOTES_TABLE: TableDefinition<[u8; 16], &str> = TableDefinition::new("melt_quotes");
const PROOFS_TABLE: TableDefinition<[u8; 33], &str> = TableDefinition::new("proofs");
const PROOFS_STATE_TABLE: TableDefinition<[u8; 33], &str> = TableDefinition::new("proofs_state");
const CONFIG_TABLE: TableDefinition<&str, &str> = TableDefinition::new("config");
// Key is blinded_message B_ value is blinded_signature
const BLINDED_SIGNATURES: TableDefinition<[u8; 33], &str> =
    TableDefinition::new("blinded_signatures");
const QUOTE_PROOFS_TABLE: MultimapTableDefinition<[u8; 16], [u8; 33]> =
    MultimapTableDefinition::new("quote_proofs");
// Signatures of a quote in the order they were issued
const QUOTE_SIGNATURES_TABLE: TableDefinition<[u8; 16], &str> =
    TableDefinition::new("quote_signatures");

const MELT_REQUESTS: TableDefinition<[u8; 16], (&str, &str)> =
    TableDefinition::new("melt_requests");

const DATABASE_VERSION: u32 = 1;

/// Mint Redbdatabase
#[derive(Debug, Clone)]
pub struct MintRedbDatabase {
    db: Arc<Database>,
}

impl MintRedbDatabase {
    /// Create new [`MintRedbDatabase`]
    ///
    /// Opens the database at `path`, creating it if it does not exist.
    pub fn new(path: &Path) -> Result<Self, Error> {
        let db = Database::create(path)?;

        let db_version = {
            let read_txn = db.begin_read()?;

            match read_txn.open_table(CONFIG_TABLE) {
                Ok(table) => table.get("db_version")?.map(|v| v.value().to_owned()),
                Err(_) => None,
            }
        };

        match db_version {
            Some(db_version) => {
                let current_file_version = u32::from_str(&db_version)?;

                if current_file_version != DATABASE_VERSION {
                    tracing::warn!(
                        "Database is at version {} but {} is required",
                        current_file_version,
                        DATABASE_VERSION
                    );
                    return Err(Error::UnknownDatabaseVersion);
                }

                tracing::info!("Database is at current version {}", DATABASE_VERSION);
            }
            None => {
                let write_txn = db.begin_write()?;
                {
                    let mut table = write_txn.open_table(CONFIG_TABLE)?;
                    // Open all tables to init a new db
                    let _ = write_txn.open_table(ACTIVE_KEYSETS_TABLE)?;
                    let _ = write_txn.open_table(KEYSETS_TABLE)?;
                    let _ = write_txn.open_table(MINT_QUOTES_TABLE)?;
                    let _ = write_txn.open_table(MELT_QUOTES_TABLE)?;
                    let _ = write_txn.open_table(PROOFS_TABLE)?;
                    let _ = write_txn.open_table(PROOFS_STATE_TABLE)?;
                    let _ = write_txn.open_table(BLINDED_SIGNATURES)?;
                    let _ = write_txn.open_multimap_table(QUOTE_PROOFS_TABLE)?;
                    let _ = write_txn.open_table(QUOTE_SIGNATURES_TABLE)?;
                    let _ = write_txn.open_table(MELT_REQUESTS)?;

                    table.insert("db_version", DATABASE_VERSION.to_string().as_str())?;
                }

                write_txn.commit()?;

                tracing::info!("Created database at version {}", DATABASE_VERSION);
            }
        }

        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl MintDatabase for MintRedbDatabase {
    type Err = database::Error;

    async fn set_active_keyset(&self, unit: CurrencyUnit, id: Id) -> Result<(), Self::Err> {
        let write_txn = self.db.begin_write().map_err(Error::from)?;

        {
            let mut table = write_txn
                .open_table(ACTIVE_KEYSETS_TABLE)
                .map_err(Error::from)?;
            table
                .insert(unit.to_string().as_str(), id.to_string().as_str())
                .map_err(Error::from)?;
        }
        write_txn.commit().map_err(Error::from)?;

        Ok(())
    }

    async fn get_active_keyset_id(&self, unit: &CurrencyUnit) -> Result<Option<Id>, Self::Err> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn
            .open_table(ACTIVE_KEYSETS_TABLE)
            .map_err(Error::from)?;

        if let Some(id) = table.get(unit.to_string().as_str()).map_err(Error::from)? {
            return Ok(Some(Id::from_str(id.value()).map_err(Error::from)?));
        }

        Ok(None)
    }

    async fn get_active_keysets(&self) -> Result<HashMap<CurrencyUnit, Id>, Self::Err> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn
            .open_table(ACTIVE_KEYSETS_TABLE)
            .map_err(Error::from)?;

        let mut active_keysets = HashMap::new();

        for (unit, id) in (table.iter().map_err(Error::from)?).flatten() {
            let unit = CurrencyUnit::from_str(unit.value())?;
            let id = Id::from_str(id.value()).map_err(Error::from)?;

            active_keysets.insert(unit, id);
        }

        Ok(active_keysets)
    }

    async fn add_mint_quote(&self, quote: MintQuote) -> Result<(), Self::Err> {
        let write_txn = self.db.begin_write().map_err(Error::from)?;

        {
            let mut table = write_txn
                .open_table(MINT_QUOTES_TABLE)
                .map_err(Error::from)?;

            if table
                .get(quote.id.as_bytes())
                .map_err(Error::from)?
                .is_some()
            {
                return Err(database::Error::Duplicate);
            }

            for (_id, stored) in (table.iter().map_err(Error::from)?).flatten() {
                let stored: MintQuote =
                    serde_json::from_str(stored.value()).map_err(Error::from)?;

                if stored.request_lookup_id == quote.request_lookup_id {
                    return Err(database::Error::Duplicate);
                }
            }

            table
                .insert(
                    quote.id.as_bytes(),
                    serde_json::to_string(&quote).map_err(Error::from)?.as_str(),
                )
                .map_err(Error::from)?;
        }
        write_txn.commit().map_err(Error::from)?;

        Ok(())
    }

    async fn get_mint_quote(&self, quote_id: &Uuid) -> Result<Option<MintQuote>, Self::Err> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn
            .open_table(MINT_QUOTES_TABLE)
            .map_err(Error::from)?;

        match table.get(quote_id.as_bytes()).map_err(Error::from)? {
            Some(quote) => Ok(serde_json::from_str(quote.value()).map_err(Error::from)?),
            None => Ok(None),
        }
    }

    async fn update_mint_quote_state(
        &self,
        quote_id: &Uuid,
        state: MintQuoteState,
    ) -> Result<MintQuoteState, Self::Err> {
        let write_txn = self.db.begin_write().map_err(Error::from)?;

        let current_state;
        {
            let mut table = write_txn
                .open_table(MINT_QUOTES_TABLE)
                .map_err(Error::from)?;

            let mut mint_quote: MintQuote = match table
                .get(quote_id.as_bytes())
                .map_err(Error::from)?
            {
                Some(quote) => serde_json::from_str(quote.value()).map_err(Error::from)?,
                None => return Err(database::Error::UnknownQuote),
            };

            current_state = mint_quote.state;
            check_mint_quote_state_transition(current_state, state)?;
            mint_quote.state = state;

            table
                .insert(
                    quote_id.as_bytes(),
                    serde_json::to_string(&mint_quote)
                        .map_err(Error::from)?
                        .as_str(),
                )
                .map_err(Error::from)?;
        }
        write_txn.commit().map_err(Error::from)?;

        Ok(current_state)
    }

    async fn set_mint_quote_paid(
        &self,
        quote_id: &Uuid,
        paid_time: u64,
    ) -> Result<MintQuoteState, Self::Err> {
        let write_txn = self.db.begin_write().map_err(Error::from)?;

        let current_state;
        {
            let mut table = write_txn
                .open_table(MINT_QUOTES_TABLE)
                .map_err(Error::from)?;

            let mut mint_quote: MintQuote = match table
                .get(quote_id.as_bytes())
                .map_err(Error::from)?
            {
                Some(quote) => serde_json::from_str(quote.value()).map_err(Error::from)?,
                None => return Err(database::Error::UnknownQuote),
            };

            current_state = mint_quote.state;

            if matches!(
                current_state,
                MintQuoteState::Unpaid | MintQuoteState::Expired
            ) {
                check_mint_quote_state_transition(current_state, MintQuoteState::Paid)?;
                mint_quote.state = MintQuoteState::Paid;
                mint_quote.paid_time = Some(paid_time);

                table
                    .insert(
                        quote_id.as_bytes(),
                        serde_json::to_string(&mint_quote)
                            .map_err(Error::from)?
                            .as_str(),
                    )
                    .map_err(Error::from)?;
            }
        }
        write_txn.commit().map_err(Error::from)?;

        Ok(current_state)
    }

    async fn get_mint_quote_by_request(
        &self,
        request: &str,
    ) -> Result<Option<MintQuote>, Self::Err> {
        let quotes = self.get_mint_quotes().await?;

        Ok(quotes.into_iter().find(|q| q.request.eq(request)))
    }

    async fn get_mint_quote_by_request_lookup_id(
        &self,
        request_lookup_id: &str,
    ) -> Result<Option<MintQuote>, Self::Err> {
        let quotes = self.get_mint_quotes().await?;

        Ok(quotes
            .into_iter()
            .find(|q| q.request_lookup_id.eq(request_lookup_id)))
    }

    async fn get_mint_quotes(&self) -> Result<Vec<MintQuote>, Self::Err> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn
            .open_table(MINT_QUOTES_TABLE)
            .map_err(Error::from)?;

        let mut quotes = Vec::new();

        for (_id, quote) in (table.iter().map_err(Error::from)?).flatten() {
            let quote = serde_json::from_str(quote.value()).map_err(Error::from)?;

            quotes.push(quote)
        }

        Ok(quotes)
    }

    async fn remove_mint_quote(&self, quote_id: &Uuid) -> Result<(), Self::Err> {
        let write_txn = self.db.begin_write().map_err(Error::from)?;

        {
            let mut table = write_txn
                .open_table(MINT_QUOTES_TABLE)
                .map_err(Error::from)?;
            table.remove(quote_id.as_bytes()).map_err(Error::from)?;
        }
        write_txn.commit().map_err(Error::from)?;

        Ok(())
    }

    async fn add_melt_quote(&self, quote: mint::MeltQuote) -> Result<(), Self::Err> {
        let write_txn = self.db.begin_write().map_err(Error::from)?;

        {
            let mut table = write_txn
                .open_table(MELT_QUOTES_TABLE)
                .map_err(Error::from)?;

            if table
                .get(quote.id.as_bytes())
                .map_err(Error::from)?
                .is_some()
            {
                return Err(database::Error::Duplicate);
            }

            table
                .insert(
                    quote.id.as_bytes(),
                    serde_json::to_string(&quote).map_err(Error::from)?.as_str(),
                )
                .map_err(Error::from)?;
        }
        write_txn.commit().map_err(Error::from)?;

        Ok(())
    }

    async fn get_melt_quote(&self, quote_id: &Uuid) -> Result<Option<mint::MeltQuote>, Self::Err> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn
            .open_table(MELT_QUOTES_TABLE)
            .map_err(Error::from)?;

        match table.get(quote_id.as_bytes()).map_err(Error::from)? {
            Some(quote) => Ok(serde_json::from_str(quote.value()).map_err(Error::from)?),
            None => Ok(None),
        }
    }

    async fn update_melt_quote_state(
        &self,
        quote_id: &Uuid,
        state: MeltQuoteState,
        payment_preimage: Option<String>,
    ) -> Result<MeltQuoteState, Self::Err> {
        let write_txn = self.db.begin_write().map_err(Error::from)?;

        let current_state;
        {
            let mut table = write_txn
                .open_table(MELT_QUOTES_TABLE)
                .map_err(Error::from)?;

            let mut melt_quote: mint::MeltQuote = match table
                .get(quote_id.as_bytes())
                .map_err(Error::from)?
            {
                Some(quote) => serde_json::from_str(quote.value()).map_err(Error::from)?,
                None => return Err(database::Error::UnknownQuote),
            };

            current_state = melt_quote.state;
            check_melt_quote_state_transition(current_state, state)?;

            melt_quote.state = state;
            if payment_preimage.is_some() {
                melt_quote.payment_preimage = payment_preimage;
            }
            if state == MeltQuoteState::Paid {
                melt_quote.paid_time = Some(unix_time());
            }

            table
                .insert(
                    quote_id.as_bytes(),
                    serde_json::to_string(&melt_quote)
                        .map_err(Error::from)?
                        .as_str(),
                )
                .map_err(Error::from)?;
        }
        write_txn.commit().map_err(Error::from)?;

        Ok(current_state)
    }

    async fn get_melt_quotes(&self) -> Result<Vec<mint::MeltQuote>, Self::Err> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn
            .open_table(MELT_QUOTES_TABLE)
            .map_err(Error::from)?;

        let mut quotes = Vec::new();

        for (_id, quote) in (table.iter().map_err(Error::from)?).flatten() {
            let quote = serde_json::from_str(quote.value()).map_err(Error::from)?;

            quotes.push(quote)
        }

        Ok(quotes)
    }

    async fn remove_melt_quote(&self, quote_id: &Uuid) -> Result<(), Self::Err> {
        let write_txn = self.db.begin_write().map_err(Error::from)?;

        {
            let mut table = write_txn
                .open_table(MELT_QUOTES_TABLE)
                .map_err(Error::from)?;
            table.remove(quote_id.as_bytes()).map_err(Error::from)?;
        }
        write_txn.commit().map_err(Error::from)?;

        Ok(())
    }

    async fn add_melt_request(
        &self,
        quote_id: &Uuid,
        melt_request: MeltBolt11Request,
        ln_key: LnKey,
    ) -> Result<(), Self::Err> {
        let write_txn = self.db.begin_write().map_err(Error::from)?;

        {
            let mut table = write_txn.open_table(MELT_REQUESTS).map_err(Error::from)?;

            table
                .insert(
                    quote_id.as_bytes(),
                    (
                        serde_json::to_string(&melt_request)?.as_str(),
                        serde_json::to_string(&ln_key)?.as_str(),
                    ),
                )
                .map_err(Error::from)?;
        }
        write_txn.commit().map_err(Error::from)?;

        Ok(())
    }

    async fn get_melt_request(
        &self,
        quote_id: &Uuid,
    ) -> Result<Option<(MeltBolt11Request, LnKey)>, Self::Err> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn.open_table(MELT_REQUESTS).map_err(Error::from)?;

        match table.get(quote_id.as_bytes()).map_err(Error::from)? {
            Some(melt_request) => {
                let (melt_request_str, ln_key_str) = melt_request.value();
                let melt_request = serde_json::from_str(melt_request_str)?;
                let ln_key = serde_json::from_str(ln_key_str)?;

                Ok(Some((melt_request, ln_key)))
            }
            None => Ok(None),
        }
    }

    async fn add_keyset_info(&self, keyset: MintKeySetInfo) -> Result<(), Self::Err> {
        let write_txn = self.db.begin_write().map_err(Error::from)?;

        {
            let mut table = write_txn.open_table(KEYSETS_TABLE).map_err(Error::from)?;
            table
                .insert(
                    keyset.id.to_string().as_str(),
                    serde_json::to_string(&keyset)
                        .map_err(Error::from)?
                        .as_str(),
                )
                .map_err(Error::from)?;
        }
        write_txn.commit().map_err(Error::from)?;

        Ok(())
    }

    async fn get_keyset_info(&self, keyset_id: &Id) -> Result<Option<MintKeySetInfo>, Self::Err> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn.open_table(KEYSETS_TABLE).map_err(Error::from)?;

        match table
            .get(keyset_id.to_string().as_str())
            .map_err(Error::from)?
        {
            Some(keyset) => Ok(serde_json::from_str(keyset.value()).map_err(Error::from)?),
            None => Ok(None),
        }
    }

    async fn get_keyset_infos(&self) -> Result<Vec<MintKeySetInfo>, Self::Err> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn.open_table(KEYSETS_TABLE).map_err(Error::from)?;

        let mut keysets = Vec::new();

        for (_id, keyset) in (table.iter().map_err(Error::from)?).flatten() {
            let keyset = serde_json::from_str(keyset.value()).map_err(Error::from)?;

            keysets.push(keyset)
        }

        Ok(keysets)
    }

    async fn add_proofs(&self, proofs: Proofs, quote_id: Option<Uuid>) -> Result<(), Self::Err> {
        let write_txn = self.db.begin_write().map_err(Error::from)?;

        let pending = serde_json::to_string(&State::Pending).map_err(Error::from)?;

        {
            let mut table = write_txn.open_table(PROOFS_TABLE).map_err(Error::from)?;
            let mut state_table = write_txn
                .open_table(PROOFS_STATE_TABLE)
                .map_err(Error::from)?;
            let mut quote_proofs_table = write_txn
                .open_multimap_table(QUOTE_PROOFS_TABLE)
                .map_err(Error::from)?;

            let mut ys: Vec<[u8; 33]> = Vec::with_capacity(proofs.len());

            for proof in proofs {
                let y: PublicKey = hash_to_curve(&proof.secret.to_bytes())?;
                let y = y.to_bytes();

                // Returning drops the transaction uncommitted, nothing of this call is written
                if ys.contains(&y) || table.get(y).map_err(Error::from)?.is_some() {
                    return Err(database::Error::Duplicate);
                }

                table
                    .insert(
                        y,
                        serde_json::to_string(&proof).map_err(Error::from)?.as_str(),
                    )
                    .map_err(Error::from)?;
                state_table
                    .insert(y, pending.as_str())
                    .map_err(Error::from)?;

                if let Some(quote_id) = &quote_id {
                    quote_proofs_table
                        .insert(quote_id.as_bytes(), y)
                        .map_err(Error::from)?;
                }

                ys.push(y);
            }
        }
        write_txn.commit().map_err(Error::from)?;

        Ok(())
    }

    async fn remove_proofs(
        &self,
        ys: &[PublicKey],
        quote_id: Option<Uuid>,
    ) -> Result<(), Self::Err> {
        let write_txn = self.db.begin_write().map_err(Error::from)?;

        {
            let mut table = write_txn.open_table(PROOFS_TABLE).map_err(Error::from)?;
            let mut state_table = write_txn
                .open_table(PROOFS_STATE_TABLE)
                .map_err(Error::from)?;

            for y in ys {
                let state: Option<State> = match state_table
                    .get(y.to_bytes())
                    .map_err(Error::from)?
                {
                    Some(state) => Some(serde_json::from_str(state.value()).map_err(Error::from)?),
                    None => None,
                };

                if state == Some(State::Spent) {
                    return Err(database::Error::AttemptRemoveSpentProof);
                }
            }

            for y in ys {
                table.remove(y.to_bytes()).map_err(Error::from)?;
                state_table.remove(y.to_bytes()).map_err(Error::from)?;
            }

            if let Some(quote_id) = quote_id {
                let mut quote_proofs_table = write_txn
                    .open_multimap_table(QUOTE_PROOFS_TABLE)
                    .map_err(Error::from)?;

                quote_proofs_table
                    .remove_all(quote_id.as_bytes())
                    .map_err(Error::from)?;
            }
        }
        write_txn.commit().map_err(Error::from)?;

        Ok(())
    }

    async fn get_proofs_by_ys(&self, ys: &[PublicKey]) -> Result<Vec<Option<Proof>>, Self::Err> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn.open_table(PROOFS_TABLE).map_err(Error::from)?;

        let mut proofs = Vec::with_capacity(ys.len());

        for y in ys {
            match table.get(y.to_bytes()).map_err(Error::from)? {
                Some(proof) => proofs.push(Some(
                    serde_json::from_str(proof.value()).map_err(Error::from)?,
                )),
                None => proofs.push(None),
            }
        }

        Ok(proofs)
    }

    async fn get_proof_ys_by_quote_id(&self, quote_id: &Uuid) -> Result<Vec<PublicKey>, Self::Err> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn
            .open_multimap_table(QUOTE_PROOFS_TABLE)
            .map_err(Error::from)?;

        let mut proof_ys = Vec::new();

        for y in table.get(quote_id.as_bytes()).map_err(Error::from)? {
            let y = y.map_err(Error::from)?;
            proof_ys.push(PublicKey::from_slice(&y.value()).map_err(Error::from)?);
        }

        Ok(proof_ys)
    }

    async fn get_proofs_states(&self, ys: &[PublicKey]) -> Result<Vec<Option<State>>, Self::Err> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn
            .open_table(PROOFS_STATE_TABLE)
            .map_err(Error::from)?;

        let mut states = Vec::with_capacity(ys.len());

        for y in ys {
            match table.get(y.to_bytes()).map_err(Error::from)? {
                Some(state) => states.push(Some(
                    serde_json::from_str(state.value()).map_err(Error::from)?,
                )),
                None => states.push(None),
            }
        }

        Ok(states)
    }

    async fn update_proofs_states(
        &self,
        ys: &[PublicKey],
        proofs_state: State,
    ) -> Result<Vec<Option<State>>, Self::Err> {
        let write_txn = self.db.begin_write().map_err(Error::from)?;

        let mut states = Vec::with_capacity(ys.len());

        let state_str = serde_json::to_string(&proofs_state).map_err(Error::from)?;

        {
            let mut table = write_txn
                .open_table(PROOFS_STATE_TABLE)
                .map_err(Error::from)?;

            for y in ys {
                let current_state: State = match table.get(y.to_bytes()).map_err(Error::from)? {
                    Some(state) => serde_json::from_str(state.value()).map_err(Error::from)?,
                    None => return Err(database::Error::ProofNotFound),
                };

                check_state_transition(current_state, proofs_state)?;

                states.push(Some(current_state));
            }

            for y in ys {
                table
                    .insert(y.to_bytes(), state_str.as_str())
                    .map_err(Error::from)?;
            }
        }

        write_txn.commit().map_err(Error::from)?;

        Ok(states)
    }

    async fn add_blind_signatures(
        &self,
        blinded_messages: &[PublicKey],
        blind_signatures: &[BlindSignature],
        quote_id: Option<Uuid>,
    ) -> Result<(), Self::Err> {
        let write_txn = self.db.begin_write().map_err(Error::from)?;

        {
            let mut table = write_txn
                .open_table(BLINDED_SIGNATURES)
                .map_err(Error::from)?;

            for (blinded_message, blind_signature) in blinded_messages.iter().zip(blind_signatures)
            {
                if table
                    .get(blinded_message.to_bytes())
                    .map_err(Error::from)?
                    .is_some()
                {
                    return Err(database::Error::Duplicate);
                }

                let blind_sig = serde_json::to_string(&blind_signature).map_err(Error::from)?;
                table
                    .insert(blinded_message.to_bytes(), blind_sig.as_str())
                    .map_err(Error::from)?;
            }

            if let Some(quote_id) = &quote_id {
                let mut quote_sigs_table = write_txn
                    .open_table(QUOTE_SIGNATURES_TABLE)
                    .map_err(Error::from)?;

                let mut signatures: Vec<BlindSignature> = match quote_sigs_table
                    .get(quote_id.as_bytes())
                    .map_err(Error::from)?
                {
                    Some(signatures) => {
                        serde_json::from_str(signatures.value()).map_err(Error::from)?
                    }
                    None => Vec::new(),
                };

                signatures.extend_from_slice(blind_signatures);

                quote_sigs_table
                    .insert(
                        quote_id.as_bytes(),
                        serde_json::to_string(&signatures)
                            .map_err(Error::from)?
                            .as_str(),
                    )
                    .map_err(Error::from)?;
            }
        }

        write_txn.commit().map_err(Error::from)?;

        Ok(())
    }

    async fn remove_blind_signatures(
        &self,
        blinded_messages: &[PublicKey],
    ) -> Result<(), Self::Err> {
        let write_txn = self.db.begin_write().map_err(Error::from)?;

        {
            let mut table = write_txn
                .open_table(BLINDED_SIGNATURES)
                .map_err(Error::from)?;

            for blinded_message in blinded_messages {
                table
                    .remove(blinded_message.to_bytes())
                    .map_err(Error::from)?;
            }
        }

        write_txn.commit().map_err(Error::from)?;

        Ok(())
    }

    async fn get_blind_signatures(
        &self,
        blinded_messages: &[PublicKey],
    ) -> Result<Vec<Option<BlindSignature>>, Self::Err> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn
            .open_table(BLINDED_SIGNATURES)
            .map_err(Error::from)?;

        let mut signatures = Vec::with_capacity(blinded_messages.len());

        for blinded_message in blinded_messages {
            match table.get(blinded_message.to_bytes()).map_err(Error::from)? {
                Some(blind_signature) => signatures.push(Some(
                    serde_json::from_str(blind_signature.value()).map_err(Error::from)?,
                )),
                None => signatures.push(None),
            }
        }

        Ok(signatures)
    }

    async fn get_blind_signatures_for_quote(
        &self,
        quote_id: &Uuid,
    ) -> Result<Vec<BlindSignature>, Self::Err> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn
            .open_table(QUOTE_SIGNATURES_TABLE)
            .map_err(Error::from)?;

        match table.get(quote_id.as_bytes()).map_err(Error::from)? {
            Some(signatures) => Ok(serde_json::from_str(signatures.value()).map_err(Error::from)?),
            None => Ok(Vec::new()),
        }
    }
}
