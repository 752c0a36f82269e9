//! Proof writer
use std::collections::HashMap;
use std::sync::Arc;

use cmk_common::database::{self, MintDatabase};
use uuid::Uuid;

use super::{Error, Proofs, PublicKey, State};
use crate::nuts::ProofsMethods;

type Db = Arc<dyn MintDatabase<Err = database::Error> + Send + Sync>;

/// Proof writer
///
/// Registers the inputs of an operation as [`State::Pending`] so no concurrent request can use
/// them, and then either commits their new state or puts them back.
///
/// Dropping a writer that was neither committed nor rolled back rolls it back on a spawned task.
/// If the process dies first, the proofs stay pending until the quote they belong to is
/// reconciled.
pub struct ProofWriter {
    db: Option<Db>,
    proof_original_states: Option<HashMap<PublicKey, Option<State>>>,
    quote_id: Option<Uuid>,
}

impl std::fmt::Debug for ProofWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofWriter")
            .field("proof_original_states", &self.proof_original_states)
            .field("quote_id", &self.quote_id)
            .finish()
    }
}

impl ProofWriter {
    /// Creates a new ProofWriter on top of the database
    pub fn new(db: Db) -> Self {
        Self {
            db: Some(db),
            proof_original_states: Some(Default::default()),
            quote_id: None,
        }
    }

    /// The changes are permanent, consume the struct removing the database, so the Drop does
    /// nothing
    pub fn commit(mut self) {
        self.db.take();
        self.proof_original_states.take();
    }

    /// Add proofs as pending
    ///
    /// Fails with [`Error::TokenAlreadySpent`] or [`Error::TokenPending`] without writing
    /// anything if any of them is already known.
    pub async fn add_proofs(
        &mut self,
        proofs: &Proofs,
        quote_id: Option<Uuid>,
    ) -> Result<Vec<PublicKey>, Error> {
        let (db, proof_states) = match (self.db.as_ref(), self.proof_original_states.as_mut()) {
            (Some(db), Some(states)) => (db, states),
            _ => return Err(Error::Internal),
        };

        let ys = proofs.ys()?;

        match db.add_proofs(proofs.clone(), quote_id).await {
            Ok(()) => (),
            Err(database::Error::Duplicate) => {
                let states = db.get_proofs_states(&ys).await?;

                return Err(if states.contains(&Some(State::Spent)) {
                    Error::TokenAlreadySpent
                } else {
                    Error::TokenPending
                });
            }
            Err(err) => return Err(err.into()),
        }

        for y in ys.iter() {
            proof_states.insert(*y, None);
        }

        if quote_id.is_some() {
            self.quote_id = quote_id;
        }

        Ok(ys)
    }

    /// Update proof status
    pub async fn update_proofs_states(
        &mut self,
        ys: &[PublicKey],
        new_proof_state: State,
    ) -> Result<(), Error> {
        let (db, proof_states) = match (self.db.as_ref(), self.proof_original_states.as_mut()) {
            (Some(db), Some(states)) => (db, states),
            _ => return Err(Error::Internal),
        };

        let original_proofs_state = db.update_proofs_states(ys, new_proof_state).await?;

        if ys.len() != original_proofs_state.len() {
            return Err(Error::Internal);
        }

        for (y, state) in ys.iter().zip(original_proofs_state) {
            proof_states.entry(*y).or_insert(state);
        }

        Ok(())
    }

    /// Rollback all changes in this ProofWriter consuming it.
    pub async fn rollback(mut self) -> Result<(), Error> {
        let (db, proof_states) = match (self.db.take(), self.proof_original_states.take()) {
            (Some(db), Some(states)) => (db, states),
            _ => return Ok(()),
        };

        rollback(db, proof_states, self.quote_id).await
    }
}

/// Resets proofs to their original states or removes them, unlinking removed ones from the quote
async fn rollback(
    db: Db,
    proof_states: HashMap<PublicKey, Option<State>>,
    quote_id: Option<Uuid>,
) -> Result<(), Error> {
    let mut ys_by_state: HashMap<State, Vec<PublicKey>> = HashMap::new();
    let mut unknown_proofs = Vec::new();

    for (y, state) in proof_states {
        match state {
            Some(State::Spent) => (),
            Some(state) => ys_by_state.entry(state).or_default().push(y),
            None => unknown_proofs.push(y),
        }
    }

    tracing::info!(
        "Rollback {} new proofs and {} proofs with a prior state",
        unknown_proofs.len(),
        ys_by_state.values().map(Vec::len).sum::<usize>()
    );

    for (state, ys) in ys_by_state {
        db.update_proofs_states(&ys, state).await?;
    }

    if !unknown_proofs.is_empty() {
        db.remove_proofs(&unknown_proofs, quote_id).await?;
    }

    Ok(())
}

impl Drop for ProofWriter {
    fn drop(&mut self) {
        let (db, proof_states) = match (self.db.take(), self.proof_original_states.take()) {
            (Some(db), Some(states)) => (db, states),
            _ => return,
        };
        let quote_id = self.quote_id;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = rollback(db, proof_states, quote_id).await {
                        tracing::error!("Could not roll back dropped proof writer: {}", err);
                    }
                });
            }
            Err(_) => {
                tracing::error!("Proof writer dropped outside a runtime, proofs stay pending");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmk_database::MintMemoryDatabase;
    use crate::nuts::{Id, Proof, SecretKey};
    use crate::secret::Secret;
    use crate::Amount;

    fn proofs(count: usize) -> Proofs {
        (0..count)
            .map(|_| {
                Proof::new(
                    Amount::from(4),
                    Id::from_bytes(&[0, 1, 1, 1, 1, 1, 1, 1]).unwrap(),
                    Secret::generate(),
                    SecretKey::generate().public_key(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn rollback_removes_new_proofs() {
        let db: Db = Arc::new(MintMemoryDatabase::default());
        let proofs = proofs(2);

        let mut writer = ProofWriter::new(Arc::clone(&db));
        let ys = writer.add_proofs(&proofs, None).await.unwrap();
        assert_eq!(
            db.get_proofs_states(&ys).await.unwrap(),
            vec![Some(State::Pending); 2]
        );

        writer.rollback().await.unwrap();
        assert_eq!(db.get_proofs_states(&ys).await.unwrap(), vec![None, None]);
    }

    #[tokio::test]
    async fn commit_keeps_spent_proofs() {
        let db: Db = Arc::new(MintMemoryDatabase::default());
        let proofs = proofs(1);

        let mut writer = ProofWriter::new(Arc::clone(&db));
        let ys = writer.add_proofs(&proofs, None).await.unwrap();
        writer
            .update_proofs_states(&ys, State::Spent)
            .await
            .unwrap();
        writer.commit();

        assert_eq!(
            db.get_proofs_states(&ys).await.unwrap(),
            vec![Some(State::Spent)]
        );

        let mut second = ProofWriter::new(Arc::clone(&db));
        assert!(matches!(
            second.add_proofs(&proofs, None).await,
            Err(Error::TokenAlreadySpent)
        ));
    }

    #[tokio::test]
    async fn pending_proofs_are_reported_pending() {
        let db: Db = Arc::new(MintMemoryDatabase::default());
        let proofs = proofs(1);

        let mut first = ProofWriter::new(Arc::clone(&db));
        first.add_proofs(&proofs, None).await.unwrap();

        let mut second = ProofWriter::new(Arc::clone(&db));
        assert!(matches!(
            second.add_proofs(&proofs, None).await,
            Err(Error::TokenPending)
        ));

        first.commit();
    }

    #[tokio::test]
    async fn rollback_unlinks_quote_inputs() {
        let db: Db = Arc::new(MintMemoryDatabase::default());
        let quote_id = Uuid::new_v4();

        let mut writer = ProofWriter::new(Arc::clone(&db));
        writer.add_proofs(&proofs(2), Some(quote_id)).await.unwrap();
        assert_eq!(db.get_proof_ys_by_quote_id(&quote_id).await.unwrap().len(), 2);

        writer.rollback().await.unwrap();
        assert!(db.get_proof_ys_by_quote_id(&quote_id).await.unwrap().is_empty());
    }
}
