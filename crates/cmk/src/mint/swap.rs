use cmk_common::database;
use tracing::instrument;

use super::proof_writer::ProofWriter;
use super::{BlindSignature, Mint, PublicKey, State, SwapRequest, SwapResponse};
use crate::Error;

impl Mint {
    /// Process Swap
    ///
    /// Inputs are registered as pending before anything is signed and only become spent once
    /// every output signature is stored. Any failure puts the inputs back and forgets the outputs.
    #[instrument(skip_all)]
    pub async fn process_swap_request(
        &self,
        swap_request: SwapRequest,
    ) -> Result<SwapResponse, Error> {
        if let Err(err) = self
            .verify_transaction_balanced(&swap_request.inputs, &swap_request.outputs)
            .await
        {
            tracing::debug!("Attempt to swap unbalanced transaction, aborting: {err}");
            return Err(err);
        };

        let mut proof_writer = ProofWriter::new(self.localstore.clone());
        let input_ys = proof_writer.add_proofs(&swap_request.inputs, None).await?;

        match self
            .sign_swap_outputs(&swap_request, &mut proof_writer, &input_ys)
            .await
        {
            Ok(promises) => {
                proof_writer.commit();

                Ok(SwapResponse::new(promises))
            }
            Err(err) => {
                tracing::warn!("Swap failed, rolling back inputs: {}", err);

                if let Err(rollback_err) = proof_writer.rollback().await {
                    tracing::error!("Could not roll back swap inputs: {}", rollback_err);
                }

                Err(err)
            }
        }
    }

    async fn sign_swap_outputs(
        &self,
        swap_request: &SwapRequest,
        proof_writer: &mut ProofWriter,
        input_ys: &[PublicKey],
    ) -> Result<Vec<BlindSignature>, Error> {
        let mut promises = Vec::with_capacity(swap_request.outputs.len());

        for blinded_message in swap_request.outputs.iter() {
            promises.push(self.blind_sign(blinded_message).await?);
        }

        let blinded_messages: Vec<PublicKey> = swap_request
            .outputs
            .iter()
            .map(|o| o.blinded_secret)
            .collect();

        match self
            .localstore
            .add_blind_signatures(&blinded_messages, &promises, None)
            .await
        {
            Ok(()) => (),
            Err(database::Error::Duplicate) => return Err(Error::BlindedMessageAlreadySigned),
            Err(err) => return Err(err.into()),
        }

        if let Err(err) = proof_writer
            .update_proofs_states(input_ys, State::Spent)
            .await
        {
            // The inputs are rolled back, so the outputs must be signable again
            if let Err(remove_err) = self
                .localstore
                .remove_blind_signatures(&blinded_messages)
                .await
            {
                tracing::error!("Could not remove swap signatures: {}", remove_err);
            }

            return Err(err);
        }

        Ok(promises)
    }
}
