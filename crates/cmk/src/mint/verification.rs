use std::collections::HashSet;

use tracing::instrument;

use super::{Amount, BlindedMessage, CurrencyUnit, Error, Id, Mint, Proof, Proofs, PublicKey};
use crate::dhke::verify_message;
use crate::nuts::ProofsMethods;

/// Verified amount and unit of a set of inputs or outputs
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Verification {
    /// Total amount
    pub amount: Amount,
    /// Unit shared by every input or output
    pub unit: CurrencyUnit,
}

impl Mint {
    /// Verify that the inputs to the transaction are unique
    pub fn check_inputs_unique(inputs: &Proofs) -> Result<(), Error> {
        let proof_count = inputs.len();

        if inputs
            .iter()
            .map(|i| i.y())
            .collect::<Result<HashSet<PublicKey>, _>>()?
            .len()
            .ne(&proof_count)
        {
            return Err(Error::DuplicateInputs);
        }

        Ok(())
    }

    /// Verify that the outputs to are unique
    pub fn check_outputs_unique(outputs: &[BlindedMessage]) -> Result<(), Error> {
        let output_count = outputs.len();

        if outputs
            .iter()
            .map(|o| &o.blinded_secret)
            .collect::<HashSet<&PublicKey>>()
            .len()
            .ne(&output_count)
        {
            return Err(Error::DuplicateOutputs);
        }

        Ok(())
    }

    /// Verify output keyset
    ///
    /// Checks that the outputs are all of the same unit and their keyset is active
    pub async fn verify_outputs_keyset(
        &self,
        outputs: &[BlindedMessage],
    ) -> Result<CurrencyUnit, Error> {
        let mut keyset_units = HashSet::new();

        let output_keyset_ids: HashSet<Id> = outputs.iter().map(|p| p.keyset_id).collect();

        for id in &output_keyset_ids {
            match self.localstore.get_keyset_info(id).await? {
                Some(keyset) => {
                    if !keyset.active {
                        return Err(Error::InactiveKeyset);
                    }
                    keyset_units.insert(keyset.unit);
                }
                None => {
                    tracing::info!("Request with unknown keyset {} in outputs", id);
                    return Err(Error::UnknownKeySet(*id));
                }
            }
        }

        single_unit(keyset_units)
    }

    /// Verify every output asks for a denomination of its keyset
    pub fn check_output_amounts(&self, outputs: &[BlindedMessage]) -> Result<(), Error> {
        let keysets = self.keysets.load();

        for output in outputs {
            let has_key = keysets
                .get(&output.keyset_id)
                .is_some_and(|k| k.keys.contains_key(&output.amount));

            if !has_key {
                return Err(Error::InvalidAmount(output.amount));
            }
        }

        Ok(())
    }

    /// Verify input keyset
    ///
    /// Checks that the inputs are all of the same unit
    pub async fn verify_inputs_keyset(&self, inputs: &Proofs) -> Result<CurrencyUnit, Error> {
        let mut keyset_units = HashSet::new();

        let inputs_keyset_ids: HashSet<Id> = inputs.iter().map(|p| p.keyset_id).collect();

        for id in &inputs_keyset_ids {
            match self.localstore.get_keyset_info(id).await? {
                Some(keyset) => {
                    keyset_units.insert(keyset.unit);
                }
                None => {
                    tracing::info!("Request with unknown keyset {} in inputs", id);
                    return Err(Error::UnknownKeySet(*id));
                }
            }
        }

        single_unit(keyset_units)
    }

    /// Verifies that the outputs have not already been signed
    pub async fn check_output_already_signed(
        &self,
        outputs: &[BlindedMessage],
    ) -> Result<(), Error> {
        let blinded_messages: Vec<PublicKey> = outputs.iter().map(|o| o.blinded_secret).collect();

        if self
            .localstore
            .get_blind_signatures(&blinded_messages)
            .await?
            .iter()
            .flatten()
            .next()
            .is_some()
        {
            tracing::info!("Output has already been signed");

            return Err(Error::BlindedMessageAlreadySigned);
        }

        Ok(())
    }

    /// Verify a proof's signature
    ///
    /// The key is picked by the amount the proof claims, so a signature presented with another
    /// amount does not verify.
    pub fn verify_proof(&self, proof: &Proof) -> Result<(), Error> {
        if !proof.amount.is_power_of_two() {
            return Err(Error::InvalidAmount(proof.amount));
        }

        let keyset = self.keyset_keys(&proof.keyset_id)?;

        let key_pair = keyset.keys.get(&proof.amount).ok_or(Error::AmountKey)?;

        verify_message(&key_pair.secret_key, proof.c, proof.secret.as_bytes())
            .map_err(|_| Error::TokenNotVerified)
    }

    /// Verifies outputs
    /// Checks outputs are unique, of the same unit and not signed before
    #[instrument(skip_all)]
    pub async fn verify_outputs(&self, outputs: &[BlindedMessage]) -> Result<Verification, Error> {
        if outputs.is_empty() {
            return Err(Error::InvalidAmount(Amount::ZERO));
        }

        Mint::check_outputs_unique(outputs)?;
        self.check_output_already_signed(outputs).await?;

        let unit = self.verify_outputs_keyset(outputs).await?;
        self.check_output_amounts(outputs)?;

        let amount = Amount::try_sum(outputs.iter().map(|o| o.amount))?;

        Ok(Verification { amount, unit })
    }

    /// Verifies inputs
    /// Checks that inputs are unique, of the same unit and carry valid signatures
    /// **NOTE: This does not check if inputs have been spent
    #[instrument(skip_all)]
    pub async fn verify_inputs(&self, inputs: &Proofs) -> Result<Verification, Error> {
        if inputs.is_empty() {
            return Err(Error::InvalidAmount(Amount::ZERO));
        }

        Mint::check_inputs_unique(inputs)?;
        let unit = self.verify_inputs_keyset(inputs).await?;
        let amount = inputs.total_amount()?;

        for proof in inputs {
            self.verify_proof(proof)?;
        }

        Ok(Verification { amount, unit })
    }

    /// Verify that inputs and outputs are valid and balanced
    ///
    /// `sum(inputs) - fee == sum(outputs)`, the fee being the input fee of the inputs' keysets.
    #[instrument(skip_all)]
    pub async fn verify_transaction_balanced(
        &self,
        inputs: &Proofs,
        outputs: &[BlindedMessage],
    ) -> Result<(), Error> {
        let output_verification = self.verify_outputs(outputs).await.map_err(|err| {
            tracing::debug!("Output verification failed: {:?}", err);
            err
        })?;
        let input_verification = self.verify_inputs(inputs).await.map_err(|err| {
            tracing::debug!("Input verification failed: {:?}", err);
            err
        })?;

        if output_verification.unit != input_verification.unit {
            tracing::debug!(
                "Output unit {} does not match input unit {}",
                output_verification.unit,
                input_verification.unit
            );
            return Err(Error::UnitMismatch);
        }

        let fees = self.get_proofs_fee(inputs).await?;

        if output_verification.amount
            != input_verification
                .amount
                .checked_sub(fees)
                .ok_or(Error::AmountOverflow)?
        {
            return Err(Error::TransactionUnbalanced(
                input_verification.amount.into(),
                output_verification.amount.into(),
                fees.into(),
            ));
        }

        Ok(())
    }
}

/// The one unit of a request
fn single_unit(keyset_units: HashSet<CurrencyUnit>) -> Result<CurrencyUnit, Error> {
    let mut units = keyset_units.into_iter();

    match (units.next(), units.next()) {
        (Some(unit), None) => Ok(unit),
        (None, _) => Err(Error::UnsupportedUnit),
        (Some(_), Some(_)) => {
            tracing::error!("Only one unit is allowed in request");
            Err(Error::MultipleUnits)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::nuts::SecretKey;

    fn blinded_message(amount: u64) -> BlindedMessage {
        BlindedMessage::new(
            Amount::from(amount),
            Id::from_str("001711afb1de20cb").unwrap(),
            SecretKey::generate().public_key(),
        )
    }

    #[test]
    fn duplicate_outputs() {
        let output = blinded_message(8);

        assert!(Mint::check_outputs_unique(&[output.clone(), blinded_message(8)]).is_ok());
        assert!(matches!(
            Mint::check_outputs_unique(&[output.clone(), output]),
            Err(Error::DuplicateOutputs)
        ));
    }

    #[test]
    fn single_unit_requires_exactly_one() {
        assert_eq!(
            single_unit(HashSet::from([CurrencyUnit::Sat])).unwrap(),
            CurrencyUnit::Sat
        );
        assert!(matches!(
            single_unit(HashSet::from([CurrencyUnit::Sat, CurrencyUnit::Usd])),
            Err(Error::MultipleUnits)
        ));
        assert!(matches!(
            single_unit(HashSet::new()),
            Err(Error::UnsupportedUnit)
        ));
    }
}
