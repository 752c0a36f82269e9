use std::str::FromStr;
use std::sync::Arc;

use cmk_common::common::LnKey;
use cmk_common::database;
use cmk_common::lightning;
use cmk_common::util::unix_time;
use tracing::instrument;
use uuid::Uuid;

use super::expiry::quote_transition_error;
use super::proof_writer::ProofWriter;
use super::{
    BlindSignature, BlindedMessage, MeltBolt11Request, MeltQuote, MeltQuoteBolt11Request,
    MeltQuoteBolt11Response, MeltQuoteState, Mint, PaymentMethod, PublicKey, State,
};
use crate::amount::to_unit;
use crate::{ensure_cmk, Amount, Error};

impl Mint {
    fn check_melt_request_acceptable(
        &self,
        amount: Amount,
        melt_request: &MeltQuoteBolt11Request,
    ) -> Result<(), Error> {
        let limits = self
            .limits
            .get(&LnKey::new(melt_request.unit.clone(), PaymentMethod::Bolt11))
            .copied()
            .unwrap_or_default();

        let is_out_of_range = amount < limits.melt_min || amount > limits.melt_max;

        ensure_cmk!(
            !is_out_of_range,
            Error::AmountOutofLimitRange(limits.melt_min, limits.melt_max, amount)
        );

        Ok(())
    }

    /// Get melt bolt11 quote
    ///
    /// The backend prices the invoice in the quote unit and sets the fee reserve the melt has to
    /// cover on top of the amount.
    #[instrument(skip_all)]
    pub async fn get_melt_bolt11_quote(
        &self,
        melt_request: &MeltQuoteBolt11Request,
    ) -> Result<MeltQuoteBolt11Response, Error> {
        let MeltQuoteBolt11Request { request, unit } = melt_request;

        ensure_cmk!(
            request.amount_milli_satoshis().is_some(),
            Error::InvoiceAmountUndefined
        );

        let ln = self.ln_backend(unit)?;

        let payment_quote = ln.get_payment_quote(melt_request).await.map_err(|err| {
            tracing::error!(
                "Could not get payment quote for melt quote, {} bolt11, {}",
                unit,
                err
            );

            Error::from(err)
        })?;

        self.check_melt_request_acceptable(payment_quote.amount, melt_request)?;

        let quote = MeltQuote::new(
            request.to_string(),
            unit.clone(),
            payment_quote.amount,
            payment_quote.fee,
            unix_time() + self.quote_ttl.melt_ttl,
            payment_quote.request_lookup_id.clone(),
        );

        tracing::debug!(
            "New melt quote {} for {} {} with request id {}",
            quote.id,
            payment_quote.amount,
            unit,
            payment_quote.request_lookup_id
        );

        self.localstore.add_melt_quote(quote.clone()).await?;

        Ok(quote.into())
    }

    /// Check melt quote status
    ///
    /// A paid quote carries the change signatures issued for it.
    #[instrument(skip(self))]
    pub async fn check_melt_quote(&self, quote_id: &Uuid) -> Result<MeltQuoteBolt11Response, Error> {
        let mut quote = self
            .localstore
            .get_melt_quote(quote_id)
            .await?
            .ok_or(Error::UnknownQuote)?;

        self.expire_melt_quote(&mut quote, unix_time()).await?;

        let mut response = MeltQuoteBolt11Response::from(&quote);

        if quote.state == MeltQuoteState::Paid {
            let change = self
                .localstore
                .get_blind_signatures_for_quote(quote_id)
                .await?;

            response.change = (!change.is_empty()).then_some(change);
        }

        Ok(response)
    }

    /// Get all melt quotes
    #[instrument(skip_all)]
    pub async fn melt_quotes(&self) -> Result<Vec<MeltQuote>, Error> {
        Ok(self.localstore.get_melt_quotes().await?)
    }

    /// Verify melt request is valid
    ///
    /// Checks the quote, the inputs and the change outputs before touching any state, then
    /// moves the quote to `PENDING` and registers the inputs as pending under it. If the inputs
    /// cannot be registered the quote goes back to `UNPAID`.
    #[instrument(skip_all)]
    pub async fn verify_melt_request(
        &self,
        quote_id: &Uuid,
        melt_request: &MeltBolt11Request,
    ) -> Result<(ProofWriter, MeltQuote), Error> {
        let now = unix_time();

        let mut quote = self
            .localstore
            .get_melt_quote(quote_id)
            .await?
            .ok_or(Error::UnknownQuote)?;

        self.expire_melt_quote(&mut quote, now).await?;

        match quote.state {
            MeltQuoteState::Unpaid => (),
            MeltQuoteState::Pending => return Err(Error::PendingQuote),
            MeltQuoteState::Paid => return Err(Error::PaidQuote),
            MeltQuoteState::Expired => return Err(Error::ExpiredQuote(quote.expiry, now)),
        }

        let input_verification = self.verify_inputs(&melt_request.inputs).await?;

        ensure_cmk!(input_verification.unit == quote.unit, Error::UnitMismatch);

        let fee = self.get_proofs_fee(&melt_request.inputs).await?;

        let required_total = quote
            .amount
            .checked_add(quote.fee_reserve)
            .and_then(|amount| amount.checked_add(fee))
            .ok_or(Error::AmountOverflow)?;

        // Inputs may exceed the total, the wallet does not have to ask for change
        if input_verification.amount < required_total {
            tracing::info!(
                "Melt request of {} does not cover quote {}, fee reserve {} and input fee {}",
                input_verification.amount,
                quote.amount,
                quote.fee_reserve,
                fee
            );
            return Err(Error::InsufficientInputs(
                input_verification.amount.into(),
                required_total.into(),
            ));
        }

        if let Some(outputs) = melt_request.outputs.as_ref().filter(|o| !o.is_empty()) {
            Mint::check_outputs_unique(outputs)?;
            self.check_output_already_signed(outputs).await?;

            let output_unit = self.verify_outputs_keyset(outputs).await?;

            ensure_cmk!(output_unit == quote.unit, Error::UnitMismatch);
        }

        // Claim the quote before linking inputs to it, only one request gets past this point
        self.localstore
            .update_melt_quote_state(&quote.id, MeltQuoteState::Pending, None)
            .await
            .map_err(|err| quote_transition_error(err, quote.expiry, now))?;

        quote.state = MeltQuoteState::Pending;

        let mut proof_writer = ProofWriter::new(self.localstore.clone());

        if let Err(err) = proof_writer
            .add_proofs(&melt_request.inputs, Some(quote.id))
            .await
        {
            if let Err(reset_err) = self
                .localstore
                .update_melt_quote_state(&quote.id, MeltQuoteState::Unpaid, None)
                .await
            {
                tracing::error!("Could not reset melt quote {}: {}", quote.id, reset_err);
            }

            return Err(err);
        }

        tracing::debug!("Verified melt quote: {}", quote.id);

        Ok((proof_writer, quote))
    }

    /// Melt Bolt11
    ///
    /// Pays the quote's invoice with the inputs of `melt_request`:
    /// - paid: inputs are spent, the quote is paid and unused fee reserve comes back as change
    /// - failed: inputs are released and the quote can be melted again
    /// - pending or no answer within the melt timeout: inputs and quote stay pending until
    ///   [`Mint::check_pending_melt_quotes`] resolves them
    #[instrument(skip_all)]
    pub async fn melt(
        &self,
        melt_request: &MeltBolt11Request,
    ) -> Result<MeltQuoteBolt11Response, Error> {
        let quote_id = Uuid::from_str(&melt_request.quote)?;

        let (proof_writer, quote) = self.verify_melt_request(&quote_id, melt_request).await?;

        let ln = match self.ln_backend(&quote.unit) {
            Ok(ln) => Arc::clone(ln),
            Err(err) => {
                self.abort_melt(&quote, proof_writer).await;
                return Err(err);
            }
        };

        if let Err(err) = self
            .localstore
            .add_melt_request(
                &quote.id,
                melt_request.clone(),
                LnKey::new(quote.unit.clone(), PaymentMethod::Bolt11),
            )
            .await
        {
            tracing::error!("Could not store melt request for {}: {}", quote.id, err);
            self.abort_melt(&quote, proof_writer).await;
            return Err(err.into());
        }

        // From here on the inputs are tracked through the quote, not the writer
        proof_writer.commit();

        let payment = tokio::time::timeout(
            self.melt_timeout,
            ln.pay_invoice(quote.clone(), Some(quote.fee_reserve)),
        )
        .await;

        let pay_invoice_response = match payment {
            Err(_elapsed) => {
                tracing::warn!(
                    "Payment for melt quote {} did not complete within {:?}, leaving it pending",
                    quote.id,
                    self.melt_timeout
                );
                return Ok(MeltQuoteBolt11Response::from(&quote));
            }
            Ok(Ok(response)) => response,
            Ok(Err(lightning::Error::InvoiceAlreadyPaid)) => {
                tracing::debug!("Invoice already paid, resetting melt quote {}", quote.id);
                self.refund_melt_quote(&quote).await?;
                return Err(Error::RequestAlreadyPaid);
            }
            Ok(Err(err)) => {
                tracing::error!("Error returned attempting to pay: {} {}", quote.id, err);

                match ln.check_outgoing_payment(&quote.request_lookup_id).await {
                    Ok(response) => response,
                    Err(check_err) => {
                        tracing::error!(
                            "Could not check the status of payment for {}, proofs stuck as pending: {}",
                            quote.id,
                            check_err
                        );
                        return Err(err.into());
                    }
                }
            }
        };

        match pay_invoice_response.status {
            MeltQuoteState::Paid => {
                let total_spent = to_unit(
                    pay_invoice_response.total_spent,
                    &pay_invoice_response.unit,
                    &quote.unit,
                )?;

                self.finalize_melt_quote(
                    &quote,
                    pay_invoice_response.payment_preimage,
                    total_spent,
                )
                .await
            }
            MeltQuoteState::Unpaid | MeltQuoteState::Expired => {
                tracing::info!(
                    "Lightning payment for quote {} failed, releasing inputs",
                    quote.id
                );
                self.refund_melt_quote(&quote).await?;

                Err(Error::PaymentFailed)
            }
            MeltQuoteState::Pending => {
                tracing::warn!(
                    "Lightning payment for quote {} is pending, inputs stay pending",
                    quote.id
                );
                Ok(MeltQuoteBolt11Response::from(&quote))
            }
        }
    }

    /// Undo [`Mint::verify_melt_request`] before any payment was attempted
    async fn abort_melt(&self, quote: &MeltQuote, proof_writer: ProofWriter) {
        if let Err(err) = proof_writer.rollback().await {
            tracing::error!("Could not roll back melt inputs: {}", err);
        }

        if let Err(err) = self
            .localstore
            .update_melt_quote_state(&quote.id, MeltQuoteState::Unpaid, None)
            .await
        {
            tracing::error!("Could not reset melt quote {}: {}", quote.id, err);
        }
    }

    /// Finalize a melt quote whose invoice was paid
    ///
    /// Spends the quote's inputs, signs change for the unused fee reserve and marks the quote
    /// paid.
    #[instrument(skip_all)]
    pub async fn finalize_melt_quote(
        &self,
        quote: &MeltQuote,
        payment_preimage: Option<String>,
        total_spent: Amount,
    ) -> Result<MeltQuoteBolt11Response, Error> {
        let (melt_request, _ln_key) = self
            .localstore
            .get_melt_request(&quote.id)
            .await?
            .ok_or_else(|| {
                tracing::error!("No melt request stored for paid quote {}", quote.id);
                Error::Internal
            })?;

        let input_ys = self.localstore.get_proof_ys_by_quote_id(&quote.id).await?;

        self.localstore
            .update_proofs_states(&input_ys, State::Spent)
            .await?;

        let change = match self
            .sign_melt_change(quote, &melt_request, total_spent)
            .await
        {
            Ok(change) => change,
            Err(err) => {
                tracing::error!("Could not sign change for melt quote {}: {}", quote.id, err);
                None
            }
        };

        self.localstore
            .update_melt_quote_state(&quote.id, MeltQuoteState::Paid, payment_preimage.clone())
            .await?;

        tracing::info!(
            "Melt quote {} paid, {} {} spent",
            quote.id,
            total_spent,
            quote.unit
        );

        let mut response = MeltQuoteBolt11Response::from(quote);
        response.state = MeltQuoteState::Paid;
        response.payment_preimage = payment_preimage;
        response.change = change;

        Ok(response)
    }

    /// Release the inputs of a melt quote whose payment failed
    ///
    /// The quote returns to `UNPAID` so it can be melted again.
    #[instrument(skip_all)]
    pub async fn refund_melt_quote(&self, quote: &MeltQuote) -> Result<(), Error> {
        let input_ys = self.localstore.get_proof_ys_by_quote_id(&quote.id).await?;

        if !input_ys.is_empty() {
            self.localstore
                .remove_proofs(&input_ys, Some(quote.id))
                .await?;
        }

        self.localstore
            .update_melt_quote_state(&quote.id, MeltQuoteState::Unpaid, None)
            .await?;

        tracing::info!(
            "Released {} inputs of melt quote {}",
            input_ys.len(),
            quote.id
        );

        Ok(())
    }

    /// Sign change for the fee reserve the payment did not use
    ///
    /// Change is split into powers of two, largest first. If the wallet sent fewer blank outputs
    /// than parts, only the largest parts are returned.
    async fn sign_melt_change(
        &self,
        quote: &MeltQuote,
        melt_request: &MeltBolt11Request,
        total_spent: Amount,
    ) -> Result<Option<Vec<BlindSignature>>, Error> {
        let outputs = match melt_request.outputs.as_ref().filter(|o| !o.is_empty()) {
            Some(outputs) => outputs,
            None => return Ok(None),
        };

        let inputs_amount = melt_request.proofs_amount()?;
        let inputs_fee = self.get_proofs_fee(&melt_request.inputs).await?;

        let change_target = inputs_amount
            .checked_sub(total_spent)
            .and_then(|amount| amount.checked_sub(inputs_fee))
            .unwrap_or(Amount::ZERO);

        if change_target == Amount::ZERO {
            return Ok(None);
        }

        let mut amounts = change_target.split();

        if outputs.len() < amounts.len() {
            tracing::debug!(
                "Providing change requires {} blinded messages, but only {} provided",
                amounts.len(),
                outputs.len()
            );

            amounts.sort_by(|a, b| b.cmp(a));
            amounts.truncate(outputs.len());
        }

        let mut change_messages = Vec::with_capacity(amounts.len());
        let mut change_sigs = Vec::with_capacity(amounts.len());

        for (amount, blinded_message) in amounts.iter().zip(outputs) {
            let blinded_message = BlindedMessage {
                amount: *amount,
                ..blinded_message.clone()
            };

            change_sigs.push(self.blind_sign(&blinded_message).await?);
            change_messages.push(blinded_message);
        }

        let blinded_secrets: Vec<PublicKey> =
            change_messages.iter().map(|b| b.blinded_secret).collect();

        match self
            .localstore
            .add_blind_signatures(&blinded_secrets, &change_sigs, Some(quote.id))
            .await
        {
            Ok(()) => Ok(Some(change_sigs)),
            Err(database::Error::Duplicate) => Err(Error::BlindedMessageAlreadySigned),
            Err(err) => Err(err.into()),
        }
    }
}
