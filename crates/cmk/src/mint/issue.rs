use std::str::FromStr;

use cmk_common::common::LnKey;
use cmk_common::database;
use cmk_common::util::unix_time;
use tracing::instrument;
use uuid::Uuid;

use super::expiry::quote_transition_error;
use super::{
    BlindSignature, CurrencyUnit, MintBolt11Request, MintBolt11Response, MintQuote,
    MintQuoteBolt11Request, MintQuoteBolt11Response, MintQuoteState, PaymentMethod, PublicKey,
};
use crate::{ensure_cmk, Amount, Error, Mint};

impl Mint {
    /// Checks that minting `amount` of `unit` is within the configured limits
    fn check_mint_request_acceptable(
        &self,
        amount: Amount,
        unit: &CurrencyUnit,
    ) -> Result<(), Error> {
        let limits = self
            .limits
            .get(&LnKey::new(unit.clone(), PaymentMethod::Bolt11))
            .copied()
            .unwrap_or_default();

        let is_out_of_range = amount < limits.mint_min || amount > limits.mint_max;

        ensure_cmk!(
            !is_out_of_range,
            Error::AmountOutofLimitRange(limits.mint_min, limits.mint_max, amount)
        );

        Ok(())
    }

    /// Create new mint bolt11 quote
    ///
    /// Asks the Lightning backend for an invoice and stores the quote as `UNPAID`. The quote
    /// expires with the invoice or after the mint quote ttl, whichever comes first. No quote is
    /// stored if the backend fails.
    #[instrument(skip_all)]
    pub async fn get_mint_bolt11_quote(
        &self,
        mint_quote_request: MintQuoteBolt11Request,
    ) -> Result<MintQuoteBolt11Response, Error> {
        let MintQuoteBolt11Request { amount, unit } = mint_quote_request;

        self.check_mint_request_acceptable(amount, &unit)?;

        let ln = self.ln_backend(&unit)?;

        let quote_expiry = unix_time() + self.quote_ttl.mint_ttl;

        let description = self.invoice_description.clone().unwrap_or_default();

        let create_invoice_response = ln
            .create_invoice(amount, &unit, description, quote_expiry)
            .await
            .map_err(|err| {
                tracing::error!("Could not create invoice: {}", err);
                Error::from(err)
            })?;

        let expiry = create_invoice_response
            .expiry
            .map_or(quote_expiry, |expiry| expiry.min(quote_expiry));

        let quote = MintQuote::new(
            create_invoice_response.request.to_string(),
            unit.clone(),
            amount,
            expiry,
            create_invoice_response.request_lookup_id.clone(),
        );

        tracing::debug!(
            "New mint quote {} for {} {} with request id {}",
            quote.id,
            amount,
            unit,
            create_invoice_response.request_lookup_id
        );

        self.localstore.add_mint_quote(quote.clone()).await?;

        Ok(quote.into())
    }

    /// Check mint quote
    ///
    /// Expires the quote if it is due, otherwise asks the backend whether an unpaid quote has
    /// been paid in the meantime.
    #[instrument(skip(self))]
    pub async fn check_mint_quote(&self, quote_id: &Uuid) -> Result<MintQuoteBolt11Response, Error> {
        let mut quote = self
            .localstore
            .get_mint_quote(quote_id)
            .await?
            .ok_or(Error::UnknownQuote)?;

        self.expire_mint_quote(&mut quote, unix_time()).await?;

        self.check_mint_quote_paid(&mut quote).await?;

        Ok(quote.into())
    }

    /// Get all mint quotes
    #[instrument(skip_all)]
    pub async fn mint_quotes(&self) -> Result<Vec<MintQuote>, Error> {
        Ok(self.localstore.get_mint_quotes().await?)
    }

    /// Flag mint quote as paid
    ///
    /// Called with the id the backend reported a settled invoice for. Unknown ids are logged and
    /// ignored, settlement of a quote that is already paid or issued is a no-op.
    #[instrument(skip_all)]
    pub async fn pay_mint_quote_for_request_id(&self, request_lookup_id: &str) -> Result<(), Error> {
        match self
            .localstore
            .get_mint_quote_by_request_lookup_id(request_lookup_id)
            .await?
        {
            Some(mint_quote) => self.pay_mint_quote(&mint_quote).await,
            None => {
                tracing::warn!(
                    "Could not get request for request lookup id {}.",
                    request_lookup_id
                );
                Ok(())
            }
        }
    }

    /// Mark mint quote as paid
    ///
    /// A quote past its expiry is expired instead and the settlement rejected.
    #[instrument(skip_all)]
    pub async fn pay_mint_quote(&self, mint_quote: &MintQuote) -> Result<(), Error> {
        let now = unix_time();

        let mut quote = mint_quote.clone();
        self.expire_mint_quote(&mut quote, now).await?;

        if quote.state == MintQuoteState::Expired {
            tracing::warn!(
                "Payment received for expired mint quote {}, expired at {}",
                quote.id,
                quote.expiry
            );
            return Err(Error::ExpiredQuote(quote.expiry, now));
        }

        match self.localstore.set_mint_quote_paid(&quote.id, now).await {
            Ok(MintQuoteState::Unpaid) => {
                tracing::info!("Received payment for mint quote {}", quote.id);
                Ok(())
            }
            Ok(state) => {
                tracing::debug!(
                    "Mint quote {} is already {}, ignoring settlement",
                    quote.id,
                    state
                );
                Ok(())
            }
            Err(err) => Err(quote_transition_error(err, quote.expiry, now)),
        }
    }

    /// Process mint request
    ///
    /// Signs the outputs of a paid quote. The quote is held `PENDING` while signing so a
    /// concurrent request for the same quote fails, and returns to `PAID` if signing fails.
    #[instrument(skip_all)]
    pub async fn process_mint_request(
        &self,
        mint_request: MintBolt11Request,
    ) -> Result<MintBolt11Response, Error> {
        let quote_id = Uuid::from_str(&mint_request.quote)?;
        let now = unix_time();

        let mut quote = self
            .localstore
            .get_mint_quote(&quote_id)
            .await?
            .ok_or(Error::UnknownQuote)?;

        self.expire_mint_quote(&mut quote, now).await?;
        self.check_mint_quote_paid(&mut quote).await?;

        match quote.state {
            MintQuoteState::Unpaid => return Err(Error::UnpaidQuote),
            MintQuoteState::Pending => return Err(Error::PendingQuote),
            MintQuoteState::Issued => return Err(Error::IssuedQuote),
            MintQuoteState::Expired => return Err(Error::ExpiredQuote(quote.expiry, now)),
            MintQuoteState::Paid => (),
        }

        let verification = self.verify_outputs(&mint_request.outputs).await?;

        ensure_cmk!(verification.unit == quote.unit, Error::UnitMismatch);
        ensure_cmk!(
            verification.amount == quote.amount,
            Error::TransactionUnbalanced(quote.amount.into(), verification.amount.into(), 0)
        );

        self.localstore
            .update_mint_quote_state(&quote.id, MintQuoteState::Pending)
            .await
            .map_err(|err| quote_transition_error(err, quote.expiry, now))?;

        let signatures = match self.sign_mint_outputs(&mint_request, &quote_id).await {
            Ok(signatures) => signatures,
            Err(err) => {
                tracing::warn!("Could not issue mint quote {}: {}", quote_id, err);

                if let Err(rollback_err) = self
                    .localstore
                    .update_mint_quote_state(&quote_id, MintQuoteState::Paid)
                    .await
                {
                    tracing::error!(
                        "Could not return mint quote {} to paid: {}",
                        quote_id,
                        rollback_err
                    );
                }

                return Err(err);
            }
        };

        self.localstore
            .update_mint_quote_state(&quote_id, MintQuoteState::Issued)
            .await?;

        tracing::debug!(
            "Issued {} signatures for mint quote {}",
            signatures.len(),
            quote_id
        );

        Ok(MintBolt11Response { signatures })
    }

    /// Sign the outputs of a mint request and store the signatures with the quote
    async fn sign_mint_outputs(
        &self,
        mint_request: &MintBolt11Request,
        quote_id: &Uuid,
    ) -> Result<Vec<BlindSignature>, Error> {
        let mut blind_signatures = Vec::with_capacity(mint_request.outputs.len());

        for blinded_message in mint_request.outputs.iter() {
            blind_signatures.push(self.blind_sign(blinded_message).await?);
        }

        let blinded_messages: Vec<PublicKey> = mint_request
            .outputs
            .iter()
            .map(|b| b.blinded_secret)
            .collect();

        match self
            .localstore
            .add_blind_signatures(&blinded_messages, &blind_signatures, Some(*quote_id))
            .await
        {
            Ok(()) => Ok(blind_signatures),
            Err(database::Error::Duplicate) => Err(Error::BlindedMessageAlreadySigned),
            Err(err) => Err(err.into()),
        }
    }
}
