//! Check used at mint start up
//!
//! A melt whose payment did not settle within the melt timeout, or that was in flight when the
//! mint stopped, leaves the quote and its inputs pending. These checks ask the Lightning backend
//! what happened to the payment and settle the quote accordingly.

use tracing::instrument;

use super::{Error, MeltQuoteState, Mint};
use crate::amount::to_unit;

impl Mint {
    /// Resolve pending melt quotes against the Lightning backend
    ///
    /// Paid payments are finalized, failed ones refunded. Payments the backend still reports as
    /// pending, or cannot report on, are left for the next check. Returns the number of quotes
    /// resolved.
    #[instrument(skip_all)]
    pub async fn check_pending_melt_quotes(&self) -> Result<usize, Error> {
        let pending_quotes: Vec<_> = self
            .localstore
            .get_melt_quotes()
            .await?
            .into_iter()
            .filter(|q| q.state == MeltQuoteState::Pending)
            .collect();

        tracing::info!("There are {} pending melt quotes.", pending_quotes.len());

        let mut resolved = 0;

        for pending_quote in pending_quotes {
            tracing::debug!("Checking status for melt quote {}.", pending_quote.id);

            let ln_backend = match self.ln_backend(&pending_quote.unit) {
                Ok(ln) => ln,
                Err(_) => {
                    tracing::warn!("No backend for unit {}", pending_quote.unit);
                    continue;
                }
            };

            let pay_invoice_response = match ln_backend
                .check_outgoing_payment(&pending_quote.request_lookup_id)
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    tracing::error!(
                        "Could not check payment status for quote {}: {}",
                        pending_quote.id,
                        err
                    );
                    continue;
                }
            };

            match pay_invoice_response.status {
                MeltQuoteState::Paid => {
                    let total_spent = to_unit(
                        pay_invoice_response.total_spent,
                        &pay_invoice_response.unit,
                        &pending_quote.unit,
                    )?;

                    self.finalize_melt_quote(
                        &pending_quote,
                        pay_invoice_response.payment_preimage,
                        total_spent,
                    )
                    .await?;

                    resolved += 1;
                }
                MeltQuoteState::Unpaid | MeltQuoteState::Expired => {
                    tracing::info!(
                        "Lightning payment for quote {} failed, releasing inputs",
                        pending_quote.id
                    );

                    self.refund_melt_quote(&pending_quote).await?;

                    resolved += 1;
                }
                MeltQuoteState::Pending => {
                    tracing::debug!("Melt quote {} is still pending", pending_quote.id);
                }
            }
        }

        Ok(resolved)
    }
}
