use cmk_common::common::LnKey;
use cmk_common::util::unix_time;

use super::{CurrencyUnit, LnBackend, Mint, MintQuote, MintQuoteState, PaymentMethod};
use crate::Error;

impl Mint {
    /// Ln backend for a unit
    pub(crate) fn ln_backend(&self, unit: &CurrencyUnit) -> Result<&LnBackend, Error> {
        match self.ln.get(&LnKey::new(unit.clone(), PaymentMethod::Bolt11)) {
            Some(ln) => Ok(ln),
            None => {
                tracing::info!("Could not get ln backend for {}, bolt11 ", unit);

                Err(Error::UnsupportedUnit)
            }
        }
    }

    /// Check the status of an ln payment for a quote
    ///
    /// Only asks the backend while the quote is unpaid. A settled invoice moves the quote to
    /// paid, `quote` is updated with the state the quote is in afterwards.
    pub async fn check_mint_quote_paid(&self, quote: &mut MintQuote) -> Result<(), Error> {
        if quote.state != MintQuoteState::Unpaid {
            return Ok(());
        }

        let ln = self.ln_backend(&quote.unit)?;

        let ln_status = ln
            .check_incoming_invoice_status(&quote.request_lookup_id)
            .await?;

        if ln_status == MintQuoteState::Paid {
            let now = unix_time();
            let previous = self.localstore.set_mint_quote_paid(&quote.id, now).await?;

            if previous == MintQuoteState::Unpaid {
                quote.state = MintQuoteState::Paid;
                quote.paid_time = Some(now);
            } else {
                quote.state = previous;
            }
        }

        Ok(())
    }
}
