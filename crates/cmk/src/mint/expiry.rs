//! Quote expiry
//!
//! Quotes that were never paid (mint) or never melted (melt) move to `EXPIRED` once their expiry
//! passes. The daemon sweeps on an interval, the quote paths also expire lazily so a quote past
//! its expiry is rejected even before the next sweep.

use cmk_common::database;
use cmk_common::state;
use cmk_common::util::unix_time;
use tracing::instrument;

use super::{MeltQuote, MeltQuoteState, Mint, MintQuote, MintQuoteState};
use crate::Error;

impl Mint {
    /// Move every unpaid quote past its expiry to `EXPIRED`
    ///
    /// Returns the number of mint and melt quotes expired. Quotes whose state changed since they
    /// were read are skipped.
    #[instrument(skip_all)]
    pub async fn expire_quotes(&self) -> Result<(usize, usize), Error> {
        let now = unix_time();

        let mut expired_mint_quotes = 0;
        for mut quote in self.localstore.get_mint_quotes().await? {
            if quote.is_expired(now) {
                self.expire_mint_quote(&mut quote, now).await?;

                if quote.state == MintQuoteState::Expired {
                    expired_mint_quotes += 1;
                }
            }
        }

        let mut expired_melt_quotes = 0;
        for mut quote in self.localstore.get_melt_quotes().await? {
            if quote.is_expired(now) {
                self.expire_melt_quote(&mut quote, now).await?;

                if quote.state == MeltQuoteState::Expired {
                    expired_melt_quotes += 1;
                }
            }
        }

        if expired_mint_quotes + expired_melt_quotes > 0 {
            tracing::info!(
                "Expired {} mint quotes and {} melt quotes",
                expired_mint_quotes,
                expired_melt_quotes
            );
        }

        Ok((expired_mint_quotes, expired_melt_quotes))
    }

    /// Expire a mint quote if it is unpaid and past its expiry
    ///
    /// `quote` holds the stored quote afterwards.
    pub(crate) async fn expire_mint_quote(
        &self,
        quote: &mut MintQuote,
        now: u64,
    ) -> Result<(), Error> {
        if !quote.is_expired(now) {
            return Ok(());
        }

        match self
            .localstore
            .update_mint_quote_state(&quote.id, MintQuoteState::Expired)
            .await
        {
            Ok(_) => {
                tracing::debug!("Mint quote {} expired at {}", quote.id, quote.expiry);
                quote.state = MintQuoteState::Expired;
            }
            Err(err) => {
                tracing::debug!("Mint quote {} changed before expiring: {}", quote.id, err);

                if let Some(current) = self.localstore.get_mint_quote(&quote.id).await? {
                    *quote = current;
                }
            }
        }

        Ok(())
    }

    /// Expire a melt quote if no melt started on it and it is past its expiry
    pub(crate) async fn expire_melt_quote(
        &self,
        quote: &mut MeltQuote,
        now: u64,
    ) -> Result<(), Error> {
        if !quote.is_expired(now) {
            return Ok(());
        }

        match self
            .localstore
            .update_melt_quote_state(&quote.id, MeltQuoteState::Expired, None)
            .await
        {
            Ok(_) => {
                tracing::debug!("Melt quote {} expired at {}", quote.id, quote.expiry);
                quote.state = MeltQuoteState::Expired;
            }
            Err(err) => {
                tracing::debug!("Melt quote {} changed before expiring: {}", quote.id, err);

                if let Some(current) = self.localstore.get_melt_quote(&quote.id).await? {
                    *quote = current;
                }
            }
        }

        Ok(())
    }
}

/// Map a failed quote transition, reporting an expired quote with its expiry
pub(crate) fn quote_transition_error(err: database::Error, expiry: u64, now: u64) -> Error {
    match err {
        database::Error::InvalidStateTransition(state::Error::QuoteExpired) => {
            Error::ExpiredQuote(expiry, now)
        }
        err => err.into(),
    }
}
