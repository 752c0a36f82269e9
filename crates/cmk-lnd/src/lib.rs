//! CMK lightning backend for LND

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use cmk_common::amount::{to_unit, Amount};
use cmk_common::common::FeeReserve;
use cmk_common::lightning::{
    self, CreateInvoiceResponse, MintLightning, PayInvoiceResponse, PaymentQuoteResponse, Settings,
};
use cmk_common::nuts::{CurrencyUnit, MeltQuoteBolt11Request, MeltQuoteState, MintQuoteState};
use cmk_common::util::unix_time;
use cmk_common::{mint, Bolt11Invoice};
use error::Error;
use fedimint_tonic_lnd::lnrpc::fee_limit::Limit;
use fedimint_tonic_lnd::lnrpc::payment::PaymentStatus;
use fedimint_tonic_lnd::lnrpc::FeeLimit;
use fedimint_tonic_lnd::tonic::Code;
use fedimint_tonic_lnd::Client;
use futures::{Stream, StreamExt};
use tokio::sync::Mutex;
use tracing::instrument;

pub mod error;

// lnrpc.Invoice.InvoiceState
const INVOICE_OPEN: i32 = 0;
const INVOICE_SETTLED: i32 = 1;
const INVOICE_CANCELED: i32 = 2;
const INVOICE_ACCEPTED: i32 = 3;

/// Lnd mint backend
#[derive(Clone)]
pub struct Lnd {
    address: String,
    cert_file: PathBuf,
    macaroon_file: PathBuf,
    client: Arc<Mutex<Client>>,
    fee_reserve: FeeReserve,
}

impl fmt::Debug for Lnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lnd")
            .field("address", &self.address)
            .field("fee_reserve", &self.fee_reserve)
            .finish_non_exhaustive()
    }
}

impl Lnd {
    /// Create new [`Lnd`]
    pub async fn new(
        address: String,
        cert_file: PathBuf,
        macaroon_file: PathBuf,
        fee_reserve: FeeReserve,
    ) -> Result<Self, Error> {
        let client = fedimint_tonic_lnd::connect(address.to_string(), &cert_file, &macaroon_file)
            .await
            .map_err(|err| {
                tracing::error!("Connection error: {}", err.to_string());
                Error::Connection
            })?;

        Ok(Self {
            address,
            cert_file,
            macaroon_file,
            client: Arc::new(Mutex::new(client)),
            fee_reserve,
        })
    }
}

#[async_trait]
impl MintLightning for Lnd {
    type Err = lightning::Error;

    fn get_settings(&self) -> Settings {
        Settings {
            mpp: false,
            unit: CurrencyUnit::Msat,
            invoice_description: true,
        }
    }

    async fn wait_any_invoice(
        &self,
    ) -> Result<Pin<Box<dyn Stream<Item = String> + Send>>, Self::Err> {
        // The subscription gets its own connection so it does not hold the shared client lock
        let mut client =
            fedimint_tonic_lnd::connect(self.address.clone(), &self.cert_file, &self.macaroon_file)
                .await
                .map_err(|_| Error::Connection)?;

        let stream_req = fedimint_tonic_lnd::lnrpc::InvoiceSubscription {
            add_index: 0,
            settle_index: 0,
        };

        let stream = client
            .lightning()
            .subscribe_invoices(stream_req)
            .await
            .map_err(Error::from)?
            .into_inner();

        Ok(futures::stream::unfold(stream, |mut stream| async move {
            loop {
                match stream.message().await {
                    Ok(Some(invoice)) => {
                        if invoice.state == INVOICE_SETTLED {
                            return Some((hex::encode(invoice.r_hash), stream));
                        }
                    }
                    Ok(None) => {
                        tracing::info!("LND invoice stream ended.");
                        return None;
                    }
                    Err(err) => {
                        tracing::warn!("Encountered error in LND invoice stream. Stream ending");
                        tracing::error!("{:?}", err);
                        return None;
                    }
                }
            }
        })
        .boxed())
    }

    async fn get_payment_quote(
        &self,
        melt_quote_request: &MeltQuoteBolt11Request,
    ) -> Result<PaymentQuoteResponse, Self::Err> {
        payment_quote(&self.fee_reserve, melt_quote_request)
    }

    #[instrument(skip_all)]
    async fn pay_invoice(
        &self,
        melt_quote: mint::MeltQuote,
        max_fee_amount: Option<Amount>,
    ) -> Result<PayInvoiceResponse, Self::Err> {
        let fee_limit = match max_fee_amount {
            Some(max_fee) => {
                let max_fee_msat = to_unit(max_fee, &melt_quote.unit, &CurrencyUnit::Msat)?;

                Some(FeeLimit {
                    limit: Some(Limit::FixedMsat(u64::from(max_fee_msat) as i64)),
                })
            }
            None => None,
        };

        let pay_req = fedimint_tonic_lnd::lnrpc::SendRequest {
            payment_request: melt_quote.request,
            fee_limit,
            ..Default::default()
        };

        let payment_response = self
            .client
            .lock()
            .await
            .lightning()
            .send_payment_sync(fedimint_tonic_lnd::tonic::Request::new(pay_req))
            .await
            .map_err(Error::from)?
            .into_inner();

        if !payment_response.payment_error.is_empty() {
            tracing::warn!(
                "LND could not pay invoice: {}",
                payment_response.payment_error
            );

            return Ok(PayInvoiceResponse {
                payment_lookup_id: hex::encode(payment_response.payment_hash),
                payment_preimage: None,
                status: MeltQuoteState::Unpaid,
                total_spent: Amount::ZERO,
                unit: CurrencyUnit::Msat,
            });
        }

        let total_spent_msat = payment_response
            .payment_route
            .map_or(0, |route| route.total_amt_msat) as u64;

        let (status, payment_preimage) = match total_spent_msat == 0 {
            true => (MeltQuoteState::Unpaid, None),
            false => (
                MeltQuoteState::Paid,
                Some(hex::encode(payment_response.payment_preimage)),
            ),
        };

        Ok(PayInvoiceResponse {
            payment_lookup_id: hex::encode(payment_response.payment_hash),
            payment_preimage,
            status,
            total_spent: total_spent_msat.into(),
            unit: CurrencyUnit::Msat,
        })
    }

    async fn create_invoice(
        &self,
        amount: Amount,
        unit: &CurrencyUnit,
        description: String,
        unix_expiry: u64,
    ) -> Result<CreateInvoiceResponse, Self::Err> {
        let time_now = unix_time();

        if unix_expiry <= time_now {
            return Err(Error::ExpiryInPast.into());
        }

        let amount = to_unit(amount, unit, &CurrencyUnit::Msat)?;

        let invoice_request = fedimint_tonic_lnd::lnrpc::Invoice {
            value_msat: u64::from(amount) as i64,
            memo: description,
            expiry: (unix_expiry - time_now) as i64,
            ..Default::default()
        };

        let invoice = self
            .client
            .lock()
            .await
            .lightning()
            .add_invoice(fedimint_tonic_lnd::tonic::Request::new(invoice_request))
            .await
            .map_err(Error::from)?
            .into_inner();

        let bolt11 = Bolt11Invoice::from_str(&invoice.payment_request)?;

        Ok(CreateInvoiceResponse {
            request_lookup_id: bolt11.payment_hash().to_string(),
            request: bolt11,
            expiry: Some(unix_expiry),
        })
    }

    async fn check_incoming_invoice_status(
        &self,
        request_lookup_id: &str,
    ) -> Result<MintQuoteState, Self::Err> {
        let invoice_request = fedimint_tonic_lnd::lnrpc::PaymentHash {
            r_hash: hex::decode(request_lookup_id).map_err(|_| Error::InvalidHash)?,
            ..Default::default()
        };

        let invoice = self
            .client
            .lock()
            .await
            .lightning()
            .lookup_invoice(fedimint_tonic_lnd::tonic::Request::new(invoice_request))
            .await
            .map_err(|status| match status.code() {
                Code::NotFound => Error::UnknownInvoice,
                _ => Error::from(status),
            })?
            .into_inner();

        Ok(invoice_state(invoice.state)?)
    }

    async fn check_outgoing_payment(
        &self,
        payment_hash: &str,
    ) -> Result<PayInvoiceResponse, Self::Err> {
        let track_request = fedimint_tonic_lnd::routerrpc::TrackPaymentRequest {
            payment_hash: hex::decode(payment_hash).map_err(|_| Error::InvalidHash)?,
            no_inflight_updates: true,
        };

        let payment_stream = self
            .client
            .lock()
            .await
            .router()
            .track_payment_v2(track_request)
            .await;

        let mut payment_stream = match payment_stream {
            Ok(stream) => stream.into_inner(),
            // LND has no record of the payment, so it was never sent
            Err(status) if status.code() == Code::NotFound => {
                return Ok(PayInvoiceResponse {
                    payment_lookup_id: payment_hash.to_string(),
                    payment_preimage: None,
                    status: MeltQuoteState::Unpaid,
                    total_spent: Amount::ZERO,
                    unit: CurrencyUnit::Msat,
                });
            }
            Err(status) => return Err(Error::from(status).into()),
        };

        match payment_stream.message().await {
            Ok(Some(update)) => {
                let status = payment_state(update.status()).ok_or(Error::UnknownPaymentStatus)?;

                let (payment_preimage, total_spent) = match status {
                    MeltQuoteState::Paid => (
                        Some(update.payment_preimage),
                        Amount::from((update.value_msat + update.fee_msat) as u64),
                    ),
                    _ => (None, Amount::ZERO),
                };

                Ok(PayInvoiceResponse {
                    payment_lookup_id: payment_hash.to_string(),
                    payment_preimage,
                    status,
                    total_spent,
                    unit: CurrencyUnit::Msat,
                })
            }
            Ok(None) => Err(Error::UnknownPaymentStatus.into()),
            Err(err) => {
                tracing::warn!("Could not track payment {}: {}", payment_hash, err);
                Err(Error::UnknownPaymentStatus.into())
            }
        }
    }
}

/// Quote for paying the invoice of a melt request with the configured fee reserve
fn payment_quote(
    fee_reserve: &FeeReserve,
    melt_quote_request: &MeltQuoteBolt11Request,
) -> Result<PaymentQuoteResponse, lightning::Error> {
    let invoice_amount_msat = melt_quote_request
        .request
        .amount_milli_satoshis()
        .ok_or(Error::UnknownInvoiceAmount)?;

    let amount = to_unit(
        invoice_amount_msat,
        &CurrencyUnit::Msat,
        &melt_quote_request.unit,
    )?;

    Ok(PaymentQuoteResponse {
        request_lookup_id: melt_quote_request.request.payment_hash().to_string(),
        amount,
        fee: fee_reserve.reserve_for(amount),
        state: MeltQuoteState::Unpaid,
    })
}

fn invoice_state(state: i32) -> Result<MintQuoteState, Error> {
    match state {
        INVOICE_SETTLED => Ok(MintQuoteState::Paid),
        // A canceled invoice can never be paid; the mint expires the quote on its own clock
        INVOICE_OPEN | INVOICE_CANCELED | INVOICE_ACCEPTED => Ok(MintQuoteState::Unpaid),
        state => Err(Error::UnknownInvoiceState(state)),
    }
}

/// `None` when LND cannot say what happened to the payment
#[allow(unreachable_patterns)]
fn payment_state(status: PaymentStatus) -> Option<MeltQuoteState> {
    match status {
        PaymentStatus::Succeeded => Some(MeltQuoteState::Paid),
        PaymentStatus::Failed => Some(MeltQuoteState::Unpaid),
        PaymentStatus::InFlight => Some(MeltQuoteState::Pending),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_reserves_fee_in_request_unit() {
        let fee_reserve = FeeReserve {
            min_fee_reserve: Amount::from(4),
            percent_fee_reserve: 0.02,
        };

        let invoice =
            cmk_fake_wallet::create_fake_invoice(1_000_000, "".to_string(), 3600).unwrap();
        let request = MeltQuoteBolt11Request {
            request: invoice.clone(),
            unit: CurrencyUnit::Sat,
        };

        let quote = payment_quote(&fee_reserve, &request).unwrap();

        assert_eq!(quote.amount, Amount::from(1000));
        assert_eq!(quote.fee, Amount::from(20));
        assert_eq!(quote.request_lookup_id, invoice.payment_hash().to_string());
        assert_eq!(quote.state, MeltQuoteState::Unpaid);

        let small = MeltQuoteBolt11Request {
            request: cmk_fake_wallet::create_fake_invoice(10_000, "".to_string(), 3600).unwrap(),
            unit: CurrencyUnit::Sat,
        };
        assert_eq!(
            payment_quote(&fee_reserve, &small).unwrap().fee,
            Amount::from(4)
        );
    }

    #[test]
    fn only_settled_invoices_are_paid() {
        assert_eq!(invoice_state(INVOICE_SETTLED).unwrap(), MintQuoteState::Paid);

        for state in [INVOICE_OPEN, INVOICE_CANCELED, INVOICE_ACCEPTED] {
            assert_eq!(invoice_state(state).unwrap(), MintQuoteState::Unpaid);
        }

        assert!(matches!(
            invoice_state(7),
            Err(Error::UnknownInvoiceState(7))
        ));
    }

    #[test]
    fn payment_status_mapping() {
        assert_eq!(
            payment_state(PaymentStatus::Succeeded),
            Some(MeltQuoteState::Paid)
        );
        assert_eq!(
            payment_state(PaymentStatus::Failed),
            Some(MeltQuoteState::Unpaid)
        );
        assert_eq!(
            payment_state(PaymentStatus::InFlight),
            Some(MeltQuoteState::Pending)
        );
        assert_eq!(payment_state(PaymentStatus::Unknown), None);
    }
}
