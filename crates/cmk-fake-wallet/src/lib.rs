//! CMK Fake LN Backend
//!
//! Used for testing where quotes are auto filled.

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::hashes::{sha256, Hash};
use bitcoin::hex::DisplayHex;
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use cmk_common::amount::{self, to_unit, Amount};
use cmk_common::common::FeeReserve;
use cmk_common::lightning::{
    self, CreateInvoiceResponse, MintLightning, PayInvoiceResponse, PaymentQuoteResponse, Settings,
};
use cmk_common::mint::MeltQuote;
use cmk_common::nuts::{CurrencyUnit, MeltQuoteBolt11Request, MeltQuoteState, MintQuoteState};
use cmk_common::util::unix_time;
use error::Error;
use futures::Stream;
use lightning_invoice::{Bolt11Invoice, Currency, InvoiceBuilder, PaymentSecret};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::time;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::instrument;

pub mod error;

/// Fake Wallet
#[derive(Debug, Clone)]
pub struct FakeWallet {
    fee_reserve: FeeReserve,
    unit: CurrencyUnit,
    sender: mpsc::UnboundedSender<String>,
    receiver: Arc<Mutex<Option<mpsc::UnboundedReceiver<String>>>>,
    incoming_states: Arc<Mutex<HashMap<String, MintQuoteState>>>,
    payment_states: Arc<Mutex<HashMap<String, PayInvoiceResponse>>>,
    failed_payment_check: Arc<Mutex<HashSet<String>>>,
    payment_delay: Option<u64>,
}

impl FakeWallet {
    /// Create new [`FakeWallet`]
    ///
    /// With `payment_delay` every invoice is settled that many seconds after it is created.
    /// Without it invoices stay unpaid until [`FakeWallet::settle_invoice`] is called.
    pub fn new(fee_reserve: FeeReserve, unit: CurrencyUnit, payment_delay: Option<u64>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();

        Self {
            fee_reserve,
            unit,
            sender,
            receiver: Arc::new(Mutex::new(Some(receiver))),
            incoming_states: Arc::new(Mutex::new(HashMap::new())),
            payment_states: Arc::new(Mutex::new(HashMap::new())),
            failed_payment_check: Arc::new(Mutex::new(HashSet::new())),
            payment_delay,
        }
    }

    /// Settle an invoice this wallet created
    ///
    /// Marks the invoice paid and announces it on the [`MintLightning::wait_any_invoice`]
    /// stream. Settling an invoice twice only announces it once.
    #[instrument(skip(self))]
    pub async fn settle_invoice(&self, request_lookup_id: &str) -> Result<(), Error> {
        settle(
            &self.incoming_states,
            &self.sender,
            request_lookup_id.to_string(),
        )
        .await
    }
}

async fn settle(
    incoming_states: &Mutex<HashMap<String, MintQuoteState>>,
    sender: &mpsc::UnboundedSender<String>,
    request_lookup_id: String,
) -> Result<(), Error> {
    let mut states = incoming_states.lock().await;

    let state = states
        .get_mut(&request_lookup_id)
        .ok_or(Error::UnknownInvoice)?;

    if *state == MintQuoteState::Paid {
        return Ok(());
    }

    *state = MintQuoteState::Paid;

    if sender.send(request_lookup_id.clone()).is_err() {
        tracing::error!("Failed to send paid invoice: {}", request_lookup_id);
    }

    Ok(())
}

/// Struct for signaling what methods should respond via invoice description
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct FakeInvoiceDescription {
    /// State to be returned from pay invoice state
    pub pay_invoice_state: MeltQuoteState,
    /// State to be returned by check payment state
    pub check_payment_state: MeltQuoteState,
    /// Should pay invoice error
    pub pay_err: bool,
    /// Should check failure
    pub check_err: bool,
    /// Seconds pay invoice takes before returning
    #[serde(default)]
    pub pay_delay_secs: u64,
}

impl Default for FakeInvoiceDescription {
    fn default() -> Self {
        Self {
            pay_invoice_state: MeltQuoteState::Paid,
            check_payment_state: MeltQuoteState::Paid,
            pay_err: false,
            check_err: false,
            pay_delay_secs: 0,
        }
    }
}

#[async_trait]
impl MintLightning for FakeWallet {
    type Err = lightning::Error;

    fn get_settings(&self) -> Settings {
        Settings {
            mpp: false,
            unit: self.unit.clone(),
            invoice_description: true,
        }
    }

    #[instrument(skip_all)]
    async fn wait_any_invoice(
        &self,
    ) -> Result<Pin<Box<dyn Stream<Item = String> + Send>>, Self::Err> {
        tracing::info!("Starting stream for fake invoices");

        let receiver = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or(Error::NoReceiver)?;

        Ok(Box::pin(UnboundedReceiverStream::new(receiver)))
    }

    #[instrument(skip_all)]
    async fn get_payment_quote(
        &self,
        melt_quote_request: &MeltQuoteBolt11Request,
    ) -> Result<PaymentQuoteResponse, Self::Err> {
        let amount_msat = melt_quote_request
            .request
            .amount_milli_satoshis()
            .ok_or(Error::UnknownInvoiceAmount)?;

        let amount = to_unit(amount_msat, &CurrencyUnit::Msat, &melt_quote_request.unit)?;

        Ok(PaymentQuoteResponse {
            request_lookup_id: melt_quote_request.request.payment_hash().to_string(),
            amount,
            fee: self.fee_reserve.reserve_for(amount),
            state: MeltQuoteState::Unpaid,
        })
    }

    #[instrument(skip_all)]
    async fn pay_invoice(
        &self,
        melt_quote: MeltQuote,
        max_fee_amount: Option<Amount>,
    ) -> Result<PayInvoiceResponse, Self::Err> {
        let bolt11 = Bolt11Invoice::from_str(&melt_quote.request)?;
        let payment_hash = bolt11.payment_hash().to_string();

        let description: FakeInvoiceDescription =
            serde_json::from_str(&bolt11.description().to_string()).unwrap_or_default();

        let amount_msat = bolt11
            .amount_milli_satoshis()
            .ok_or(Error::UnknownInvoiceAmount)?;
        let amount = to_unit(amount_msat, &CurrencyUnit::Msat, &melt_quote.unit)?;

        // One unit of routing fee, as long as the reserve covers it
        let routing_fee = max_fee_amount.map_or(Amount::ZERO, |max_fee| max_fee.min(Amount::ONE));
        let total_spent = amount
            .checked_add(routing_fee)
            .ok_or(amount::Error::AmountOverflow)?;

        let preimage: [u8; 32] = rand::random();
        let payment_preimage = preimage.as_slice().to_lower_hex_string();

        {
            let mut payment_states = self.payment_states.lock().await;

            if payment_states
                .get(&payment_hash)
                .is_some_and(|p| p.status == MeltQuoteState::Paid)
            {
                return Err(lightning::Error::InvoiceAlreadyPaid);
            }

            let check_paid = description.check_payment_state == MeltQuoteState::Paid;

            payment_states.insert(
                payment_hash.clone(),
                PayInvoiceResponse {
                    payment_lookup_id: payment_hash.clone(),
                    payment_preimage: check_paid.then(|| payment_preimage.clone()),
                    status: description.check_payment_state,
                    total_spent: if check_paid { total_spent } else { Amount::ZERO },
                    unit: melt_quote.unit.clone(),
                },
            );
        }

        if description.check_err {
            self.failed_payment_check
                .lock()
                .await
                .insert(payment_hash.clone());
        }

        if description.pay_delay_secs > 0 {
            time::sleep(Duration::from_secs(description.pay_delay_secs)).await;
        }

        if description.pay_err {
            return Err(Error::PaymentFailed.into());
        }

        let paid = description.pay_invoice_state == MeltQuoteState::Paid;

        Ok(PayInvoiceResponse {
            payment_lookup_id: payment_hash,
            payment_preimage: paid.then_some(payment_preimage),
            status: description.pay_invoice_state,
            total_spent: if paid { total_spent } else { Amount::ZERO },
            unit: melt_quote.unit,
        })
    }

    #[instrument(skip_all)]
    async fn create_invoice(
        &self,
        amount: Amount,
        unit: &CurrencyUnit,
        description: String,
        unix_expiry: u64,
    ) -> Result<CreateInvoiceResponse, Self::Err> {
        let amount_msat = to_unit(amount, unit, &CurrencyUnit::Msat)?;

        let expiry_secs = unix_expiry.saturating_sub(unix_time());

        let invoice = create_fake_invoice(amount_msat.into(), description, expiry_secs)?;
        let request_lookup_id = invoice.payment_hash().to_string();

        self.incoming_states
            .lock()
            .await
            .insert(request_lookup_id.clone(), MintQuoteState::Unpaid);

        if let Some(payment_delay) = self.payment_delay {
            let incoming_states = Arc::clone(&self.incoming_states);
            let sender = self.sender.clone();
            let lookup_id = request_lookup_id.clone();

            tokio::spawn(async move {
                time::sleep(Duration::from_secs(payment_delay)).await;

                if let Err(err) = settle(&incoming_states, &sender, lookup_id).await {
                    tracing::error!("Could not settle fake invoice: {}", err);
                }
            });
        }

        Ok(CreateInvoiceResponse {
            request_lookup_id,
            request: invoice,
            expiry: Some(unix_expiry),
        })
    }

    #[instrument(skip(self))]
    async fn check_incoming_invoice_status(
        &self,
        request_lookup_id: &str,
    ) -> Result<MintQuoteState, Self::Err> {
        let state = self
            .incoming_states
            .lock()
            .await
            .get(request_lookup_id)
            .copied()
            .ok_or(Error::UnknownInvoice)?;

        Ok(state)
    }

    #[instrument(skip(self))]
    async fn check_outgoing_payment(
        &self,
        request_lookup_id: &str,
    ) -> Result<PayInvoiceResponse, Self::Err> {
        if self
            .failed_payment_check
            .lock()
            .await
            .contains(request_lookup_id)
        {
            return Err(lightning::Error::InvoicePaymentPending);
        }

        self.payment_states
            .lock()
            .await
            .get(request_lookup_id)
            .cloned()
            .ok_or(lightning::Error::UnknownPaymentState)
    }
}

/// Create fake invoice
///
/// The invoice is signed by a fixed key and pays to a random payment hash, so it can be parsed
/// but never routed.
#[instrument]
pub fn create_fake_invoice(
    amount_msat: u64,
    description: String,
    expiry_secs: u64,
) -> Result<Bolt11Invoice, Error> {
    let private_key = SecretKey::from_slice(
        &[
            0xe1, 0x26, 0xf6, 0x8f, 0x7e, 0xaf, 0xcc, 0x8b, 0x74, 0xf5, 0x4d, 0x26, 0x9f, 0xe2,
            0x06, 0xbe, 0x71, 0x50, 0x00, 0xf9, 0x4d, 0xac, 0x06, 0x7d, 0x1c, 0x04, 0xa8, 0xca,
            0x3b, 0x2d, 0xb7, 0x34,
        ][..],
    )
    .map_err(|err| Error::Invoice(err.to_string()))?;

    let payment_hash = sha256::Hash::from_byte_array(rand::random::<[u8; 32]>());
    let payment_secret = PaymentSecret([42u8; 32]);

    InvoiceBuilder::new(Currency::Bitcoin)
        .description(description)
        .payment_hash(payment_hash)
        .payment_secret(payment_secret)
        .amount_milli_satoshis(amount_msat)
        .current_timestamp()
        .expiry_time(Duration::from_secs(expiry_secs))
        .min_final_cltv_expiry_delta(144)
        .build_signed(|hash| Secp256k1::new().sign_ecdsa_recoverable(hash, &private_key))
        .map_err(|err| Error::Invoice(err.to_string()))
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn melt_quote(description: &FakeInvoiceDescription, amount_sat: u64) -> MeltQuote {
        let description = serde_json::to_string(description).expect("description");
        let invoice = create_fake_invoice(amount_sat * 1000, description, 3600).expect("invoice");

        MeltQuote::new(
            invoice.to_string(),
            CurrencyUnit::Sat,
            Amount::from(amount_sat),
            Amount::from(2),
            unix_time() + 60,
            invoice.payment_hash().to_string(),
        )
    }

    #[tokio::test]
    async fn invoice_stays_unpaid_until_settled() {
        let wallet = FakeWallet::new(FeeReserve::default(), CurrencyUnit::Sat, None);
        let mut stream = wallet.wait_any_invoice().await.expect("stream");

        let invoice = wallet
            .create_invoice(
                Amount::from(100),
                &CurrencyUnit::Sat,
                String::new(),
                unix_time() + 600,
            )
            .await
            .expect("invoice");

        assert_eq!(invoice.request.amount_milli_satoshis(), Some(100_000));
        assert_eq!(
            wallet
                .check_incoming_invoice_status(&invoice.request_lookup_id)
                .await
                .expect("status"),
            MintQuoteState::Unpaid
        );

        wallet
            .settle_invoice(&invoice.request_lookup_id)
            .await
            .expect("settle");
        wallet
            .settle_invoice(&invoice.request_lookup_id)
            .await
            .expect("settle twice");

        assert_eq!(
            wallet
                .check_incoming_invoice_status(&invoice.request_lookup_id)
                .await
                .expect("status"),
            MintQuoteState::Paid
        );
        assert_eq!(stream.next().await, Some(invoice.request_lookup_id));
        assert!(wallet.wait_any_invoice().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn invoice_is_settled_after_payment_delay() {
        let wallet = FakeWallet::new(FeeReserve::default(), CurrencyUnit::Sat, Some(5));
        let mut stream = wallet.wait_any_invoice().await.expect("stream");

        let invoice = wallet
            .create_invoice(
                Amount::from(8),
                &CurrencyUnit::Sat,
                String::new(),
                unix_time() + 600,
            )
            .await
            .expect("invoice");

        assert_eq!(stream.next().await, Some(invoice.request_lookup_id.clone()));
        assert_eq!(
            wallet
                .check_incoming_invoice_status(&invoice.request_lookup_id)
                .await
                .expect("status"),
            MintQuoteState::Paid
        );
    }

    #[tokio::test]
    async fn quote_uses_fee_reserve() {
        let fee_reserve = FeeReserve {
            min_fee_reserve: Amount::from(2),
            percent_fee_reserve: 0.01,
        };
        let wallet = FakeWallet::new(fee_reserve, CurrencyUnit::Sat, None);

        let request = create_fake_invoice(1_000_000, String::new(), 3600).expect("invoice");
        let quote = wallet
            .get_payment_quote(&MeltQuoteBolt11Request {
                request: request.clone(),
                unit: CurrencyUnit::Sat,
            })
            .await
            .expect("quote");

        assert_eq!(quote.amount, Amount::from(1000));
        assert_eq!(quote.fee, Amount::from(10));
        assert_eq!(quote.request_lookup_id, request.payment_hash().to_string());
    }

    #[tokio::test]
    async fn scripted_pending_payment_resolves_on_check() {
        let wallet = FakeWallet::new(FeeReserve::default(), CurrencyUnit::Sat, None);

        let description = FakeInvoiceDescription {
            pay_invoice_state: MeltQuoteState::Pending,
            ..Default::default()
        };
        let quote = melt_quote(&description, 10);

        let paid = wallet
            .pay_invoice(quote.clone(), Some(quote.fee_reserve))
            .await
            .expect("pay");
        assert_eq!(paid.status, MeltQuoteState::Pending);
        assert_eq!(paid.total_spent, Amount::ZERO);

        let checked = wallet
            .check_outgoing_payment(&quote.request_lookup_id)
            .await
            .expect("check");
        assert_eq!(checked.status, MeltQuoteState::Paid);
        assert_eq!(checked.total_spent, Amount::from(11));
        assert!(checked.payment_preimage.is_some());
    }

    #[tokio::test]
    async fn paying_twice_is_rejected() {
        let wallet = FakeWallet::new(FeeReserve::default(), CurrencyUnit::Sat, None);
        let quote = melt_quote(&FakeInvoiceDescription::default(), 10);

        let paid = wallet
            .pay_invoice(quote.clone(), Some(quote.fee_reserve))
            .await
            .expect("pay");
        assert_eq!(paid.status, MeltQuoteState::Paid);

        assert!(matches!(
            wallet.pay_invoice(quote, None).await,
            Err(lightning::Error::InvoiceAlreadyPaid)
        ));
    }

    #[tokio::test]
    async fn scripted_failures() {
        let wallet = FakeWallet::new(FeeReserve::default(), CurrencyUnit::Sat, None);

        let description = FakeInvoiceDescription {
            pay_err: true,
            check_err: true,
            ..Default::default()
        };
        let quote = melt_quote(&description, 10);

        assert!(wallet.pay_invoice(quote.clone(), None).await.is_err());
        assert!(matches!(
            wallet.check_outgoing_payment(&quote.request_lookup_id).await,
            Err(lightning::Error::InvoicePaymentPending)
        ));
        assert!(matches!(
            wallet.check_outgoing_payment("unknown").await,
            Err(lightning::Error::UnknownPaymentState)
        ));
    }
}
