use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "lnd")]
use anyhow::anyhow;
use async_trait::async_trait;
use cmk::mint::LnBackend;
use cmk::nuts::PaymentMethod;
#[cfg(feature = "lnd")]
use cmk::nuts::CurrencyUnit;
use cmk::types::{FeeReserve, LnKey};

use crate::config;
#[cfg(feature = "lnd")]
use crate::expand_path;

/// Turns a backend section of the config into the Lightning backends it serves
#[async_trait]
pub trait LnBackendSetup {
    async fn setup(
        &self,
        ln_backends: &mut HashMap<LnKey, LnBackend>,
        fee_reserve: FeeReserve,
    ) -> anyhow::Result<()>;
}

#[cfg(feature = "lnd")]
#[async_trait]
impl LnBackendSetup for config::Lnd {
    async fn setup(
        &self,
        ln_backends: &mut HashMap<LnKey, LnBackend>,
        fee_reserve: FeeReserve,
    ) -> anyhow::Result<()> {
        let cert_file = expand_path(
            self.cert_file
                .to_str()
                .ok_or(anyhow!("lnd cert file not defined"))?,
        )
        .ok_or(anyhow!("lnd cert file not defined"))?;

        let macaroon_file = expand_path(
            self.macaroon_file
                .to_str()
                .ok_or(anyhow!("lnd macaroon file not defined"))?,
        )
        .ok_or(anyhow!("lnd macaroon file not defined"))?;

        let lnd =
            cmk_lnd::Lnd::new(self.address.clone(), cert_file, macaroon_file, fee_reserve).await?;

        ln_backends.insert(
            LnKey::new(CurrencyUnit::Sat, PaymentMethod::Bolt11),
            Arc::new(lnd),
        );

        Ok(())
    }
}

#[cfg(feature = "fakewallet")]
#[async_trait]
impl LnBackendSetup for config::FakeWallet {
    async fn setup(
        &self,
        ln_backends: &mut HashMap<LnKey, LnBackend>,
        fee_reserve: FeeReserve,
    ) -> anyhow::Result<()> {
        for unit in &self.supported_units {
            let ln_key = LnKey::new(unit.clone(), PaymentMethod::Bolt11);

            let wallet = Arc::new(cmk_fake_wallet::FakeWallet::new(
                fee_reserve.clone(),
                unit.clone(),
                self.payment_delay,
            ));

            ln_backends.insert(ln_key, wallet);
        }

        Ok(())
    }
}
