//! Mintd settings, read from `config.toml`

use std::path::PathBuf;

use bitcoin::hashes::{sha256, Hash};
use cmk::nuts::CurrencyUnit;
use cmk::types::FeeReserve;
use cmk::Amount;
use config::{Config, ConfigError, File};
use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize)]
pub struct Info {
    pub mnemonic: String,
    pub input_fee_ppk: Option<u64>,
    pub mint_quote_ttl: u64,
    pub melt_quote_ttl: u64,
    pub melt_payment_timeout_secs: u64,
    pub expiry_sweep_interval_secs: u64,
}

impl Default for Info {
    fn default() -> Self {
        Self {
            mnemonic: String::new(),
            input_fee_ppk: None,
            mint_quote_ttl: 3600,
            melt_quote_ttl: 60,
            melt_payment_timeout_secs: 60,
            expiry_sweep_interval_secs: 30,
        }
    }
}

impl std::fmt::Debug for Info {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mnemonic_hash = sha256::Hash::hash(self.mnemonic.as_bytes());

        f.debug_struct("Info")
            .field("mnemonic", &format!("<hashed: {}>", mnemonic_hash))
            .field("input_fee_ppk", &self.input_fee_ppk)
            .field("mint_quote_ttl", &self.mint_quote_ttl)
            .field("melt_quote_ttl", &self.melt_quote_ttl)
            .field("melt_payment_timeout_secs", &self.melt_payment_timeout_secs)
            .field("expiry_sweep_interval_secs", &self.expiry_sweep_interval_secs)
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LnBackend {
    #[default]
    None,
    FakeWallet,
    Lnd,
}

impl std::str::FromStr for LnBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fakewallet" => Ok(LnBackend::FakeWallet),
            "lnd" => Ok(LnBackend::Lnd),
            _ => Err(format!("Unknown Lightning backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ln {
    pub ln_backend: LnBackend,
    pub invoice_description: Option<String>,
    pub min_mint: Amount,
    pub max_mint: Amount,
    pub min_melt: Amount,
    pub max_melt: Amount,
    pub fee_percent: f32,
    pub reserve_fee_min: Amount,
}

impl Default for Ln {
    fn default() -> Self {
        Ln {
            ln_backend: LnBackend::default(),
            invoice_description: None,
            min_mint: 1.into(),
            max_mint: 500_000.into(),
            min_melt: 1.into(),
            max_melt: 500_000.into(),
            fee_percent: 0.02,
            reserve_fee_min: 2.into(),
        }
    }
}

impl Ln {
    /// Fee reserve held back on melts
    pub fn fee_reserve(&self) -> FeeReserve {
        FeeReserve {
            min_fee_reserve: self.reserve_fee_min,
            percent_fee_reserve: self.fee_percent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Lnd {
    pub address: String,
    pub cert_file: PathBuf,
    pub macaroon_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FakeWallet {
    pub supported_units: Vec<CurrencyUnit>,
    /// Seconds until an invoice created by the fake wallet is settled
    pub payment_delay: Option<u64>,
}

impl Default for FakeWallet {
    fn default() -> Self {
        Self {
            supported_units: vec![CurrencyUnit::Sat],
            payment_delay: Some(3),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    Memory,
    #[default]
    Redb,
}

impl std::str::FromStr for DatabaseEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(DatabaseEngine::Memory),
            "redb" => Ok(DatabaseEngine::Redb),
            _ => Err(format!("Unknown database engine: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Database {
    pub engine: DatabaseEngine,
}

/// CMK settings, derived from `config.toml`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub info: Info,
    pub ln: Ln,
    pub lnd: Option<Lnd>,
    pub fake_wallet: Option<FakeWallet>,
    pub database: Database,
}

impl Settings {
    /// Read settings from `config_file_name`, layered over the defaults
    pub fn new<P>(config_file_name: P) -> Result<Self, ConfigError>
    where
        P: Into<PathBuf>,
    {
        let config_file_name: PathBuf = config_file_name.into();

        let config: Config = Config::builder()
            // use defaults
            .add_source(Config::try_from(&Settings::default())?)
            // override with file contents
            .add_source(File::from(config_file_name))
            .build()?;
        let settings: Settings = config.try_deserialize()?;

        settings.validate()?;

        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let missing = |message: &str| Err(ConfigError::Message(message.to_string()));

        match self.ln.ln_backend {
            LnBackend::None => missing("Ln backend must be set"),
            LnBackend::Lnd if self.lnd.is_none() => missing("LND backend requires a valid config."),
            LnBackend::FakeWallet if self.fake_wallet.is_none() => {
                missing("FakeWallet backend requires a valid config.")
            }
            _ => Ok(()),
        }
    }
}
