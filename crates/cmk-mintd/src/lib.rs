//! CMK mintd lib

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use bip39::Mnemonic;
use cmk::cmk_database::{self, MintDatabase, MintMemoryDatabase};
use cmk::mint::{Mint, MintBuilder, MintMeltLimits};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::cli::CLIArgs;
use crate::config::{DatabaseEngine, LnBackend, Settings};
use crate::setup::LnBackendSetup;

pub mod cli;
pub mod config;
pub mod setup;

const DEFAULT_WORK_DIR: &str = ".cmk-mintd";

fn expand_path(path: &str) -> Option<PathBuf> {
    if path.starts_with('~') {
        if let Some(home_dir) = home::home_dir().as_mut() {
            let remainder = path.get(2..).unwrap_or_default();
            home_dir.push(remainder);
            let expanded_path = home_dir;
            Some(expanded_path.clone())
        } else {
            None
        }
    } else {
        Some(PathBuf::from(path))
    }
}

/// Work directory from the cli, `~/.cmk-mintd` by default. Created if missing.
pub fn get_work_directory(args: &CLIArgs) -> Result<PathBuf> {
    let work_dir = match &args.work_dir {
        Some(work_dir) => work_dir.clone(),
        None => home::home_dir()
            .ok_or(anyhow!("Unknown home dir"))?
            .join(DEFAULT_WORK_DIR),
    };

    std::fs::create_dir_all(&work_dir)?;

    Ok(work_dir)
}

/// Read settings from the cli config path or `<work_dir>/config.toml`
pub fn load_settings(work_dir: &Path, config: Option<PathBuf>) -> Result<Settings> {
    let config_file = config.unwrap_or_else(|| work_dir.join("config.toml"));

    tracing::debug!("Reading config from {}", config_file.display());

    Ok(Settings::new(config_file)?)
}

/// Install the tracing subscriber: stdout plus a daily rolling file under `<work_dir>/logs`
///
/// The returned guard flushes the file writer on drop and must live as long as the process logs.
pub fn setup_tracing(work_dir: &Path) -> Result<WorkerGuard> {
    let default_filter = "debug";

    let hyper_filter = "hyper=warn";
    let h2_filter = "h2=warn";
    let tower_filter = "tower=warn";
    let rustls_filter = "rustls=warn";

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!(
            "{},{},{},{},{}",
            default_filter, hyper_filter, h2_filter, tower_filter, rustls_filter
        ))
    })?;

    let file_appender = tracing_appender::rolling::daily(work_dir.join("logs"), "cmk-mintd.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .try_init()?;

    Ok(guard)
}

async fn setup_database(
    work_dir: &Path,
    settings: &Settings,
) -> Result<Arc<dyn MintDatabase<Err = cmk_database::Error> + Send + Sync>> {
    match settings.database.engine {
        DatabaseEngine::Memory => Ok(Arc::new(MintMemoryDatabase::default())),
        #[cfg(feature = "redb")]
        DatabaseEngine::Redb => {
            let redb_path = work_dir.join("cmk-mintd.redb");
            Ok(Arc::new(cmk_redb::MintRedbDatabase::new(&redb_path)?))
        }
        #[cfg(not(feature = "redb"))]
        DatabaseEngine::Redb => {
            let _ = work_dir;
            bail!("cmk-mintd was built without redb support")
        }
    }
}

/// Build the mint described by `settings`
pub async fn build_mint(work_dir: &Path, settings: &Settings) -> Result<Mint> {
    let localstore = setup_database(work_dir, settings).await?;

    let mnemonic = Mnemonic::from_str(&settings.info.mnemonic)?;

    let fee_reserve = settings.ln.fee_reserve();
    let mut ln_backends = HashMap::new();

    match settings.ln.ln_backend {
        #[cfg(feature = "lnd")]
        LnBackend::Lnd => {
            let lnd_settings = settings.lnd.as_ref().ok_or(anyhow!("LND config not set"))?;
            lnd_settings.setup(&mut ln_backends, fee_reserve).await?;
        }
        #[cfg(feature = "fakewallet")]
        LnBackend::FakeWallet => {
            let fake_wallet = settings
                .fake_wallet
                .as_ref()
                .ok_or(anyhow!("Fake wallet config not set"))?;
            fake_wallet.setup(&mut ln_backends, fee_reserve).await?;
        }
        LnBackend::None => bail!("Ln backend must be set"),
        #[allow(unreachable_patterns)]
        ref backend => bail!("Ln backend {:?} is not enabled in this build", backend),
    }

    let limits = MintMeltLimits {
        mint_min: settings.ln.min_mint,
        mint_max: settings.ln.max_mint,
        melt_min: settings.ln.min_melt,
        melt_max: settings.ln.max_melt,
    };

    let mut mint_builder = MintBuilder::new()
        .with_localstore(localstore)
        .with_seed(mnemonic.to_seed_normalized("").to_vec())
        .with_quote_ttl(settings.info.mint_quote_ttl, settings.info.melt_quote_ttl)
        .with_melt_timeout(Duration::from_secs(
            settings.info.melt_payment_timeout_secs,
        ));

    if let Some(description) = &settings.ln.invoice_description {
        mint_builder = mint_builder.with_invoice_description(description.clone());
    }

    for (ln_key, ln_backend) in ln_backends {
        if let Some(input_fee_ppk) = settings.info.input_fee_ppk {
            mint_builder = mint_builder.with_input_fee_ppk(ln_key.unit.clone(), input_fee_ppk);
        }

        mint_builder = mint_builder.add_ln_backend(ln_key.unit, ln_key.method, limits, ln_backend);
    }

    mint_builder.build().await
}

/// Run the mint until ctrl-c
///
/// Starts the invoice subscription and the expiry sweep, and resolves melts left pending by a
/// previous run.
pub async fn run_mintd(work_dir: &Path, settings: &Settings) -> Result<()> {
    let mint = Arc::new(build_mint(work_dir, settings).await?);

    for keyset in mint.keysets().await?.keysets {
        if keyset.active {
            tracing::info!("Active keyset {} for {}", keyset.id, keyset.unit);
        }
    }

    match mint.check_pending_melt_quotes().await {
        Ok(resolved) => tracing::info!("Resolved {} pending melt quotes", resolved),
        Err(err) => tracing::error!("Could not check pending melt quotes: {}", err),
    }

    let shutdown = CancellationToken::new();
    let mut tasks = JoinSet::new();

    {
        let mint = Arc::clone(&mint);
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            if let Err(err) = mint.wait_for_paid_invoices(shutdown).await {
                tracing::error!("Invoice subscription stopped: {}", err);
            }
        });
    }

    {
        let mint = Arc::clone(&mint);
        let shutdown = shutdown.clone();
        let sweep_interval = Duration::from_secs(settings.info.expiry_sweep_interval_secs.max(1));
        tasks.spawn(async move { sweep_expired_quotes(mint, sweep_interval, shutdown).await });
    }

    tracing::info!("Mint started");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutdown signal received");

    shutdown.cancel();

    while let Some(result) = tasks.join_next().await {
        if let Err(err) = result {
            tracing::warn!("Background task failed: {}", err);
        }
    }

    tracing::info!("Mint stopped");

    Ok(())
}

async fn sweep_expired_quotes(mint: Arc<Mint>, every: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Expiry sweep stopped");
                break;
            }
            _ = interval.tick() => {
                match mint.expire_quotes().await {
                    Ok((0, 0)) => (),
                    Ok((mint_quotes, melt_quotes)) => tracing::debug!(
                        "Expired {} mint quotes and {} melt quotes",
                        mint_quotes,
                        melt_quotes
                    ),
                    Err(err) => tracing::warn!("Expiry sweep failed: {}", err),
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::env::current_dir;

    use cmk::Amount;

    use super::*;

    #[test]
    fn example_is_parsed() {
        let settings = config::Settings::new(format!(
            "{}/example.config.toml",
            current_dir().expect("cwd").to_string_lossy()
        ))
        .unwrap();

        assert_eq!(settings.ln.ln_backend, LnBackend::FakeWallet);
        assert_eq!(settings.database.engine, DatabaseEngine::Redb);
        assert_eq!(settings.info.mint_quote_ttl, 3600);
        assert_eq!(settings.ln.max_mint, Amount::from(500_000));
        assert_eq!(settings.ln.fee_reserve().min_fee_reserve, Amount::from(4));

        let fake_wallet = settings.fake_wallet.unwrap();
        assert_eq!(fake_wallet.payment_delay, Some(3));
    }

    #[test]
    fn home_is_expanded() {
        let expanded = expand_path("~/lnd/tls.cert").unwrap();
        assert!(expanded.ends_with("lnd/tls.cert"));
        assert!(!expanded.starts_with("~"));

        assert_eq!(
            expand_path("/tmp/tls.cert"),
            Some(PathBuf::from("/tmp/tls.cert"))
        );
    }

    #[cfg(feature = "fakewallet")]
    #[tokio::test]
    async fn mint_is_built_from_settings() {
        let work_dir = std::env::temp_dir();

        let settings = Settings {
            info: config::Info {
                mnemonic: Mnemonic::generate(12).unwrap().to_string(),
                input_fee_ppk: Some(100),
                ..Default::default()
            },
            ln: config::Ln {
                ln_backend: LnBackend::FakeWallet,
                ..Default::default()
            },
            fake_wallet: Some(config::FakeWallet::default()),
            database: config::Database {
                engine: DatabaseEngine::Memory,
            },
            ..Default::default()
        };

        let mint = build_mint(&work_dir, &settings).await.unwrap();

        let keysets = mint.keysets().await.unwrap().keysets;
        assert_eq!(keysets.len(), 1);
        assert!(keysets[0].active);
        assert_eq!(keysets[0].input_fee_ppk, 100);
    }
}
