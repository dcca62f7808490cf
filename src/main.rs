use anyhow::{bail, Context, Result};
use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use store_sync::{
    run_import, ApiClient, BatchSource, CigamStoreSource, EcommStoreSource, ImportReport,
    ReconciliationEngine, ReqwestTransport, SessionManager, SqliteStoreRepository,
    SqliteTokenStore, SyncConfig,
};

const USAGE: &str = "usage: store-sync <stores|ecomm-stores|token>";

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    let config = SyncConfig::from_env().context("reading configuration")?;

    match command {
        Some("stores") => {
            let client = Arc::new(api_client(&config)?);
            let source = CigamStoreSource::new(
                client,
                config.stores_guid.clone(),
                config.stores_credential.clone(),
            );
            import(&config, &source)?;
        }
        Some("ecomm-stores") => {
            let Some(path) = config.ecomm_database_path.as_deref() else {
                bail!("ECOMM_DB is not set");
            };
            let source = EcommStoreSource::open(path)
                .with_context(|| format!("opening e-commerce database {}", path.display()))?;
            import(&config, &source)?;
        }
        Some("token") => {
            let session = session(&config)?;
            session.get_token().context("obtaining Cigam token")?;
            println!("✅ Cigam token cached under `{}`", session.cache_key());
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }

    Ok(())
}

fn session(config: &SyncConfig) -> Result<SessionManager> {
    let transport = Arc::new(ReqwestTransport::new().context("building HTTP client")?);
    let store = Arc::new(
        SqliteTokenStore::open(&config.token_cache_path)
            .with_context(|| format!("opening token cache {}", config.token_cache_path.display()))?,
    );
    Ok(SessionManager::new(config, transport, store))
}

fn api_client(config: &SyncConfig) -> Result<ApiClient> {
    let transport = Arc::new(ReqwestTransport::new().context("building HTTP client")?);
    let session = Arc::new(session(config)?);
    Ok(ApiClient::new(config, session, transport))
}

fn import<S: BatchSource>(config: &SyncConfig, source: &S) -> Result<ImportReport> {
    let mut repository = SqliteStoreRepository::open(&config.database_path)?;
    let engine = ReconciliationEngine::new(source.feed());

    let report = run_import(source, &mut repository, &engine)
        .with_context(|| format!("importing stores from {}", source.name()))?;

    println!("✅ {}", report.summary());
    println!("✓ {} stores in {}", repository.verify_count()?, config.database_path.display());

    Ok(report)
}
