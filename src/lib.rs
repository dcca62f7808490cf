// Store Sync - Core Library
// Cigam and e-commerce store feeds → authoritative `stores` table

pub mod error;
pub mod config;
pub mod clock;
pub mod credential;     // Signed credential at rest
pub mod token_store;    // Durable token cache
pub mod transport;      // HTTP seam (reqwest / mock)
pub mod session;        // Bearer token lifecycle
pub mod api_client;     // Authenticated Cigam calls
pub mod entities;       // Stores & franchises
pub mod normalizer;
pub mod reconciliation; // Dedup + franchise resolution → upsert batch
pub mod db;             // Schema, repository, audit trail
pub mod sources;        // Cigam API / e-commerce DB feeds
pub mod import;         // One import run

// Re-export commonly used types
pub use config::SyncConfig;
pub use clock::{Clock, FixedClock, SystemClock};
pub use credential::{Credential, CredentialSigner, SealedCredential};
pub use token_store::{MemoryTokenStore, SqliteTokenStore, TokenStore};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, MockTransport, ReqwestTransport};
pub use session::{cache_ttl, SessionManager};
pub use api_client::ApiClient;
pub use entities::{
    Franchise, FranchiseAlias, FranchiseLookup,
    NaturalKey, StoreCandidate, StoreField, StoreRecord,
};
pub use normalizer::{detect_franchise_alias, normalize_cigam_store, normalize_cnpj, normalize_ecomm_store};
pub use reconciliation::{ReconcileOutcome, ReconcileStats, ReconciliationEngine, StoreFeed, UpsertBatch};
pub use db::{setup_database, SqliteStoreRepository, StoreRepository, SyncEvent};
pub use sources::{BatchSource, CigamStoreSource, EcommStoreSource};
pub use import::{run_import, run_import_with_clock, ImportReport};
pub use error::{
    ApiError, ConfigError, CredentialError, CredentialStoreError, FetchError,
    ImportError, PersistenceError, SessionError, TransportError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
