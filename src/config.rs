//! Runtime configuration for store imports.

use crate::error::ConfigError;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.cigamgestor.com.br";
pub const DEFAULT_AUTH_PATH: &str = "/autenticacao/autenticar";
pub const DEFAULT_DATA_PATH: &str = "/api/Consulta/ObterCarga";
pub const DEFAULT_ACCESS_HEADER: &str = "live!";
pub const DEFAULT_STORES_GUID: &str = "CIGAM_LOJAS";

/// Configuration for the Cigam client and the local databases.
#[derive(Clone)]
pub struct SyncConfig {
    /// Cigam API base URL.
    pub base_url: String,
    /// Login endpoint, relative to `base_url`.
    pub auth_path: String,
    /// Data query endpoint, relative to `base_url`.
    pub data_path: String,
    pub user: String,
    pub password: String,
    /// Secret used to sign the cached token.
    pub signing_secret: String,
    /// Value of the `Acesso` header.
    pub access_header: String,
    /// Network timeout for every Cigam request.
    pub timeout: Duration,
    /// A cached token is reused only while it expires later than this.
    pub reuse_margin: Duration,
    pub credential_cache_key: String,
    /// Query GUID for the store listing.
    pub stores_guid: String,
    /// `credencial` value sent with the store listing query.
    pub stores_credential: String,
    /// Authoritative stores database.
    pub database_path: PathBuf,
    /// File backing the token cache.
    pub token_cache_path: PathBuf,
    /// E-commerce catalog database, if that feed is enabled.
    pub ecomm_database_path: Option<PathBuf>,
}

impl SyncConfig {
    pub fn new(user: impl Into<String>, password: impl Into<String>, signing_secret: impl Into<String>) -> Self {
        SyncConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_path: DEFAULT_AUTH_PATH.to_string(),
            data_path: DEFAULT_DATA_PATH.to_string(),
            user: user.into(),
            password: password.into(),
            signing_secret: signing_secret.into(),
            access_header: DEFAULT_ACCESS_HEADER.to_string(),
            timeout: Duration::from_secs(30),
            reuse_margin: Duration::from_secs(60),
            credential_cache_key: crate::session::AUTH_CACHE_KEY.to_string(),
            stores_guid: DEFAULT_STORES_GUID.to_string(),
            stores_credential: String::new(),
            database_path: PathBuf::from("stores.db"),
            token_cache_path: PathBuf::from("token_cache.db"),
            ecomm_database_path: None,
        }
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from any name → value lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        // HMAC key for the token cache; never empty.
        let Some(signing_secret) = get("STORE_SYNC_SECRET") else {
            return Err(ConfigError::InvalidValue {
                name: "STORE_SYNC_SECRET".to_string(),
                reason: "must not be empty".to_string(),
            });
        };

        let mut config = SyncConfig::new(
            get("CIGAM_USER").unwrap_or_default(),
            get("CIGAM_PASSWORD").unwrap_or_default(),
            signing_secret,
        );

        if let Some(url) = get("CIGAM_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(path) = get("CIGAM_AUTH_PATH") {
            config.auth_path = path;
        }
        if let Some(path) = get("CIGAM_DATA_PATH") {
            config.data_path = path;
        }
        if let Some(header) = get("CIGAM_ACCESS_HEADER") {
            config.access_header = header;
        }
        if let Some(secs) = get("CIGAM_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| ConfigError::InvalidValue {
                name: "CIGAM_TIMEOUT_SECS".to_string(),
                reason: format!("`{secs}` is not a whole number of seconds"),
            })?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    name: "CIGAM_TIMEOUT_SECS".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(guid) = get("CIGAM_STORES_GUID") {
            config.stores_guid = guid;
        }
        if let Some(credential) = get("CIGAM_STORES_CREDENTIAL") {
            config.stores_credential = credential;
        }
        if let Some(path) = get("STORE_SYNC_DB") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(path) = get("STORE_SYNC_TOKEN_CACHE") {
            config.token_cache_path = PathBuf::from(path);
        }
        config.ecomm_database_path = get("ECOMM_DB").map(PathBuf::from);

        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_stores_query(mut self, guid: impl Into<String>, credential: impl Into<String>) -> Self {
        self.stores_guid = guid.into();
        self.stores_credential = credential.into();
        self
    }

    pub fn auth_url(&self) -> String {
        format!("{}{}", self.base_url, self.auth_path)
    }

    pub fn data_url(&self) -> String {
        format!("{}{}", self.base_url, self.data_path)
    }
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("base_url", &self.base_url)
            .field("auth_path", &self.auth_path)
            .field("data_path", &self.data_path)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("signing_secret", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("stores_guid", &self.stores_guid)
            .field("database_path", &self.database_path)
            .field("token_cache_path", &self.token_cache_path)
            .field("ecomm_database_path", &self.ecomm_database_path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SyncConfig::from_lookup(lookup(&[("STORE_SYNC_SECRET", "s3cr3t")])).unwrap();

        assert_eq!(config.auth_url(), "https://api.cigamgestor.com.br/autenticacao/autenticar");
        assert_eq!(config.data_url(), "https://api.cigamgestor.com.br/api/Consulta/ObterCarga");
        assert_eq!(config.access_header, "live!");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.stores_guid, "CIGAM_LOJAS");
        assert_eq!(config.credential_cache_key, "cigam_auth_token");
        assert!(config.user.is_empty());
        assert_eq!(config.signing_secret, "s3cr3t");
        assert!(config.ecomm_database_path.is_none());
    }

    #[test]
    fn test_missing_signing_secret_rejected() {
        for pairs in [&[][..], &[("STORE_SYNC_SECRET", "")][..], &[("STORE_SYNC_SECRET", "   ")][..]] {
            match SyncConfig::from_lookup(lookup(pairs)) {
                Err(ConfigError::InvalidValue { name, .. }) => assert_eq!(name, "STORE_SYNC_SECRET"),
                other => panic!("expected missing secret error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_overrides() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("CIGAM_BASE_URL", "https://cigam.internal/"),
            ("CIGAM_USER", "svc"),
            ("CIGAM_PASSWORD", " secret "),
            ("STORE_SYNC_SECRET", "s3cr3t"),
            ("CIGAM_TIMEOUT_SECS", "10"),
            ("CIGAM_STORES_CREDENTIAL", "0001"),
            ("ECOMM_DB", "/var/lib/ecomm.db"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "https://cigam.internal");
        assert_eq!(config.user, "svc");
        assert_eq!(config.password, "secret");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.stores_credential, "0001");
        assert_eq!(config.ecomm_database_path, Some(PathBuf::from("/var/lib/ecomm.db")));
    }

    #[test]
    fn test_invalid_timeout() {
        for value in ["abc", "0", "-5"] {
            let result =
                SyncConfig::from_lookup(lookup(&[("STORE_SYNC_SECRET", "s3cr3t"), ("CIGAM_TIMEOUT_SECS", value)]));
            assert!(matches!(result, Err(ConfigError::InvalidValue { .. })), "{value}");
        }
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", SyncConfig::new("svc", "hunter2", "s3cr3t"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("s3cr3t"));
    }
}
