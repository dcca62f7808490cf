// 🔐 Session Manager - always hand out a usable Cigam bearer token
//
// Lifecycle:
//   cached + fresh (expires_at > now + 60s)  →  reuse
//   missing / stale / corrupted              →  authenticate, seal, store, re-read
//
// The cache entry lives max(300s, remaining - 300s), so a refresh happens
// at least five minutes before the remote expiry and never churns faster
// than every five minutes.

use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::credential::{Credential, CredentialSigner, CIGAM_CREDENTIAL_LABEL};
use crate::error::{CredentialStoreError, SessionError};
use crate::token_store::TokenStore;
use crate::transport::{HttpRequest, HttpTransport, Method};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cache key for the Cigam credential.
pub const AUTH_CACHE_KEY: &str = "cigam_auth_token";

pub const CONTENT_TYPE: &str = "application/json; charset=utf-8";

const MIN_CACHE_TTL_SECS: i64 = 300;
const REFRESH_LEAD_SECS: i64 = 300;

/// Cache lifetime for a token expiring at `expires_at`.
pub fn cache_ttl(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let remaining = (expires_at - now).num_seconds();
    let secs = (remaining - REFRESH_LEAD_SECS).max(MIN_CACHE_TTL_SECS);
    Duration::from_secs(secs as u64)
}

/// Parse the ISO 8601 expiry sent by the auth endpoint. Timestamps without an
/// offset are taken as UTC.
pub fn parse_expiry(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let raw = raw.trim();
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(rfc_err) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Utc.from_utc_datetime(&naive))
            .map_err(|_| rfc_err),
    }
}

pub struct SessionManager {
    auth_url: String,
    user: String,
    password: String,
    access_header: String,
    timeout: Duration,
    reuse_margin: chrono::Duration,
    cache_key: String,
    signer: CredentialSigner,
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    auth_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new(config: &SyncConfig, transport: Arc<dyn HttpTransport>, store: Arc<dyn TokenStore>) -> Self {
        SessionManager {
            auth_url: config.auth_url(),
            user: config.user.clone(),
            password: config.password.clone(),
            access_header: config.access_header.clone(),
            timeout: config.timeout,
            reuse_margin: chrono::Duration::from_std(config.reuse_margin)
                .unwrap_or_else(|_| chrono::Duration::seconds(60)),
            cache_key: config.credential_cache_key.clone(),
            signer: CredentialSigner::new(config.signing_secret.as_bytes().to_vec()),
            transport,
            store,
            clock: Arc::new(SystemClock),
            auth_lock: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Return a bearer token, authenticating only when the cached one is
    /// missing, unreadable or within the reuse margin of its expiry.
    pub fn get_token(&self) -> Result<String, SessionError> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        // Single-flight: only one caller per instance talks to the auth endpoint.
        let _guard = self.auth_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(token) = self.cached_token() {
            debug!(key = %self.cache_key, "credential refreshed by a concurrent caller");
            return Ok(token);
        }

        let credential = self.authenticate()?;
        self.store_credential(&credential)?;
        self.confirm_stored()
    }

    fn cached_token(&self) -> Option<String> {
        let sealed = match self.store.get(&self.cache_key) {
            Ok(Some(sealed)) => sealed,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %self.cache_key, error = %e, "credential store read failed, re-authenticating");
                return None;
            }
        };

        if !sealed.is_fresh_at(self.clock.now(), self.reuse_margin) {
            debug!(key = %self.cache_key, expires_at = %sealed.expires_at, "cached credential near expiry");
            return None;
        }

        match self.signer.unseal(&sealed) {
            Ok(credential) => Some(credential.raw_token),
            Err(e) => {
                warn!(key = %self.cache_key, error = %e, "cached credential failed verification, re-authenticating");
                None
            }
        }
    }

    /// Log in against the auth endpoint. Does not touch the token store.
    pub fn authenticate(&self) -> Result<Credential, SessionError> {
        if self.user.is_empty() || self.password.is_empty() {
            return Err(SessionError::Configuration(
                "Cigam API user/password are not configured".to_string(),
            ));
        }

        let basic = STANDARD.encode(format!("{}:{}", self.user, self.password));
        let request = HttpRequest::new(Method::Post, &self.auth_url)
            .header("Authorization", format!("Basic {basic}"))
            .header("Content-Type", CONTENT_TYPE)
            .header("Acesso", self.access_header.as_str())
            .json(json!({ "ParametrosRetorno": [null, null] }))
            .timeout(self.timeout);

        let response = self
            .transport
            .send(&request)
            .map_err(|e| SessionError::authentication("HTTP request failed", e))?;

        if !response.is_success() {
            return Err(SessionError::authentication(
                "auth endpoint rejected the request",
                format!("HTTP {}: {}", response.status, response.body),
            ));
        }

        let body: Value = serde_json::from_str(&response.body)
            .map_err(|e| SessionError::authentication("invalid response format", e))?;

        let credential = credential_from_response(&body)?;
        info!(expires_at = %credential.expires_at, "authenticated against Cigam");
        Ok(credential)
    }

    fn store_credential(&self, credential: &Credential) -> Result<(), SessionError> {
        let ttl = cache_ttl(credential.expires_at, self.clock.now());
        let sealed = self.signer.seal(credential);
        self.store.put(&self.cache_key, &sealed, ttl)?;
        debug!(key = %self.cache_key, ttl_secs = ttl.as_secs(), "credential cached");
        Ok(())
    }

    fn confirm_stored(&self) -> Result<String, SessionError> {
        let sealed = self
            .store
            .get(&self.cache_key)?
            .ok_or_else(|| CredentialStoreError::MissingAfterWrite(self.cache_key.clone()))?;

        let credential = self.signer.unseal(&sealed).map_err(CredentialStoreError::from)?;
        Ok(credential.raw_token)
    }
}

fn credential_from_response(body: &Value) -> Result<Credential, SessionError> {
    let grant = body.get("dados").filter(|d| d.is_object()).unwrap_or(body);

    let token = grant
        .get("token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| SessionError::authentication("invalid response format", "missing field `token`"))?;

    let expiry = ["expiraEm", "expiresAt", "expires_at"]
        .iter()
        .find_map(|field| grant.get(*field).and_then(Value::as_str))
        .ok_or_else(|| SessionError::authentication("invalid response format", "missing field `expiraEm`"))?;

    let expires_at =
        parse_expiry(expiry).map_err(|e| SessionError::authentication("invalid expiry timestamp", e))?;

    Ok(Credential::new(token.to_string(), expires_at, CIGAM_CREDENTIAL_LABEL))
}
