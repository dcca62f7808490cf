// 📥 Batch Sources - where raw store records come from
//
// CigamStoreSource → stored Cigam query (CIGAM_LOJAS) over the API client
// EcommStoreSource → `our_stores` table of the e-commerce database

use crate::api_client::ApiClient;
use crate::error::FetchError;
use crate::reconciliation::StoreFeed;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub trait BatchSource {
    /// Short name used in logs, events and errors.
    fn name(&self) -> &str;

    fn feed(&self) -> StoreFeed;

    /// Fetch one full batch of raw records.
    fn fetch_batch(&self) -> Result<Vec<Value>, FetchError>;
}

// ============================================================================
// CIGAM
// ============================================================================

pub struct CigamStoreSource {
    client: Arc<ApiClient>,
    guid: String,
    credential: String,
}

impl CigamStoreSource {
    pub fn new(client: Arc<ApiClient>, guid: impl Into<String>, credential: impl Into<String>) -> Self {
        CigamStoreSource {
            client,
            guid: guid.into(),
            credential: credential.into(),
        }
    }
}

impl BatchSource for CigamStoreSource {
    fn name(&self) -> &str {
        &self.guid
    }

    fn feed(&self) -> StoreFeed {
        StoreFeed::Cigam
    }

    fn fetch_batch(&self) -> Result<Vec<Value>, FetchError> {
        let payload = self
            .client
            .get_data(&self.guid, Some(&json!({ "credencial": self.credential })))?;
        let records = into_records(&self.guid, payload)?;
        info!(source = %self.guid, records = records.len(), "fetched Cigam stores");
        Ok(records)
    }
}

/// Accept a list of records; `null`, `{}` and `[]` mean no records.
pub fn into_records(source_name: &str, payload: Value) -> Result<Vec<Value>, FetchError> {
    match payload {
        Value::Null => Ok(Vec::new()),
        Value::Array(records) => Ok(records),
        Value::Object(map) if map.is_empty() => Ok(Vec::new()),
        other => Err(FetchError::UnexpectedPayload {
            source_name: source_name.to_string(),
            detail: format!("expected a list of records, got {}", shape(&other)),
        }),
    }
}

fn shape(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// E-COMMERCE
// ============================================================================

pub struct EcommStoreSource {
    conn: Connection,
}

impl EcommStoreSource {
    pub fn open(path: &Path) -> Result<Self, FetchError> {
        let conn = Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(EcommStoreSource { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        EcommStoreSource { conn }
    }
}

impl BatchSource for EcommStoreSource {
    fn name(&self) -> &str {
        "our_stores"
    }

    fn feed(&self) -> StoreFeed {
        StoreFeed::Ecommerce
    }

    fn fetch_batch(&self) -> Result<Vec<Value>, FetchError> {
        let mut stmt = self
            .conn
            .prepare("SELECT cnpj, status FROM our_stores WHERE cnpj IS NOT NULL")?;

        let records = stmt
            .query_map([], |row| {
                let mut record = Map::new();
                record.insert("cnpj".to_string(), sql_to_json(row.get_ref(0)?));
                record.insert("status".to_string(), sql_to_json(row.get_ref(1)?));
                Ok(Value::Object(record))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        info!(source = "our_stores", records = records.len(), "fetched e-commerce stores");
        Ok(records)
    }
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::SyncConfig;
    use crate::error::ApiError;
    use crate::session::SessionManager;
    use crate::token_store::MemoryTokenStore;
    use crate::transport::MockTransport;
    use chrono::{TimeZone, Utc};

    const DATA_PATH: &str = "/api/Consulta/ObterCarga";

    fn cigam_source(payload: Value) -> (Arc<MockTransport>, CigamStoreSource) {
        let config = SyncConfig::new("u", "p", "secret")
            .with_base_url("https://cigam.test")
            .with_stores_query("CIGAM_LOJAS", "0001");
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 7, 4, 7, 0, 0).unwrap()));
        let transport = Arc::new(MockTransport::new());
        transport.respond_json(
            "/autenticacao/autenticar",
            200,
            json!({"dados": {"token": "t", "expiraEm": "2025-07-04T09:00:00Z"}}),
        );
        transport.respond_json(DATA_PATH, 200, payload);

        let store = Arc::new(MemoryTokenStore::with_clock(clock.clone()));
        let session = Arc::new(SessionManager::new(&config, transport.clone(), store).with_clock(clock));
        let client = Arc::new(ApiClient::new(&config, session, transport.clone()));
        let source = CigamStoreSource::new(client, config.stores_guid.clone(), config.stores_credential.clone());
        (transport, source)
    }

    #[test]
    fn test_cigam_source_posts_credential() {
        let (transport, source) = cigam_source(json!({"dados": [{"numcnpj": "11222333000181"}]}));

        let records = source.fetch_batch().unwrap();
        assert_eq!(records, vec![json!({"numcnpj": "11222333000181"})]);

        let call = transport.requests().into_iter().find(|r| r.url.contains(DATA_PATH)).unwrap();
        assert_eq!(call.query, vec![("guid".to_string(), "CIGAM_LOJAS".to_string())]);
        assert_eq!(call.body, Some(json!({"credencial": "0001"})));
        assert_eq!(source.name(), "CIGAM_LOJAS");
        assert_eq!(source.feed(), StoreFeed::Cigam);
    }

    #[test]
    fn test_cigam_empty_payloads() {
        for payload in [json!({"dados": null}), json!({}), json!([]), json!({"dados": []})] {
            let (_, source) = cigam_source(payload.clone());
            assert!(source.fetch_batch().unwrap().is_empty(), "{payload}");
        }
    }

    #[test]
    fn test_cigam_unexpected_payload() {
        let (_, source) = cigam_source(json!({"dados": {"mensagem": "sem permissão"}}));

        match source.fetch_batch() {
            Err(FetchError::UnexpectedPayload { source_name, detail }) => {
                assert_eq!(source_name, "CIGAM_LOJAS");
                assert!(detail.contains("an object"));
            }
            other => panic!("expected unexpected payload, got {other:?}"),
        }
    }

    #[test]
    fn test_cigam_protocol_error_propagates() {
        let (transport, source) = cigam_source(json!([]));
        transport.respond_json(DATA_PATH, 500, json!({"erro": "interno"}));
        // First scripted reply is the empty list; the 500 comes next.
        source.fetch_batch().unwrap();

        let err = source.fetch_batch().unwrap_err();
        assert!(matches!(err, FetchError::Api(ApiError::Protocol { status: 500, .. })));
    }

    #[test]
    fn test_ecomm_source_reads_our_stores() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE our_stores (id INTEGER PRIMARY KEY, cnpj TEXT, status INTEGER);
             INSERT INTO our_stores (cnpj, status) VALUES ('11.222.333/0001-81', 1);
             INSERT INTO our_stores (cnpj, status) VALUES (NULL, 1);
             INSERT INTO our_stores (cnpj, status) VALUES ('22222222000122', 0);",
        )
        .unwrap();

        let source = EcommStoreSource::from_connection(conn);
        let records = source.fetch_batch().unwrap();

        assert_eq!(
            records,
            vec![
                json!({"cnpj": "11.222.333/0001-81", "status": 1}),
                json!({"cnpj": "22222222000122", "status": 0}),
            ]
        );
        assert_eq!(source.feed(), StoreFeed::Ecommerce);
    }

    #[test]
    fn test_ecomm_source_missing_table() {
        let source = EcommStoreSource::from_connection(Connection::open_in_memory().unwrap());
        assert!(matches!(source.fetch_batch(), Err(FetchError::Database(_))));
    }
}
