// 📡 API Client - authenticated calls against the Cigam API
//
// Every request carries the bearer token from SessionManager plus the fixed
// content-type and `Acesso` headers. Failures come back as `ApiError`:
//   Session   → no token
//   Transport → network / timeout
//   Protocol  → non-2xx (JSON body, or raw text as a JSON string)
//   Decode    → 2xx with a body that is not JSON

use crate::config::SyncConfig;
use crate::error::ApiError;
use crate::session::{SessionManager, CONTENT_TYPE};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct ApiClient {
    base_url: String,
    data_path: String,
    access_header: String,
    timeout: Duration,
    session: Arc<SessionManager>,
    transport: Arc<dyn HttpTransport>,
}

impl ApiClient {
    pub fn new(config: &SyncConfig, session: Arc<SessionManager>, transport: Arc<dyn HttpTransport>) -> Self {
        ApiClient {
            base_url: config.base_url.clone(),
            data_path: config.data_path.clone(),
            access_header: config.access_header.clone(),
            timeout: config.timeout,
            session,
            transport,
        }
    }

    /// Send one authenticated request and decode the reply.
    pub fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let token = self.session.get_token()?;

        let mut request = HttpRequest::new(method, format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", CONTENT_TYPE)
            .header("Acesso", self.access_header.as_str())
            .timeout(self.timeout);
        for (name, value) in query {
            request = request.query(name, value);
        }
        if let Some(body) = body {
            request = request.json(body.clone());
        }

        debug!(method = method.as_str(), path, "calling Cigam API");
        let response = self.transport.send(&request)?;
        decode_response(response)
    }

    pub fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, ApiError> {
        self.request(Method::Get, path, query, None)
    }

    pub fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::Post, path, &[], Some(body))
    }

    pub fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.request(Method::Delete, path, &[], None)
    }

    /// Run a stored Cigam query identified by `guid`.
    pub fn get_data(&self, guid: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        let empty = json!({});
        let body = body.unwrap_or(&empty);
        let data = self.request(Method::Post, &self.data_path, &[("guid", guid)], Some(body))?;
        Ok(unwrap_envelope(data))
    }
}

fn decode_response(response: HttpResponse) -> Result<Value, ApiError> {
    if !response.is_success() {
        let body = serde_json::from_str(&response.body).unwrap_or(Value::String(response.body));
        return Err(ApiError::Protocol {
            status: response.status,
            body,
        });
    }

    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&response.body).map_err(|e| ApiError::Decode(e.to_string()))
}

/// `{"dados": x}` → `x`; anything else unchanged.
pub fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("dados") => map.remove("dados").unwrap_or(Value::Null),
        other => other,
    }
}
