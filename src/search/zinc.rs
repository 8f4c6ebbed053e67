//! ZincSearch bulk-ingest client.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{BulkResponse, Document, SearchBackend, SearchError};
use crate::config::ZincConfig;

/// Blocking HTTP client for the ZincSearch `_bulkv2` API.
#[derive(Clone)]
pub struct ZincClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
}

impl ZincClient {
    pub fn new(config: &ZincConfig) -> Result<Self, SearchError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("imapindexer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(SearchError::Http)?;

        Ok(Self {
            http,
            base_url: config.address.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check that the server answers `GET /healthz`.
    pub fn healthcheck(&self) -> Result<(), SearchError> {
        let response = self
            .http
            .get(format!("{}/healthz", self.base_url))
            .send()
            .map_err(SearchError::Http)?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            Err(SearchError::Status { status, body })
        }
    }
}

impl std::fmt::Debug for ZincClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZincClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish()
    }
}

impl SearchBackend for ZincClient {
    fn bulk_ingest(&self, index: &str, documents: &[Document]) -> Result<BulkResponse, SearchError> {
        let payload = BulkRequest {
            index,
            records: documents,
        };

        let response = self
            .http
            .post(format!("{}/api/_bulkv2", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .json(&payload)
            .send()
            .map_err(SearchError::Http)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(SearchError::Status { status, body });
        }

        let body = response.bytes().map_err(SearchError::Http)?;
        let parsed = parse_bulk_response(&body)?;
        debug!(index, records = documents.len(), accepted = parsed.accepted, "Bulk ingest done");
        Ok(parsed)
    }
}

#[derive(Debug, Serialize)]
struct BulkRequest<'a> {
    index: &'a str,
    records: &'a [Document],
}

#[derive(Debug, Deserialize)]
struct BulkReply {
    #[serde(default)]
    record_count: usize,
}

fn parse_bulk_response(body: &[u8]) -> Result<BulkResponse, SearchError> {
    let reply: BulkReply = serde_json::from_slice(body)?;
    Ok(BulkResponse {
        accepted: reply.record_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_request_shape() {
        let request = BulkRequest {
            index: "mail_index",
            records: &[],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["index"], "mail_index");
        assert!(json["records"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_parse_bulk_response() {
        let body = br#"{"message":"bulk data inserted","record_count":42}"#;
        assert_eq!(parse_bulk_response(body).unwrap().accepted, 42);

        let err = parse_bulk_response(b"<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, SearchError::Decode(_)));
    }

    #[test]
    fn test_base_url_is_trimmed() {
        let config = ZincConfig {
            address: "http://localhost:4080/".into(),
            ..Default::default()
        };
        let client = ZincClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:4080");
    }
}
