//! HTTP search backend client
//!
//! Typed wrapper over a JSON-over-HTTP search backend exposing the six
//! contract operations. Writes and deletes go to `{base}/update`, queries
//! to `{base}/select`; `commit` and `rollback` are update requests with
//! the corresponding flag.

use async_trait::async_trait;
use folio_common::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::model::{Identity, IndexRecord};

use super::{FieldQuery, SearchIndex};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Serialize)]
struct UpdateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    add: Option<&'a [IndexRecord]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delete: Option<&'a [Identity]>,
}

#[derive(Debug, Serialize)]
struct SelectRequest<'a> {
    field: &'a str,
    value: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SelectResponse {
    records: Vec<IndexRecord>,
}

#[derive(Debug, Deserialize)]
struct ExistsResponse {
    exists: bool,
}

/// HTTP implementation of [`SearchIndex`]
#[derive(Clone)]
pub struct HttpIndex {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIndex {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| IndexError::Backend(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post_update(&self, request: &UpdateRequest<'_>, query: &[(&str, &str)]) -> Result<()> {
        let response = self
            .client
            .post(self.url("update"))
            .query(query)
            .json(request)
            .send()
            .await
            .map_err(|e| IndexError::Backend(format!("update request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(IndexError::Backend(format!(
                "update request returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SearchIndex for HttpIndex {
    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn write(&self, records: &[IndexRecord]) -> Result<()> {
        debug!("staging {} records", records.len());
        self.post_update(
            &UpdateRequest {
                add: Some(records),
                delete: None,
            },
            &[],
        )
        .await
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn delete_by_identity(&self, ids: &[Identity]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        debug!("staging deletion of {} records", ids.len());
        self.post_update(
            &UpdateRequest {
                add: None,
                delete: Some(ids),
            },
            &[],
        )
        .await
    }

    #[instrument(skip(self))]
    async fn exists_by_identity(&self, id: Identity) -> Result<bool> {
        let response = self
            .client
            .get(self.url("exists"))
            .query(&[("id", id.to_string())])
            .send()
            .await
            .map_err(|e| IndexError::Backend(format!("existence check failed: {e}")))?;

        if !response.status().is_success() {
            return Err(IndexError::Backend(format!(
                "existence check returned {}",
                response.status()
            )));
        }

        let body: ExistsResponse = response
            .json()
            .await
            .map_err(|e| IndexError::Backend(format!("invalid existence response: {e}")))?;
        Ok(body.exists)
    }

    #[instrument(skip(self), fields(field = %query.field, value = %query.value))]
    async fn query_by_field(&self, query: &FieldQuery) -> Result<Vec<IndexRecord>> {
        let request = SelectRequest {
            field: &query.field,
            value: &query.value,
            kind: query.kind.map(|k| k.as_str()),
        };

        let response = self
            .client
            .post(self.url("select"))
            .json(&request)
            .send()
            .await
            .map_err(|e| IndexError::Backend(format!("select request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(IndexError::Backend(format!(
                "select request returned {}",
                response.status()
            )));
        }

        let body: SelectResponse = response
            .json()
            .await
            .map_err(|e| IndexError::Backend(format!("invalid select response: {e}")))?;

        debug!("query matched {} records", body.records.len());
        Ok(body.records)
    }

    #[instrument(skip(self))]
    async fn commit(&self) -> Result<()> {
        self.post_update(
            &UpdateRequest {
                add: None,
                delete: None,
            },
            &[("commit", "true")],
        )
        .await
    }

    #[instrument(skip(self))]
    async fn rollback(&self) -> Result<()> {
        self.post_update(
            &UpdateRequest {
                add: None,
                delete: None,
            },
            &[("rollback", "true")],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{fields, RecordKind};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_write_posts_records() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/update"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let index = HttpIndex::new(server.uri()).unwrap();
        let mut record = IndexRecord::new(Identity::new(1), RecordKind::Work);
        record.add_field(fields::PI, "PPN1");
        index.write(&[record]).await.unwrap();
    }

    #[tokio::test]
    async fn test_exists_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/exists"))
            .and(query_param("id", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "exists": true
            })))
            .mount(&server)
            .await;

        let index = HttpIndex::new(server.uri()).unwrap();
        assert!(index.exists_by_identity(Identity::new(42)).await.unwrap());
    }

    #[tokio::test]
    async fn test_query_by_field_deserializes_records() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/select"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "records": [{
                    "identity": 7,
                    "kind": "work",
                    "fields": [
                        { "name": "PI_ANCHOR", "value": "PPN-A", "language": null, "skip": false }
                    ]
                }]
            })))
            .mount(&server)
            .await;

        let index = HttpIndex::new(server.uri()).unwrap();
        let results = index
            .query_by_field(&FieldQuery::new(fields::PI_ANCHOR, "PPN-A"))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].identity, Identity::new(7));
    }

    #[tokio::test]
    async fn test_query_kind_filter_sent_to_backend() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/select"))
            .and(wiremock::matchers::body_partial_json(serde_json::json!({
                "kind": "anchor"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "records": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let index = HttpIndex::new(server.uri()).unwrap();
        let results = index
            .query_by_field(&FieldQuery::new(fields::PI, "PPN-A").with_kind(RecordKind::Anchor))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_backend_error_status_maps_to_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/update"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let index = HttpIndex::new(server.uri()).unwrap();
        let err = index.commit().await.unwrap_err();
        assert!(matches!(err, IndexError::Backend(_)));
    }
}
