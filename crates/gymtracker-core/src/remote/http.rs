//! REST client for the remote document store.
//!
//! Endpoints, relative to the configured base URL:
//! - `GET    /{collection}?uid={uid}` → `[{"id": .., "fields": {..}}]`
//! - `POST   /{collection}`           → `{"id": ..}`
//! - `PATCH  /{collection}/{id}`
//! - `DELETE /{collection}/{id}`

use std::time::Duration;

use reqwest::{header, Client};
use serde::Deserialize;
use tracing::debug;

use crate::error::RemoteError;

use super::{Document, QuerySnapshot, RemoteDocument, RemoteStore};

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: String,
}

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpRemoteStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Create a new store with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.base_url, collection)
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, id)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, RemoteError> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| RemoteError::InvalidResponse(format!("Invalid token: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(RemoteError::from_status(status, &body))
        }
    }
}

impl RemoteStore for HttpRemoteStore {
    async fn query_by_user_id(&self, collection: &str, uid: &str) -> Result<QuerySnapshot, RemoteError> {
        let url = self.collection_url(collection);
        debug!(url = %url, uid = uid, "Querying remote collection");

        let response = self
            .client
            .get(&url)
            .headers(self.auth_headers()?)
            .query(&[("uid", uid)])
            .send()
            .await?;
        let response = Self::check_response(response).await?;

        let documents: Vec<RemoteDocument> = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(format!("Failed to parse documents: {}", e)))?;
        Ok(QuerySnapshot::from_server(documents))
    }

    async fn create(&self, collection: &str, fields: Document) -> Result<String, RemoteError> {
        let url = self.collection_url(collection);
        let response = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .json(&fields)
            .send()
            .await?;
        let response = Self::check_response(response).await?;

        let created: CreateResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(format!("Failed to parse create response: {}", e)))?;
        Ok(created.id)
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> Result<(), RemoteError> {
        let url = self.document_url(collection, id);
        let response = self
            .client
            .patch(&url)
            .headers(self.auth_headers()?)
            .json(&fields)
            .send()
            .await?;
        Self::check_response(response).await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        let url = self.document_url(collection, id);
        let response = self
            .client
            .delete(&url)
            .headers(self.auth_headers()?)
            .send()
            .await?;
        Self::check_response(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_strip_trailing_slash() {
        let store = HttpRemoteStore::new("https://db.example.com/v1/").unwrap();
        assert_eq!(
            store.collection_url("routines"),
            "https://db.example.com/v1/routines"
        );
        assert_eq!(
            store.document_url("exercise_history", "abc"),
            "https://db.example.com/v1/exercise_history/abc"
        );
    }

    #[test]
    fn test_auth_header_only_with_token() {
        let store = HttpRemoteStore::new("http://localhost").unwrap();
        assert!(store.auth_headers().unwrap().is_empty());

        let authed = store.with_token("secret".to_string());
        let headers = authed.auth_headers().unwrap();
        assert_eq!(headers[header::AUTHORIZATION], "Bearer secret");
    }

    #[test]
    fn test_parse_query_response() {
        let json = r#"[{"id":"r1","fields":{"title":"Push day","uid":"u1"}},{"id":"r2"}]"#;
        let docs: Vec<RemoteDocument> = serde_json::from_str(json).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].fields["title"], "Push day");
        assert!(docs[1].fields.is_empty());
    }
}
