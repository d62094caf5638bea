//! PostgREST-style client for the external data store.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;

use super::{DataStore, Filters, StoreError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// REST implementation of the data-store contract.
///
/// Equality filters map to `column=eq.value` query parameters; upserts use
/// the `resolution=merge-duplicates` preference with an `on_conflict`
/// column list.
pub struct RestStore {
    client: Client,
    base_url: String,
}

impl RestStore {
    pub fn new(base_url: &str, service_key: &str) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = format!("Bearer {}", service_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer).map_err(|e| StoreError::Config(e.to_string()))?,
        );
        headers.insert(
            "apikey",
            HeaderValue::from_str(service_key).map_err(|e| StoreError::Config(e.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/rest/v1/{}", self.base_url, table))
    }

    fn eq_filters(filters: Filters<'_>) -> Vec<(String, String)> {
        filters
            .iter()
            .map(|(column, value)| (column.to_string(), format!("eq.{}", value)))
            .collect()
    }

    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl DataStore for RestStore {
    async fn fetch(&self, table: &str, filters: Filters<'_>) -> Result<Vec<Value>, StoreError> {
        let response = self
            .request(Method::GET, table)
            .query(&Self::eq_filters(filters))
            .send()
            .await?;
        let rows = Self::check(response).await?.json::<Vec<Value>>().await?;
        Ok(rows)
    }

    async fn insert(&self, table: &str, rows: Value) -> Result<(), StoreError> {
        let response = self.request(Method::POST, table).json(&rows).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn upsert(&self, table: &str, rows: Value, on_conflict: &str) -> Result<(), StoreError> {
        let response = self
            .request(Method::POST, table)
            .header("Prefer", "resolution=merge-duplicates")
            .query(&[("on_conflict", on_conflict)])
            .json(&rows)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn update(
        &self,
        table: &str,
        filters: Filters<'_>,
        patch: Value,
    ) -> Result<(), StoreError> {
        let response = self
            .request(Method::PATCH, table)
            .query(&Self::eq_filters(filters))
            .json(&patch)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, filters: Filters<'_>) -> Result<(), StoreError> {
        let response = self
            .request(Method::DELETE, table)
            .query(&Self::eq_filters(filters))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
