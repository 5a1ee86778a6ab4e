//! Catalog lookup client: list and detail commands against a single JSON
//! POST endpoint.

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected catalog response: {0}")]
    BadResponse(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogListItem {
    pub id: u64,
    pub thumb: String,
    pub title: String,
    pub cur: String,
    pub cost: f64,
}

/// Detail record. Title and intro often arrive as JSON-object strings
/// keyed by language; run them through [`parse_localized`].
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogDetail {
    pub sale_id: u64,
    pub sale_title: String,
    pub sale_intro: String,
    pub sale_pic: Vec<String>,
    #[serde(default)]
    pub sale_keys: Option<String>,
}

pub struct CatalogClient {
    endpoint: String,
    client: Client,
}

impl CatalogClient {
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .no_proxy()
                .build()
                .unwrap_or_default(),
        }
    }

    async fn command(&self, body: Value) -> Result<Value, CatalogError> {
        let res = self.client.post(&self.endpoint).json(&body).send().await?;
        if !res.status().is_success() {
            return Err(CatalogError::BadResponse(format!(
                "endpoint returned {}",
                res.status()
            )));
        }
        Ok(res.json().await?)
    }

    /// Fetch one page of the product list. Missing list data is an empty
    /// page, not an error.
    pub async fn list_products(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<CatalogListItem>, CatalogError> {
        let json = self
            .command(json!({ "cmd": "sale.stat", "page": page, "pagesize": page_size }))
            .await?;

        match json.pointer("/data/list/data") {
            Some(items) => serde_json::from_value(items.clone())
                .map_err(|e| CatalogError::BadResponse(format!("list items: {}", e))),
            None => Ok(Vec::new()),
        }
    }

    /// Fetch one product's detail record by catalog ID.
    pub async fn product_detail(&self, id: u64) -> Result<Option<CatalogDetail>, CatalogError> {
        let json = self
            .command(json!({ "cmd": "sale.detail", "id": id }))
            .await?;

        match json.pointer("/data/root/0") {
            Some(detail) => serde_json::from_value(detail.clone())
                .map(Some)
                .map_err(|e| CatalogError::BadResponse(format!("detail record: {}", e))),
            None => Ok(None),
        }
    }
}

/// Decode a possibly-localized string field: a JSON object yields its
/// first value, anything else passes through untouched.
pub fn parse_localized(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
            if let Some(Value::String(first)) = map.values().next() {
                return first.clone();
            }
        }
    }
    raw.to_string()
}
