//! URL-to-blob image acquisition with relay fallback chaining.
//!
//! Bucket hosts sometimes allow direct cross-origin fetches, which is
//! fastest; when they do not, the request falls back through the primary
//! and then the backup relay. A single-shot utility, no coordination.

use crate::product::{ImageBlob, MAX_IMAGE_BYTES};
use reqwest::{Client, Url};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("image fetch failed on every route: {0}")]
    AllRoutesFailed(String),
    #[error("fetched image is {0} bytes, over the {MAX_IMAGE_BYTES} byte ceiling")]
    TooLarge(usize),
    #[error("fetched payload is not a supported image")]
    NotAnImage,
    #[error("malformed data URL")]
    BadDataUrl,
    #[error("bad relay endpoint: {0}")]
    BadRelay(String),
}

pub struct ImageFetcher {
    client: Client,
    primary_relay: Option<String>,
    backup_relay: Option<String>,
}

impl ImageFetcher {
    pub fn new(primary_relay: Option<String>, backup_relay: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .no_proxy()
                .build()
                .unwrap_or_default(),
            primary_relay,
            backup_relay,
        }
    }

    fn relay_url(relay: &str, target: &str) -> Result<String, FetchError> {
        Url::parse_with_params(relay, &[("url", target)])
            .map(|u| u.to_string())
            .map_err(|e| FetchError::BadRelay(e.to_string()))
    }

    async fn get_bytes(&self, url: &str) -> Result<(Vec<u8>, Option<String>), String> {
        let res = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            return Err(format!("status {}", res.status()));
        }
        let mime = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(';').next().unwrap_or(s).trim().to_string());
        let bytes = res.bytes().await.map_err(|e| e.to_string())?;
        Ok((bytes.to_vec(), mime))
    }

    /// Fetch `image_url` into a blob meeting the intake contract. Data
    /// URLs decode locally; remote URLs go direct, then through the relays
    /// in order.
    pub async fn fetch_image(&self, image_url: &str) -> Result<ImageBlob, FetchError> {
        Self::validate(self.fetch_raw(image_url).await?)
    }

    /// Fetch a generated output. The intake contract does not apply:
    /// no size ceiling, and an unrecognized format keeps the claimed MIME
    /// instead of failing. Generated images routinely outgrow any input
    /// we would accept.
    pub async fn fetch_artifact(&self, image_url: &str) -> Result<ImageBlob, FetchError> {
        let mut blob = self.fetch_raw(image_url).await?;
        if let Some(mime) = blob.sniffed_mime() {
            blob.mime = mime.to_string();
        }
        Ok(blob)
    }

    async fn fetch_raw(&self, image_url: &str) -> Result<ImageBlob, FetchError> {
        if image_url.starts_with("data:") {
            return ImageBlob::from_data_url(image_url).ok_or(FetchError::BadDataUrl);
        }

        let mut routes = vec![image_url.to_string()];
        if let Some(relay) = &self.primary_relay {
            routes.push(Self::relay_url(relay, image_url)?);
        }
        if let Some(relay) = &self.backup_relay {
            routes.push(Self::relay_url(relay, image_url)?);
        }

        let mut last_error = String::new();
        for route in routes {
            match self.get_bytes(&route).await {
                Ok((bytes, mime)) => {
                    return Ok(ImageBlob::new(
                        mime.unwrap_or_else(|| "image/jpeg".to_string()),
                        bytes,
                    ));
                }
                Err(e) => {
                    debug!(route = %route, error = %e, "image route failed, trying next");
                    last_error = e;
                }
            }
        }

        Err(FetchError::AllRoutesFailed(last_error))
    }

    /// Enforce the intake contract: size ceiling and a real image format.
    /// The sniffed format wins over whatever the server claimed.
    fn validate(mut blob: ImageBlob) -> Result<ImageBlob, FetchError> {
        if blob.data.len() > MAX_IMAGE_BYTES {
            return Err(FetchError::TooLarge(blob.data.len()));
        }
        match blob.sniffed_mime() {
            Some(mime) => {
                blob.mime = mime.to_string();
                Ok(blob)
            }
            None => Err(FetchError::NotAnImage),
        }
    }
}
