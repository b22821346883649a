use std::time::Duration;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

#[derive(Debug, thiserror::Error)]
pub enum PinningError {
    #[error("Pinning service is not configured")]
    NotConfigured,

    #[error("Pinning request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Pinning service returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Unexpected pinning response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PinnedFile {
    pub file_name: String,
    pub cid: String,
    pub url: String,
}

/// Uploads files to an IPFS pinning gateway (Pinata's `pinFileToIPFS` API).
pub struct PinningClient {
    client: Client,
    api_url: String,
    gateway_url: String,
    jwt: Option<String>,
}

impl PinningClient {
    pub fn new(
        api_url: impl Into<String>,
        gateway_url: impl Into<String>,
        jwt: Option<String>,
    ) -> Result<Self, PinningError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            gateway_url: gateway_url.into().trim_end_matches('/').to_string(),
            jwt,
        })
    }

    /// One multipart POST per file; no retries.
    pub async fn pin_file(
        &self,
        file_name: &str,
        content_type: Option<&str>,
        data: Bytes,
    ) -> Result<PinnedFile, PinningError> {
        let jwt = self.jwt.as_deref().ok_or(PinningError::NotConfigured)?;

        let mut part = Part::bytes(data.to_vec()).file_name(file_name.to_string());
        if let Some(mime) = content_type {
            part = part.mime_str(mime)?;
        }
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(jwt)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(PinningError::Status { status, body: text });
        }

        let pinned: PinResponse = serde_json::from_str(&text)
            .map_err(|e| PinningError::MalformedResponse(e.to_string()))?;
        if pinned.ipfs_hash.trim().is_empty() {
            return Err(PinningError::MalformedResponse("empty IpfsHash".to_string()));
        }

        info!("📌 Pinned {} as {}", file_name, pinned.ipfs_hash);
        Ok(PinnedFile {
            file_name: file_name.to_string(),
            url: format!("{}/{}", self.gateway_url, pinned.ipfs_hash),
            cid: pinned.ipfs_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Multipart;
    use axum::http::HeaderMap;
    use axum::{routing::post, Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/pinning/pinFileToIPFS")
    }

    #[tokio::test]
    async fn pinned_file_url_uses_gateway_and_hash() {
        let url = serve(Router::new().route(
            "/pinning/pinFileToIPFS",
            post(|headers: HeaderMap, mut multipart: Multipart| async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    == Some("Bearer pin-jwt");
                let field = multipart.next_field().await.unwrap().unwrap();
                let well_formed =
                    field.name() == Some("file") && field.file_name() == Some("front.jpg");
                if !(authorized && well_formed) {
                    return Err(axum::http::StatusCode::BAD_REQUEST);
                }
                Ok(Json(json!({
                    "IpfsHash": "QmTestHash",
                    "PinSize": 10,
                    "Timestamp": "2026-10-19T00:00:00Z",
                })))
            }),
        ))
        .await;

        let client = PinningClient::new(url, "https://gateway.example/ipfs/", Some("pin-jwt".to_string()))
            .unwrap();
        let pinned = client
            .pin_file("front.jpg", Some("image/jpeg"), Bytes::from_static(b"jpeg bytes"))
            .await
            .unwrap();

        assert_eq!(pinned.cid, "QmTestHash");
        assert_eq!(pinned.url, "https://gateway.example/ipfs/QmTestHash");
        assert_eq!(pinned.file_name, "front.jpg");
    }

    #[tokio::test]
    async fn gateway_error_is_surfaced() {
        let url = serve(Router::new().route(
            "/pinning/pinFileToIPFS",
            post(|| async { (axum::http::StatusCode::UNAUTHORIZED, "bad jwt") }),
        ))
        .await;

        let client = PinningClient::new(url, "https://gateway.example/ipfs", Some("nope".to_string())).unwrap();
        let err = client
            .pin_file("a.png", None, Bytes::from_static(b"png"))
            .await
            .unwrap_err();
        assert!(matches!(err, PinningError::Status { status, .. } if status == StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn missing_token_is_not_configured() {
        let client = PinningClient::new("http://127.0.0.1:9", "https://gateway.example/ipfs", None).unwrap();
        let err = client
            .pin_file("a.png", None, Bytes::from_static(b"png"))
            .await
            .unwrap_err();
        assert!(matches!(err, PinningError::NotConfigured));
    }
}
