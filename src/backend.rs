// noFriction Meetings - Rewind Backend Client
// Async seam to the recording/transcription/storage backend
//
// The engine only talks to the backend through these traits; HttpBackend is the
// production implementation (bearer-authenticated JSON over HTTP).

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::capture_mode::{AlwaysOnSettings, CaptureMode};
use crate::config::EngineConfig;
use crate::error::BackendError;
use crate::media_cache::AssetVariant;
use crate::normalizer::RawTimeline;

/// Timeline data and rendered assets for recorded meetings
#[async_trait]
pub trait TimelineBackend: Send + Sync {
    /// Fetch the full timeline (frames, transcripts, accessibility, screenshots)
    async fn fetch_timeline(&self, meeting_id: &str) -> Result<RawTimeline, BackendError>;

    /// Fetch a thumbnail or full-resolution rendering of an asset
    async fn fetch_asset(
        &self,
        asset_id: &str,
        variant: AssetVariant,
    ) -> Result<Vec<u8>, BackendError>;
}

/// Capture-mode control and always-on settings
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    async fn get_capture_mode(&self) -> Result<CaptureMode, BackendError>;

    async fn start_ambient_capture(&self) -> Result<(), BackendError>;

    async fn start_meeting_capture(&self) -> Result<(), BackendError>;

    async fn pause_capture(&self) -> Result<(), BackendError>;

    async fn get_always_on_settings(&self) -> Result<AlwaysOnSettings, BackendError>;

    async fn set_always_on_settings(&self, settings: &AlwaysOnSettings)
        -> Result<(), BackendError>;

    async fn set_always_on_enabled(&self, enabled: bool) -> Result<(), BackendError>;
}

#[derive(Debug, Deserialize)]
struct AssetResponse {
    /// Base64-encoded image, or null when the asset has no file
    data: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ModeResponse {
    mode: CaptureMode,
}

#[derive(Debug, Serialize)]
struct EnabledRequest {
    enabled: bool,
}

/// HTTP implementation of both backend traits
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    bearer_token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: &str, bearer_token: Option<String>) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        // Url::join drops the last path segment unless the base ends with '/'
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            bearer_token,
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, BackendError> {
        let url = config
            .backend_url
            .as_deref()
            .ok_or(BackendError::NotConfigured("REWIND_BACKEND_URL"))?;
        Self::new(url, config.backend_token.clone())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.base_url.join(path)?)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.bearer_token {
            Some(ref token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, BackendError> {
        let response = self.authorized(request).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn post_empty(&self, path: &str) -> Result<(), BackendError> {
        let url = self.endpoint(path)?;
        self.send(self.client.post(url), path).await?;
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> Result<bool, BackendError> {
        let url = self.endpoint("health")?;
        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(5))
            .send()
            .await?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl TimelineBackend for HttpBackend {
    async fn fetch_timeline(&self, meeting_id: &str) -> Result<RawTimeline, BackendError> {
        let path = format!("v1/meetings/{}/timeline", urlencoding::encode(meeting_id));
        let url = self.endpoint(&path)?;
        let what = format!("meeting {}", meeting_id);

        let response = self.send(self.client.get(url), &what).await?;
        response
            .json::<RawTimeline>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn fetch_asset(
        &self,
        asset_id: &str,
        variant: AssetVariant,
    ) -> Result<Vec<u8>, BackendError> {
        let path = format!("v1/assets/{}", urlencoding::encode(asset_id));
        let mut url = self.endpoint(&path)?;
        url.query_pairs_mut().append_pair("variant", variant.as_str());
        let what = format!("asset {} ({})", asset_id, variant.as_str());

        let response = self.send(self.client.get(url), &what).await?;
        let body: AssetResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        let encoded = body.data.ok_or(BackendError::NotFound(what))?;
        Ok(base64::engine::general_purpose::STANDARD.decode(encoded.as_bytes())?)
    }
}

#[async_trait]
impl CaptureBackend for HttpBackend {
    async fn get_capture_mode(&self) -> Result<CaptureMode, BackendError> {
        let url = self.endpoint("v1/capture/mode")?;
        let response = self.send(self.client.get(url), "capture mode").await?;
        let body: ModeResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(body.mode)
    }

    async fn start_ambient_capture(&self) -> Result<(), BackendError> {
        self.post_empty("v1/capture/ambient").await
    }

    async fn start_meeting_capture(&self) -> Result<(), BackendError> {
        self.post_empty("v1/capture/meeting").await
    }

    async fn pause_capture(&self) -> Result<(), BackendError> {
        self.post_empty("v1/capture/pause").await
    }

    async fn get_always_on_settings(&self) -> Result<AlwaysOnSettings, BackendError> {
        let url = self.endpoint("v1/capture/always-on")?;
        let response = self.send(self.client.get(url), "always-on settings").await?;
        response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn set_always_on_settings(
        &self,
        settings: &AlwaysOnSettings,
    ) -> Result<(), BackendError> {
        let url = self.endpoint("v1/capture/always-on")?;
        self.send(self.client.put(url).json(settings), "always-on settings")
            .await?;
        Ok(())
    }

    async fn set_always_on_enabled(&self, enabled: bool) -> Result<(), BackendError> {
        let url = self.endpoint("v1/capture/always-on/enabled")?;
        self.send(
            self.client.put(url).json(&EnabledRequest { enabled }),
            "always-on flag",
        )
        .await?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let backend = HttpBackend::new("http://localhost:8000/api", None).unwrap();
        assert_eq!(backend.base_url().as_str(), "http://localhost:8000/api/");
        assert_eq!(
            backend.endpoint("v1/capture/mode").unwrap().as_str(),
            "http://localhost:8000/api/v1/capture/mode"
        );
    }

    #[test]
    fn test_from_config_requires_url() {
        let err = HttpBackend::from_config(&EngineConfig::default()).unwrap_err();
        assert!(matches!(err, BackendError::NotConfigured(_)));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(matches!(
            HttpBackend::new("not a url", None),
            Err(BackendError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_mode_response_shape() {
        let body: ModeResponse = serde_json::from_str(r#"{"mode":"Ambient"}"#).unwrap();
        assert_eq!(body.mode, CaptureMode::Ambient);
    }
}
