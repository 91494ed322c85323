use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;

use crate::error::PipelineError;
use crate::models::job::JobId;
use crate::models::params::GenerationParams;
use crate::services::pipeline::{AssetRenderer, RenderedAsset};

/// Client for the card rendering service.
pub struct HttpRenderer {
    http: Client,
    endpoint: String,
    api_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderRequest<'a> {
    job_id: JobId,
    params: &'a GenerationParams,
}

impl HttpRenderer {
    pub fn new(endpoint: &str, api_token: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            api_token: api_token.to_string(),
        })
    }
}

/// Rate limiting and server-side failures are worth another attempt;
/// anything else the service rejects will be rejected again.
pub(crate) fn classify_status(status: StatusCode) -> Option<PipelineError> {
    if status.is_success() {
        return None;
    }
    let message = format!("renderer responded with {status}");
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        Some(PipelineError::Transient(message))
    } else {
        Some(PipelineError::Permanent(message))
    }
}

fn classify_transport(err: reqwest::Error) -> PipelineError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        PipelineError::Transient(format!("renderer unreachable: {err}"))
    } else {
        PipelineError::Permanent(format!("renderer request failed: {err}"))
    }
}

/// Accept only bytes that actually look like an image.
pub(crate) fn inspect_image(bytes: Vec<u8>) -> Result<RenderedAsset, PipelineError> {
    let format = image::guess_format(&bytes).map_err(|_| {
        PipelineError::Permanent("renderer returned bytes that are not an image".to_string())
    })?;
    let content_type = match format {
        image::ImageFormat::Png => "image/png",
        image::ImageFormat::Jpeg => "image/jpeg",
        image::ImageFormat::WebP => "image/webp",
        other => {
            return Err(PipelineError::Permanent(format!(
                "renderer returned unsupported image format {other:?}"
            )))
        }
    };
    Ok(RenderedAsset {
        bytes,
        content_type: content_type.to_string(),
    })
}

#[async_trait]
impl AssetRenderer for HttpRenderer {
    async fn render(
        &self,
        job_id: JobId,
        params: &GenerationParams,
    ) -> Result<RenderedAsset, PipelineError> {
        let start = std::time::Instant::now();
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(&RenderRequest { job_id, params })
            .send()
            .await
            .map_err(classify_transport)?;

        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }

        let bytes = response.bytes().await.map_err(classify_transport)?;

        tracing::debug!(
            job_id = %job_id,
            render_ms = start.elapsed().as_millis() as u64,
            size = bytes.len(),
            "Renderer returned asset"
        );

        inspect_image(bytes.to_vec())
    }
}
