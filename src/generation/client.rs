use super::item::ImageData;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Failure of one remote generation call, split by retry eligibility.
///
/// `Transient` covers server-side faults (HTTP 5xx or an unreachable
/// backend); everything else, including a well-formed response that carries
/// no image, is `Permanent` and must not be retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generation backend failed: {0}")]
    Transient(String),
    #[error("generation rejected: {0}")]
    Permanent(String),
}

impl GenerationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GenerationError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            GenerationError::Transient(msg) | GenerationError::Permanent(msg) => msg,
        }
    }
}

/// One image-generation call: source photo + prompt in, image out.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(
        &self,
        source: &ImageData,
        prompt: &str,
    ) -> Result<ImageData, GenerationError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    image: &'a ImageData,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    image: Option<ImageData>,
    error: Option<RemoteError>,
}

#[derive(Debug, Deserialize)]
struct RemoteError {
    message: String,
}

/// reqwest-backed client for the remote generation endpoint.
#[derive(Clone)]
pub struct HttpGenerationClient {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpGenerationClient {
    pub fn new(endpoint: Url, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn generate(
        &self,
        source: &ImageData,
        prompt: &str,
    ) -> Result<ImageData, GenerationError> {
        let mut request = self.client.post(self.endpoint.clone()).json(&GenerateRequest {
            prompt,
            image: source,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GenerationError::Transient(format!("backend unreachable: {e}")))?;

        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Transient(format!(
                "backend returned {status}: {body}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Permanent(format!(
                "backend returned {status}: {body}"
            )));
        }

        let body = response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| GenerationError::Permanent(format!("invalid backend response: {e}")))?;

        match (body.image, body.error) {
            (Some(image), _) if !image.data.is_empty() => Ok(image),
            (_, Some(error)) => Err(GenerationError::Permanent(error.message)),
            _ => Err(GenerationError::Permanent(
                "backend response contained no image".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(GenerationError::Transient("500".into()).is_transient());
        assert!(!GenerationError::Permanent("policy refusal".into()).is_transient());
    }

    #[test]
    fn response_without_image_is_an_error_with_its_message() {
        let body: GenerateResponse = serde_json::from_str(
            r#"{"error": {"message": "content policy refusal"}}"#,
        )
        .unwrap();
        assert!(body.image.is_none());
        assert_eq!(body.error.unwrap().message, "content policy refusal");
    }
}
