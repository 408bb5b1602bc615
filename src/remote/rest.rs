//! ReadBuddy REST API client implementation

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use tracing::{debug, info};

use super::types::{ChatResponse, IndexResponse, MessageRequest, RestApiError, UploadResponse};

/// Client for the request/response endpoints of the backend
#[derive(Debug, Clone)]
pub struct RestClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Upload an image and return its public URL
    pub async fn upload_image(&self, path: &Path) -> Result<String, RestApiError> {
        let form = Self::file_form(path).await?;
        let response: UploadResponse = self.post_multipart("/uploadS3", form).await?;

        match (response.file_url, response.error) {
            (Some(file_url), _) => {
                info!("Uploaded {} to {}", path.display(), file_url);
                Ok(file_url)
            }
            (None, Some(error)) => Err(RestApiError::ServerError(error)),
            (None, None) => Err(RestApiError::ParseError(
                "Upload response carried neither file_url nor error".to_string(),
            )),
        }
    }

    /// Ask the backend to index a web page
    pub async fn index_url(&self, url: &str) -> Result<String, RestApiError> {
        let response: IndexResponse = self
            .post_json("/indexingURL", &MessageRequest { message: url })
            .await?;

        Self::index_outcome(response, || format!("Indexed {}", url))
    }

    /// Upload a PDF or text document for indexing
    pub async fn index_document(&self, path: &Path) -> Result<String, RestApiError> {
        let form = Self::file_form(path).await?;
        let response: IndexResponse = self.post_multipart("/indexingDoc", form).await?;

        Self::index_outcome(response, || {
            format!("\"{}\" uploaded successfully.", Self::file_name(path))
        })
    }

    /// Non-streaming question answering
    pub async fn ask(&self, question: &str) -> Result<ChatResponse, RestApiError> {
        self.post_json("/chat", &MessageRequest { message: question })
            .await
    }

    async fn post_json<B, T>(&self, endpoint: &str, body: &B) -> Result<T, RestApiError>
    where
        B: serde::Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| RestApiError::HttpRequestError(format!("POST {} failed: {}", url, e)))?;

        Self::decode(response).await
    }

    async fn post_multipart<T>(&self, endpoint: &str, form: Form) -> Result<T, RestApiError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("POST multipart {}", url);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(|e| RestApiError::HttpRequestError(format!("POST {} failed: {}", url, e)))?;

        Self::decode(response).await
    }

    async fn decode<T>(response: reqwest::Response) -> Result<T, RestApiError>
    where
        T: serde::de::DeserializeOwned,
    {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RestApiError::HttpRequestError(format!("Failed to read body: {}", e)))?;

        if !status.is_success() {
            // the backend reports failures as {"error": "..."}
            if let Ok(IndexResponse {
                error: Some(error), ..
            }) = serde_json::from_str::<IndexResponse>(&body)
            {
                return Err(RestApiError::ServerError(error));
            }
            return Err(RestApiError::HttpStatusError(status.as_u16(), body));
        }

        serde_json::from_str(&body)
            .map_err(|e| RestApiError::ParseError(format!("Failed to parse response: {}", e)))
    }

    fn index_outcome(
        response: IndexResponse,
        fallback: impl FnOnce() -> String,
    ) -> Result<String, RestApiError> {
        if let Some(error) = response.error {
            return Err(RestApiError::ServerError(error));
        }

        match response.response {
            Some(serde_json::Value::String(message)) => Ok(message),
            // indexing helpers can return {"error": ...} inside a 200 reply
            Some(serde_json::Value::Object(map)) => match map.get("error") {
                Some(error) => Err(RestApiError::ServerError(
                    error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string()),
                )),
                None => Ok(fallback()),
            },
            _ => Ok(fallback()),
        }
    }

    async fn file_form(path: &Path) -> Result<Form, RestApiError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = Self::file_name(path);
        debug!("Attaching {} ({} bytes)", file_name, bytes.len());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(Self::mime_for(path))
            .map_err(|e| RestApiError::HttpRequestError(format!("Invalid mime type: {}", e)))?;

        Ok(Form::new().part("file", part))
    }

    fn file_name(path: &Path) -> String {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string())
    }

    fn mime_for(path: &Path) -> &'static str {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "webp" => "image/webp",
            "pdf" => "application/pdf",
            "txt" => "text/plain",
            _ => "application/octet-stream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_detection() {
        assert_eq!(RestClient::mime_for(Path::new("photo.PNG")), "image/png");
        assert_eq!(RestClient::mime_for(Path::new("notes.txt")), "text/plain");
        assert_eq!(RestClient::mime_for(Path::new("paper.pdf")), "application/pdf");
        assert_eq!(
            RestClient::mime_for(Path::new("archive")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = RestClient::new("http://localhost:8000/", Duration::from_secs(5));
        assert_eq!(client.base_url(), "http://localhost:8000");
    }

    #[test]
    fn test_index_outcome_nested_error() {
        let response = IndexResponse {
            response: Some(serde_json::json!({ "error": "Failed to load text file" })),
            error: None,
        };
        let result = RestClient::index_outcome(response, || "ok".to_string());
        assert!(matches!(result, Err(RestApiError::ServerError(msg)) if msg == "Failed to load text file"));
    }
}
