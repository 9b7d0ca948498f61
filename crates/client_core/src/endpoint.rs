use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Body, Client,
};
use shared::{
    domain::PredictionResult,
    error::PredictionError,
    protocol::{interpret_response, UPLOAD_FIELD_NAME},
};
use tracing::debug;

use crate::file::ImageFile;

/// The remote classifier. One call is one upload.
#[async_trait]
pub trait PredictionEndpoint: Send + Sync {
    async fn predict(&self, file: &ImageFile) -> Result<PredictionResult, PredictionError>;
}

/// Posts the image as `multipart/form-data` to a prediction URL.
#[derive(Clone)]
pub struct HttpPredictionEndpoint {
    http: Client,
    url: String,
}

impl HttpPredictionEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
        }
    }

    fn build_form(file: &ImageFile) -> Result<Form, PredictionError> {
        let part = Part::stream_with_length(Body::from(file.shared_bytes()), file.size_bytes())
            .file_name(file.name().to_string());
        let part = match file.mime_type() {
            Some(mime) => part.mime_str(mime).map_err(|e| {
                PredictionError::transport(format!("invalid mime type '{mime}': {e}"))
            })?,
            None => part,
        };
        Ok(Form::new().part(UPLOAD_FIELD_NAME, part))
    }
}

#[async_trait]
impl PredictionEndpoint for HttpPredictionEndpoint {
    async fn predict(&self, file: &ImageFile) -> Result<PredictionResult, PredictionError> {
        let form = Self::build_form(file)?;
        debug!(
            url = %self.url,
            file = file.name(),
            size_bytes = file.size_bytes(),
            "posting image for prediction"
        );

        let response = self
            .http
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PredictionError::transport(format!("request failed: {e}")))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| PredictionError::transport(format!("failed to read response body: {e}")))?;
        debug!(status = status.as_u16(), body_len = body.len(), "prediction response received");

        interpret_response(status.as_u16(), &body)
    }
}
