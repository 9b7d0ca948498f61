use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{domain::PredictionResult, error::PredictionError};

/// Multipart field carrying the image bytes.
pub const UPLOAD_FIELD_NAME: &str = "file";

/// Body of a prediction response as it arrives on the wire. Every field is
/// optional so that partial or error bodies still deserialize.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_disease: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treatment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PredictionResponse {
    pub fn into_result(self) -> Result<PredictionResult, PredictionError> {
        let Some(predicted_disease) = self.predicted_disease.filter(|d| !d.trim().is_empty())
        else {
            return Err(PredictionError::malformed(self.error));
        };
        let Some(confidence) = self.confidence.filter(|c| c.is_finite() && (0.0..=1.0).contains(c))
        else {
            return Err(PredictionError::malformed(self.error));
        };
        let Some(treatment) = self.treatment else {
            return Err(PredictionError::malformed(self.error));
        };

        Ok(PredictionResult {
            predicted_disease,
            confidence,
            treatment,
            description: self.description.filter(|d| !d.trim().is_empty()),
        })
    }
}

/// Reconciles an HTTP status and raw body into a prediction or a typed error.
///
/// A 2xx body without a usable prediction is `PredictionMalformed`, carrying
/// the server's `error` text if there is one. A non-2xx body that names an
/// `error` is surfaced the same way; any other non-2xx reply is a
/// `TransportFailure`.
pub fn interpret_response(status: u16, body: &[u8]) -> Result<PredictionResult, PredictionError> {
    let success = (200..300).contains(&status);
    let parsed: Option<Value> = serde_json::from_slice(body).ok();
    let server_error = parsed
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string);

    if !success {
        return match server_error {
            Some(message) if !message.trim().is_empty() => {
                Err(PredictionError::malformed(Some(message)))
            }
            _ => Err(PredictionError::transport(format!(
                "endpoint returned http status {status} without a usable body"
            ))),
        };
    }

    let Some(value) = parsed.filter(Value::is_object) else {
        return Err(PredictionError::malformed(None));
    };

    match serde_json::from_value::<PredictionResponse>(value) {
        Ok(response) => response.into_result(),
        Err(_) => Err(PredictionError::malformed(server_error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, UNEXPECTED_RESPONSE_MESSAGE};

    #[test]
    fn accepts_complete_prediction() {
        let body = br#"{"predicted_disease":"Leaf Blight","confidence":0.87,"treatment":"Apply fungicide X"}"#;
        let result = interpret_response(200, body).expect("prediction");
        assert_eq!(result.predicted_disease, "Leaf Blight");
        assert_eq!(result.confidence_percent(), "87.00%");
        assert_eq!(result.description, None);
    }

    #[test]
    fn keeps_optional_description() {
        let body = br#"{"predicted_disease":"Rust","confidence":1,"treatment":"Remove leaves","description":"Orange pustules"}"#;
        let result = interpret_response(200, body).expect("prediction");
        assert_eq!(result.description.as_deref(), Some("Orange pustules"));
        assert_eq!(result.confidence_percent(), "100.00%");
    }

    #[test]
    fn empty_object_is_malformed_with_generic_message() {
        let err = interpret_response(200, b"{}").expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::PredictionMalformed);
        assert_eq!(err.user_message(), UNEXPECTED_RESPONSE_MESSAGE);
    }

    #[test]
    fn server_error_field_is_surfaced() {
        let err = interpret_response(200, br#"{"error":"No file part"}"#).expect_err("must fail");
        assert_eq!(err.user_message(), "No file part");

        let err = interpret_response(400, br#"{"error":"Unsupported image"}"#).expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::PredictionMalformed);
        assert_eq!(err.user_message(), "Unsupported image");
    }

    #[test]
    fn non_success_without_body_is_transport_failure() {
        let err = interpret_response(502, b"<html>bad gateway</html>").expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::TransportFailure);
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        let body = br#"{"predicted_disease":"Blight","confidence":87,"treatment":"x"}"#;
        let err = interpret_response(200, body).expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::PredictionMalformed);
    }

    #[test]
    fn wrongly_typed_fields_are_malformed() {
        let body = br#"{"predicted_disease":"Blight","confidence":"high","treatment":"x"}"#;
        let err = interpret_response(200, body).expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::PredictionMalformed);

        let err = interpret_response(200, b"[1,2,3]").expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::PredictionMalformed);
    }
}
