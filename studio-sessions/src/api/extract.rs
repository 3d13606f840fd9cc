//! JSON body extractors that reject with [`ApiError`]
//!
//! axum's `Json` rejects with a plain-text 422/415; these keep every
//! failure on the `{ success: false, error, message }` 400 path.

use axum::{
    async_trait,
    body::to_bytes,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::header::CONTENT_TYPE,
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Required JSON body
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

/// Optional JSON body: an empty body yields `T::default()`
///
/// A non-empty body must be JSON-typed and must parse; it is never
/// silently replaced by the default.
#[derive(Debug)]
pub struct OptionalJsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for OptionalJsonBody<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let (parts, body) = req.into_parts();
        let bytes = to_bytes(body, usize::MAX)
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read request body: {}", e)))?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(OptionalJsonBody(T::default()));
        }

        let is_json = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("application/json"))
            .unwrap_or(false);
        if !is_json {
            return Err(ApiError::BadRequest(
                "Expected request with `Content-Type: application/json`".to_string(),
            ));
        }

        serde_json::from_slice(&bytes)
            .map(OptionalJsonBody)
            .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize)]
    struct Flags {
        silent: Option<bool>,
    }

    fn req(content_type: Option<&str>, body: &'static str) -> Request {
        let mut builder = axum::http::Request::builder().method("PATCH").uri("/");
        if let Some(ct) = content_type {
            builder = builder.header(CONTENT_TYPE, ct);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_empty_body_is_default() {
        let OptionalJsonBody(flags) = OptionalJsonBody::<Flags>::from_request(req(None, ""), &())
            .await
            .unwrap();
        assert_eq!(flags.silent, None);
    }

    #[tokio::test]
    async fn test_body_without_content_type_rejected() {
        let result =
            OptionalJsonBody::<Flags>::from_request(req(None, r#"{"silent":true}"#), &()).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_wrongly_typed_field_rejected() {
        let result = OptionalJsonBody::<Flags>::from_request(
            req(Some("application/json"), r#"{"silent":"true"}"#),
            &(),
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_valid_body_parsed() {
        let OptionalJsonBody(flags) = OptionalJsonBody::<Flags>::from_request(
            req(Some("application/json; charset=utf-8"), r#"{"silent":true}"#),
            &(),
        )
        .await
        .unwrap();
        assert_eq!(flags.silent, Some(true));
    }

    #[tokio::test]
    async fn test_required_body_type_mismatch_is_bad_request() {
        let result =
            JsonBody::<Flags>::from_request(req(Some("application/json"), r#"{"silent":1}"#), &()).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }
}
