//! Custom Axum extractors.
//!
//! - `ClientIdentity`: the calling client's ID, from the `X-Client-Id` header
//!   or, for browser WebSocket upgrades that cannot set headers, the
//!   `client_id` query parameter.

use crate::error::AppError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use ticket_queue_core::types::ClientId;
use uuid::Uuid;

/// Header carrying the client identity.
pub const CLIENT_ID_HEADER: &str = "X-Client-Id";

/// The calling client.
///
/// Authentication is an external concern; this only reads the ID the
/// upstream authenticator attached.
///
/// # Example
///
/// ```ignore
/// async fn handler(ClientIdentity(client_id): ClientIdentity) -> String {
///     format!("Hello {client_id}")
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIdentity(pub ClientId);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(CLIENT_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| query_client_id(parts.uri.query()))
            .ok_or_else(|| AppError::bad_request("Missing X-Client-Id header"))?;

        let uuid = Uuid::parse_str(raw.trim())
            .map_err(|_| AppError::bad_request(format!("Invalid client id: {raw}")))?;

        Ok(Self(ClientId::from_uuid(uuid)))
    }
}

fn query_client_id(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "client_id")
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
#[allow(clippy::expect_used)] // Test code can use expect
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    async fn extract(req: Request<()>) -> Result<ClientIdentity, AppError> {
        let (mut parts, ()) = req.into_parts();
        ClientIdentity::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_client_id_from_header() {
        let uuid = Uuid::new_v4();
        let req = Request::builder()
            .header(CLIENT_ID_HEADER, uuid.to_string())
            .body(())
            .expect("Valid request");

        let identity = extract(req).await.expect("Should extract");
        assert_eq!(identity.0, ClientId::from_uuid(uuid));
    }

    #[tokio::test]
    async fn test_client_id_from_query() {
        let uuid = Uuid::new_v4();
        let req = Request::builder()
            .uri(format!("/api/tickets/x/ws?foo=bar&client_id={uuid}"))
            .body(())
            .expect("Valid request");

        let identity = extract(req).await.expect("Should extract");
        assert_eq!(identity.0, ClientId::from_uuid(uuid));
    }

    #[tokio::test]
    async fn test_missing_client_id_is_bad_request() {
        let req = Request::builder().body(()).expect("Valid request");
        let err = extract(req).await.expect_err("Should reject");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_client_id_is_bad_request() {
        let req = Request::builder()
            .header(CLIENT_ID_HEADER, "not-a-uuid")
            .body(())
            .expect("Valid request");
        let err = extract(req).await.expect_err("Should reject");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
