//! Authorization extractor for Axum.

use axum::{
    Json,
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::headers::{HeaderMapExt, UserAgent};
use csdt_access::{AccessRequest, Credentials, Denial, Identity, RequestMetadata, Requirement};
use std::net::SocketAddr;
use std::sync::Arc;

use super::AppState;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Extractor for a request that passed the route's [`Requirement`].
///
/// The requirement comes from an `Extension<Requirement>` layer on the
/// route; without one, any valid session is accepted.
pub struct Authorized(pub Identity);

impl<S> FromRequestParts<S> for Authorized
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AccessRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);

        let requirement = parts
            .extensions
            .get::<Requirement>()
            .cloned()
            .unwrap_or_default();

        // A header that is not valid ASCII counts as malformed.
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .map(|value| value.to_str().unwrap_or_default());

        let request = AccessRequest {
            credentials: Credentials::from_header(header),
            requirement,
            metadata: request_metadata(parts),
        };

        app_state
            .gate
            .authorize(&request)
            .await
            .map(Authorized)
            .map_err(AccessRejection)
    }
}

fn request_metadata(parts: &Parts) -> RequestMetadata {
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    RequestMetadata::new(parts.method.as_str(), parts.uri.to_string())
        .with_client_ip(forwarded_for(&parts.headers).or(peer))
        .with_user_agent(
            parts
                .headers
                .typed_get::<UserAgent>()
                .map(|ua| ua.as_str().to_string()),
        )
}

/// First address in `X-Forwarded-For`, if present.
fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

/// Rejection carrying the gate's denial.
#[derive(Debug)]
pub struct AccessRejection(pub Denial);

impl IntoResponse for AccessRejection {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.body())).into_response()
    }
}
