use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use pixur_types::{Context, Status};
use tracing::Instrument;
use uuid::Uuid;

use crate::AppState;
use crate::auth::decode_token;
use crate::error::ApiError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Builds the per request [`Context`] and hands it to handlers as an
/// extension.
///
/// Callers without an Authorization header are anonymous. A header that is
/// present but not a valid bearer token is rejected outright.
pub async fn request_context(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    let mut ctx = Context::new().with_configuration(state.conf.clone());
    if let Some(timeout) = state.request_timeout {
        ctx = ctx.with_timeout(timeout);
    }
    match req.headers().typed_try_get::<Authorization<Bearer>>() {
        Ok(None) => {}
        Ok(Some(auth)) => match decode_token(&state.jwt_secret, auth.token()) {
            Ok(claims) => ctx = ctx.with_subject(claims.sub),
            Err(sts) => return ApiError(sts).into_response(),
        },
        Err(_) => {
            return ApiError(Status::unauthenticated("malformed authorization header"))
                .into_response();
        }
    }
    req.extensions_mut().insert(ctx);

    let mut resp = next.run(req).instrument(span).await;
    if let Ok(v) = HeaderValue::from_str(&request_id.to_string()) {
        resp.headers_mut().insert(REQUEST_ID_HEADER, v);
    }
    resp
}
