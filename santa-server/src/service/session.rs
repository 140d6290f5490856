//! Bearer token authentication

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::error::{ErrorInternalServerError, ErrorUnauthorized};
use actix_web::http::header;
use actix_web::middleware::Next;
use actix_web::web::Data;
use actix_web::{Error, HttpMessage};
use tracing::debug;

use crate::model::Model;
use crate::model::auth::Authorization;

/// Validates the `Authorization` header if present, attaching the `Session` to the request.
///
/// Requests without the header pass through untouched - resolvers requiring a session reject
/// them on their own. Requests with malformed, unknown or expired tokens are rejected right away.
pub async fn middleware<B>(req: ServiceRequest, next: Next<B>) -> Result<ServiceResponse<B>, Error>
where
    B: MessageBody + 'static,
{
    if let Some(auth_header) = req.headers().get(header::AUTHORIZATION) {
        let auth_header = auth_header
            .to_str()
            .map_err(|err| ErrorUnauthorized(err.to_string()))?;

        let Authorization::Bearer(token) = auth_header
            .parse::<Authorization>()
            .map_err(ErrorUnauthorized)?;

        let model: Data<Model> = req
            .app_data()
            .cloned()
            .ok_or_else(|| ErrorInternalServerError("Missing model"))?;

        let session = model.tokens().validate(&token).map_err(|err| {
            debug!(%err, "Rejected session token");
            ErrorUnauthorized(err)
        })?;

        req.extensions_mut().insert(session);
    }

    next.call(req).await
}
