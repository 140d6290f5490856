//! Utilities for services building

use actix_web::error::{ErrorInternalServerError, ErrorUnauthorized};
use actix_web::http::StatusCode;
use actix_web::web::{Data, ServiceConfig};
use actix_web::{HttpMessage, HttpRequest, HttpResponse, Responder, Result};
use actix_web::{delete, get, middleware, post, web};
use async_graphql::{EmptySubscription, Value};
use async_graphql::http::GraphiQLSource;
use async_graphql_actix_web::{GraphQLRequest, GraphQLResponse};
use tracing::debug;


mod session;

use crate::model::Model;
use crate::model::auth::{self, Session, TokenStore};
use crate::mutation::Mutation;
use crate::query::Query;

/// Root GraphQL schema
pub type Schema = async_graphql::Schema<Query, Mutation, EmptySubscription>;

/// Closes current session
#[delete("/session")]
async fn sign_out(req: HttpRequest, model: Data<Model>) -> Result<HttpResponse> {
    let session = req
        .extensions_mut()
        .remove::<Session>()
        .ok_or_else(|| ErrorUnauthorized("Missing session"))?;

    close_session(model.tokens(), &session)?;
    Ok(HttpResponse::NoContent().finish())
}

/// Revokes the session. Session replaced or expired since the request was authorized is already
/// closed.
fn close_session(tokens: &TokenStore, session: &Session) -> Result<()> {
    match tokens.revoke(&session.token) {
        Ok(_) => Ok(()),
        Err(auth::Error::InvalidToken) => {
            debug!(user_id = %session.user_id, "Session already closed");
            Ok(())
        }
        Err(err) => Err(ErrorInternalServerError(err)),
    }
}

/// Checks if any of the errors is caused by a missing session
fn is_unauthenticated(response: &async_graphql::Response) -> bool {
    response.errors.iter().any(|err| {
        err.extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .is_some_and(|code| matches!(code, Value::String(code) if code == "UNAUTHENTICATED"))
    })
}

/// ActixWeb GraphQL endpoint
#[post("/api")]
async fn api(
    schema: web::Data<Schema>,
    req: HttpRequest,
    request: GraphQLRequest,
) -> HttpResponse {
    let mut request = request.into_inner();
    if let Some(session) = req.extensions_mut().remove::<Session>() {
        request = request.data(session);
    }

    let response = schema.execute(request).await;
    let status = if is_unauthenticated(&response) {
        StatusCode::UNAUTHORIZED
    } else {
        StatusCode::OK
    };

    let mut response = GraphQLResponse::from(response)
        .respond_to(&req)
        .map_into_boxed_body();
    *response.status_mut() = status;
    response
}

/// ActixWeb GraphQLi endpoint
#[get("/pg")]
async fn graphiql() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(GraphiQLSource::build().endpoint("/api").finish()))
}

/// Returns configuration function for the ActixWeb services
pub async fn configure(
    graphiql_enabled: bool,
    model: Model,
) -> color_eyre::Result<impl Fn(&mut web::ServiceConfig) + Clone> {
    let cfg = move |cfg: &mut ServiceConfig| {
        let session_aware = {
            web::scope("")
                .wrap(middleware::from_fn(session::middleware))
                .service(api)
                .service(sign_out)
        };

        cfg.app_data(Data::new(model.schema()))
            .app_data(Data::new(model.clone()));

        // Scope with an empty prefix matches every path, so it has to go last
        if graphiql_enabled {
            cfg.service(graphiql);
        }

        cfg.service(session_aware);
    };

    Ok(cfg)
}
