//! Service global context

use std::path::PathBuf;
use std::sync::Arc;

use async_graphql::ErrorExtensions;
use color_eyre::{Report, Result};

pub mod auth;
pub mod groups;
pub mod users;

use async_graphql::EmptySubscription;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use thiserror::Error;
use tracing::warn;

use crate::config;
use crate::model::auth::TokenStore;
use crate::mutation::Mutation;
use crate::query::Query;
use crate::service::Schema;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Invalid SQLite path: {path}")]
    InvalidSQLitePath { path: PathBuf },
}

/// Converts a model failure into a GraphQL error.
///
/// Failures caused by the client get their `code` extension set. Anything else is reported as an
/// internal error, and logged as the client won't be able to do anything about it.
pub fn api_error(err: Report) -> async_graphql::Error {
    let code = if let Some(err) = err.downcast_ref::<users::Error>() {
        match err {
            users::Error::InvalidCredentials => "UNAUTHENTICATED",
            users::Error::EmailTaken | users::Error::EmptyPassword => "BAD_USER_INPUT",
        }
    } else if let Some(err) = err.downcast_ref::<groups::Error>() {
        match err {
            groups::Error::GroupNotFound(_) => "NOT_FOUND",
            groups::Error::AlreadyParticipant { .. } => "BAD_USER_INPUT",
            groups::Error::NotParticipant { .. } => "NOT_FOUND",
            groups::Error::CannotAssign { .. } | groups::Error::AlreadyDrawn { .. } => "CONFLICT",
        }
    } else if err.downcast_ref::<draw::Error>().is_some() {
        "BAD_USER_INPUT"
    } else {
        warn!(?err, "Request failed");
        "INTERNAL_SERVER_ERROR"
    };

    async_graphql::Error::new(err.to_string()).extend_with(|_, ext| ext.set("code", code))
}

/// Context for GraphQL schema
#[derive(Clone)]
pub struct Model {
    /// Database access
    db: sqlx::SqlitePool,
    /// Active sessions
    tokens: Arc<TokenStore>,
}

impl Model {
    /// Context for testing purposes - using the in-memory SQLite database
    pub async fn test() -> Result<Self> {
        Self::with_config(config::Database::default(), config::Auth::default()).await
    }

    /// Context from configuration
    ///
    /// If the database is created in-memory, the migrations are being executed automatically. If database is
    /// file based migrations would be executed only if requested by configuration.
    pub async fn with_config(db: config::Database, auth: config::Auth) -> Result<Self> {
        use config::Database::*;

        let db = match db {
            Memory { max_connections } => {
                // Every parsed `sqlite::memory:` is a separate database, shared by all the pool
                // connections
                let opts = "sqlite::memory:"
                    .parse::<SqliteConnectOptions>()?
                    .foreign_keys(true);

                // Closing the last connection drops the whole database
                let pool = SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_lazy_with(opts);

                sqlx::migrate!("model/migrations").run(&pool).await?;
                pool
            }

            SqLite {
                path,
                max_connections,
                migrate,
            } => {
                let path = path
                    .as_path()
                    .to_str()
                    .ok_or_else(|| Error::InvalidSQLitePath { path: path.clone() })?;

                let opts = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .foreign_keys(true);

                let pool = SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .connect_lazy_with(opts);

                if migrate {
                    sqlx::migrate!("model/migrations").run(&pool).await?;
                }

                pool
            }
        };

        Ok(Self {
            db,
            tokens: Arc::new(TokenStore::new(auth.token_ttl())),
        })
    }

    /// Buids schema with attached context
    pub fn schema(&self) -> Schema {
        Schema::build(Query::new(), Mutation::new(), EmptySubscription)
            .data(self.clone())
            .finish()
    }

    /// Accesses the DB pool
    pub fn db(&self) -> &sqlx::SqlitePool {
        &self.db
    }

    /// Accesses the session tokens
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Performs cleanup on the model, returning number of purged sessions
    pub fn cleanup(&self) -> usize {
        self.tokens.purge_expired()
    }
}
