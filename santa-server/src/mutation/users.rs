//! User-related mutations

use async_graphql::{Context, Object, Result, SimpleObject};
use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::model::auth::SessionToken;
use crate::model::users::{Credential, NewUser, User, UserId};
use crate::model::{Model, api_error};

/// Type returned on successful sign in
#[derive(Debug, Clone, SimpleObject)]
struct SignedIn {
    /// Bearer token authorizing further requests
    token: SessionToken,
    /// Signed in user id
    user_id: UserId,
    /// Time after which the token is no longer accepted
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct UsersMutations;

#[Object]
impl UsersMutations {
    /// Registers a new user
    #[instrument(skip_all, fields(email = %user.email))]
    async fn create(&self, ctx: &Context<'_>, user: NewUser) -> Result<User> {
        let model: &Model = ctx.data()?;
        let db = model.db();

        let user_id = user.create(db).await.map_err(api_error)?;
        info!(%user_id, "User created");

        let user = user_id
            .fetch(db)
            .await
            .map_err(api_error)?
            .ok_or("User not found")?;

        Ok(user)
    }

    /// Verifies the credentials and starts a new session for the user. The previous session of the
    /// user, if any, is closed.
    #[instrument(skip(self, ctx, password))]
    async fn sign_in(&self, ctx: &Context<'_>, email: String, password: String) -> Result<SignedIn> {
        let model: &Model = ctx.data()?;

        let user_id = Credential::authenticate(model.db(), &email, &password)
            .await
            .map_err(api_error)?;
        let session = model.tokens().issue(user_id);

        Ok(SignedIn {
            token: session.token,
            user_id: session.user_id,
            expires_at: session.expires_at,
        })
    }
}
