//! User-related queries

use async_graphql::{Context, Object, Result};
use tracing::instrument;

use crate::model::auth::Session;
use crate::model::users::{User, UserId};
use crate::model::{Model, api_error};

#[derive(Debug, Default)]
pub struct UsersQueries;

#[Object]
impl UsersQueries {
    /// Currently signed in user
    #[instrument(skip(self, ctx))]
    async fn me(&self, ctx: &Context<'_>) -> Result<User> {
        let session = Session::from_context(ctx)?;
        let model: &Model = ctx.data()?;

        let user = session
            .user_id
            .fetch(model.db())
            .await
            .map_err(api_error)?
            .ok_or("User not found")?;

        Ok(user)
    }

    /// User with given id
    #[instrument(skip(self, ctx))]
    async fn user(&self, ctx: &Context<'_>, id: UserId) -> Result<Option<User>> {
        Session::from_context(ctx)?;
        let model: &Model = ctx.data()?;

        id.fetch(model.db()).await.map_err(api_error)
    }
}
