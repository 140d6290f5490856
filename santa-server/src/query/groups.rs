//! Group-related queries

use async_graphql::{ComplexObject, Context, Object, Result};
use tracing::instrument;

use crate::model::auth::Session;
use crate::model::groups::{self, Group, GroupId, GroupStatus, Participant};
use crate::model::users::User;
use crate::model::{Model, api_error};

#[derive(Debug, Default)]
pub struct GroupsQueries;

#[Object]
impl GroupsQueries {
    /// Group with given id
    #[instrument(skip(self, ctx))]
    async fn group(&self, ctx: &Context<'_>, id: GroupId) -> Result<Option<Group>> {
        Session::from_context(ctx)?;
        let model: &Model = ctx.data()?;

        Group::fetch(model.db(), id).await.map_err(api_error)
    }

    /// Groups the current user participates in
    #[instrument(skip(self, ctx))]
    async fn mine(&self, ctx: &Context<'_>) -> Result<Vec<Group>> {
        let session = Session::from_context(ctx)?;
        let model: &Model = ctx.data()?;

        Group::fetch_joined(model.db(), session.user_id)
            .await
            .map_err(api_error)
    }

    /// Secret friend drawn for the current user in the group. Empty until the user takes part in
    /// a draw.
    #[instrument(skip(self, ctx))]
    async fn secret_friend(&self, ctx: &Context<'_>, group_id: GroupId) -> Result<Option<User>> {
        let session = Session::from_context(ctx)?;
        let model: &Model = ctx.data()?;
        let db = model.db();

        let participant = Participant::fetch(db, group_id, session.user_id)
            .await
            .map_err(api_error)?
            .ok_or_else(|| {
                api_error(
                    groups::Error::NotParticipant {
                        group_id,
                        user_id: session.user_id,
                    }
                    .into(),
                )
            })?;

        let Some(friend) = participant.friend else {
            return Ok(None);
        };

        friend.fetch(db).await.map_err(api_error)
    }
}

#[ComplexObject]
impl Group {
    /// Whether the group was drawn already
    #[graphql(name = "status")]
    async fn resolve_status(&self) -> GroupStatus {
        self.status()
    }

    /// All participants, in the joining order
    #[graphql(name = "participants")]
    async fn resolve_participants(&self, ctx: &Context<'_>) -> Result<Vec<Participant>> {
        let model: &Model = ctx.data()?;
        self.participants(model.db()).await.map_err(api_error)
    }
}

#[ComplexObject]
impl Participant {
    /// Participating user
    async fn user(&self, ctx: &Context<'_>) -> Result<Option<User>> {
        let model: &Model = ctx.data()?;
        self.user_id.fetch(model.db()).await.map_err(api_error)
    }

    /// Whether the participant has a secret friend assigned
    async fn drawn(&self) -> bool {
        self.friend.is_some()
    }
}
