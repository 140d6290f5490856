//! Group-related mutations

use async_graphql::{Context, ErrorExtensions, Object, Result};
use draw::Engine;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, instrument};

use crate::model::auth::Session;
use crate::model::groups::{self, Group, GroupId, Participant};
use crate::model::users::UserId;
use crate::model::{Model, api_error};

/// Fetches the group, failing if it doesn't exist or is not managed by the session owner
async fn managed_group(model: &Model, session: &Session, group_id: GroupId) -> Result<Group> {
    let group = Group::fetch(model.db(), group_id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| api_error(groups::Error::GroupNotFound(group_id).into()))?;

    if !group.is_owned_by(session.user_id) {
        return Err(async_graphql::Error::new("Only the group creator can manage the group")
            .extend_with(|_, ext| ext.set("code", "FORBIDDEN")));
    }

    Ok(group)
}

#[derive(Debug, Default)]
pub struct GroupsMutations;

#[Object]
impl GroupsMutations {
    /// Creates a new group. Its creator is the first participant.
    #[instrument(skip(self, ctx))]
    async fn create(&self, ctx: &Context<'_>, name: String) -> Result<Group> {
        let session = Session::from_context(ctx)?;
        let model: &Model = ctx.data()?;

        let group = Group::create(model.db(), name, session.user_id)
            .await
            .map_err(api_error)?;
        info!(group_id = %group.id, "Group created");

        Ok(group)
    }

    /// Joins the group as the current user
    #[instrument(skip(self, ctx))]
    async fn join(&self, ctx: &Context<'_>, group_id: GroupId) -> Result<Participant> {
        let session = Session::from_context(ctx)?;
        let model: &Model = ctx.data()?;
        let db = model.db();

        if Group::fetch(db, group_id).await.map_err(api_error)?.is_none() {
            return Err(api_error(groups::Error::GroupNotFound(group_id).into()));
        }

        let participant = Participant::join(db, group_id, session.user_id)
            .await
            .map_err(api_error)?;
        info!(user_id = %session.user_id, "Joined group");

        Ok(participant)
    }

    /// Leaves the group. Only possible before the current user gets a secret friend.
    ///
    /// Returns the id of the left group.
    #[instrument(skip(self, ctx))]
    async fn leave(&self, ctx: &Context<'_>, group_id: GroupId) -> Result<GroupId> {
        let session = Session::from_context(ctx)?;
        let model: &Model = ctx.data()?;

        Participant::leave(model.db(), group_id, session.user_id)
            .await
            .map_err(api_error)?;
        info!(user_id = %session.user_id, "Left group");

        Ok(group_id)
    }

    /// Adds another user to the group. Only the group creator can do that.
    #[instrument(skip(self, ctx))]
    async fn add_participant(
        &self,
        ctx: &Context<'_>,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<Participant> {
        let session = Session::from_context(ctx)?;
        let model: &Model = ctx.data()?;
        let db = model.db();

        managed_group(model, session, group_id).await?;

        if user_id.fetch(db).await.map_err(api_error)?.is_none() {
            return Err(async_graphql::Error::new(format!("User {user_id} not found"))
                .extend_with(|_, ext| ext.set("code", "NOT_FOUND")));
        }

        let participant = Participant::join(db, group_id, user_id)
            .await
            .map_err(api_error)?;
        info!("Participant added");

        Ok(participant)
    }

    /// Draws secret friends for every participant of the group who has none yet. Only the group
    /// creator can do that.
    ///
    /// Returns the number of participants who got a secret friend.
    #[instrument(skip(self, ctx))]
    async fn draw(&self, ctx: &Context<'_>, group_id: GroupId) -> Result<usize> {
        let session = Session::from_context(ctx)?;
        let model: &Model = ctx.data()?;

        managed_group(model, session, group_id).await?;

        let mut engine = Engine::new(StdRng::from_entropy());
        let assignments = Group::draw(model.db(), group_id, &mut engine)
            .await
            .map_err(api_error)?;

        Ok(assignments.len())
    }
}
