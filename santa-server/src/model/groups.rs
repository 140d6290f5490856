//! Gift exchange groups and their participants

use async_graphql::{Enum, SimpleObject, scalar};
use chrono::{DateTime, Utc};
use color_eyre::Result;
use color_eyre::eyre::{bail, ensure};
use draw::{Assignment, Engine};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::prelude::{FromRow, Type};
use thiserror::Error;
use tracing::{info, instrument};

use crate::model::users::UserId;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Group {0} not found")]
    GroupNotFound(GroupId),
    #[error("User {user_id} already participates in group {group_id}")]
    AlreadyParticipant { group_id: GroupId, user_id: UserId },
    #[error("Cannot assign secret friend to participant {user_id} of group {group_id}")]
    CannotAssign { group_id: GroupId, user_id: UserId },
    #[error("User {user_id} doesn't participate in group {group_id}")]
    NotParticipant { group_id: GroupId, user_id: UserId },
    #[error("Participant {user_id} of group {group_id} was drawn already")]
    AlreadyDrawn { group_id: GroupId, user_id: UserId },
}

/// Group ID newtype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct GroupId(i64);

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for GroupId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

scalar!(GroupId);

/// Draw state of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
pub enum GroupStatus {
    /// Never drawn, participants are waiting for the draw
    Open,
    /// Drawn at least once. Participants who joined later wait for another draw.
    Drawn,
}

/// Gift exchange group
#[derive(Debug, Clone, PartialEq, SimpleObject, FromRow)]
#[graphql(complex)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Time of the last draw, empty if the group was never drawn
    pub drawn_at: Option<DateTime<Utc>>,
    pub created_by: UserId,
}

impl Group {
    /// Creates a new group. The creator joins the group right away.
    pub async fn create(
        db: impl sqlx::Acquire<'_, Database = sqlx::Sqlite>,
        name: impl Into<String>,
        created_by: UserId,
    ) -> Result<Self> {
        let mut tx = db.begin().await?;

        let name = name.into();
        let created_at = Utc::now();
        let result =
            sqlx::query("insert into gift_groups (name, created_at, created_by) values (?, ?, ?)")
                .bind(&name)
                .bind(created_at)
                .bind(created_by)
                .execute(&mut *tx)
                .await?;

        let group = Self {
            id: GroupId(result.last_insert_rowid()),
            name,
            created_at,
            drawn_at: None,
            created_by,
        };

        Participant::join(&mut *tx, group.id, created_by).await?;
        tx.commit().await?;

        Ok(group)
    }

    /// Fetches the group by it's id
    pub async fn fetch(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        id: GroupId,
    ) -> Result<Option<Self>> {
        let group = sqlx::query_as(
            "select id, name, created_at, drawn_at, created_by from gift_groups where id = ?",
        )
        .bind(id)
        .fetch_optional(db)
        .await?;

        Ok(group)
    }

    /// Groups the user participates in, in the joining order
    pub async fn fetch_joined(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        user_id: UserId,
    ) -> Result<Vec<Self>> {
        let groups = sqlx::query_as(
            "select g.id, g.name, g.created_at, g.drawn_at, g.created_by from gift_groups g \
             join participants p on p.group_id = g.id \
             where p.user_id = ? order by p.joined_at, g.id",
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;

        Ok(groups)
    }

    pub fn status(&self) -> GroupStatus {
        match self.drawn_at {
            Some(_) => GroupStatus::Drawn,
            None => GroupStatus::Open,
        }
    }

    /// Checks if the user is allowed to manage the group
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.created_by == user_id
    }

    /// All participants of the group in the joining order
    pub async fn participants(
        &self,
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
    ) -> Result<Vec<Participant>> {
        let participants = sqlx::query_as(
            "select group_id, user_id, joined_at, friend_user_id from participants \
             where group_id = ? order by joined_at, user_id",
        )
        .bind(self.id)
        .fetch_all(db)
        .await?;

        Ok(participants)
    }

    /// Draws secret friends for all participants without one.
    ///
    /// Participants which already have a friend assigned are left untouched, so drawing a group
    /// again only pairs the participants that joined after the previous draw - they form a
    /// separate cycle. Either all the assignments are stored, or none of them.
    #[instrument(skip(db, engine))]
    pub async fn draw<R>(
        db: impl sqlx::Acquire<'_, Database = sqlx::Sqlite>,
        id: GroupId,
        engine: &mut Engine<R>,
    ) -> Result<Vec<Assignment<UserId>>>
    where
        R: Rng + Send,
    {
        let mut tx = db.begin().await?;

        if Self::fetch(&mut *tx, id).await?.is_none() {
            bail!(Error::GroupNotFound(id));
        }

        let participants = Participant::fetch_undrawn(&mut *tx, id).await?;
        let assignments = engine.draw(participants)?;

        for assignment in &assignments {
            Participant::assign_friend(&mut *tx, id, assignment.giver, assignment.friend).await?;
        }

        sqlx::query("update gift_groups set drawn_at = ? where id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(participants = assignments.len(), "Group drawn");
        Ok(assignments)
    }
}

/// Group participant
#[derive(Debug, Clone, PartialEq, SimpleObject, FromRow)]
#[graphql(complex)]
pub struct Participant {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
    /// Assigned secret friend - never exposed directly
    #[graphql(skip)]
    #[sqlx(rename = "friend_user_id")]
    pub friend: Option<UserId>,
}

impl Participant {
    /// Adds the user to the group
    pub async fn join(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<Self> {
        let joined_at = Utc::now();
        let result =
            sqlx::query("insert into participants (group_id, user_id, joined_at) values (?, ?, ?)")
                .bind(group_id)
                .bind(user_id)
                .bind(joined_at)
                .execute(db)
                .await;

        match result {
            Ok(_) => Ok(Self {
                group_id,
                user_id,
                joined_at,
                friend: None,
            }),
            Err(err)
                if err
                    .as_database_error()
                    .is_some_and(|err| err.is_unique_violation()) =>
            {
                bail!(Error::AlreadyParticipant { group_id, user_id })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Removes the user from the group.
    ///
    /// Only participants without a secret friend can leave - drawn participants are somebody's
    /// secret friend as well.
    pub async fn leave(
        db: impl sqlx::Acquire<'_, Database = sqlx::Sqlite>,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<()> {
        let mut tx = db.begin().await?;

        let delete = sqlx::query(
            "delete from participants \
             where group_id = ? and user_id = ? and friend_user_id is null",
        )
        .bind(group_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if delete.rows_affected() == 0 {
            match Self::fetch(&mut *tx, group_id, user_id).await? {
                Some(_) => bail!(Error::AlreadyDrawn { group_id, user_id }),
                None => bail!(Error::NotParticipant { group_id, user_id }),
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Fetches the participant entry of the user in the group
    pub async fn fetch(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<Option<Self>> {
        let participant = sqlx::query_as(
            "select group_id, user_id, joined_at, friend_user_id from participants \
             where group_id = ? and user_id = ?",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;

        Ok(participant)
    }

    /// Ids of participants of the group without an assigned friend
    pub async fn fetch_undrawn(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        group_id: GroupId,
    ) -> Result<Vec<UserId>> {
        let rows: Vec<(UserId,)> = sqlx::query_as(
            "select user_id from participants \
             where group_id = ? and friend_user_id is null order by joined_at, user_id",
        )
        .bind(group_id)
        .fetch_all(db)
        .await?;

        Ok(rows.into_iter().map(|(user_id,)| user_id).collect())
    }

    /// Stores the secret friend of a participant.
    ///
    /// Fails if the participant doesn't exist or has a friend assigned already.
    pub async fn assign_friend(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        group_id: GroupId,
        user_id: UserId,
        friend: UserId,
    ) -> Result<()> {
        let update = sqlx::query(
            "update participants set friend_user_id = ? \
             where group_id = ? and user_id = ? and friend_user_id is null",
        )
        .bind(friend)
        .bind(group_id)
        .bind(user_id)
        .execute(db)
        .await?;

        ensure!(
            update.rows_affected() == 1,
            Error::CannotAssign { group_id, user_id }
        );

        Ok(())
    }
}
