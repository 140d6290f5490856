//! Main query entry point

use async_graphql::Object;
use derivative::Derivative;

mod groups;
mod users;

#[derive(Debug, Derivative)]
#[derivative(Default(new = "true"))]
pub struct Query {
    /// User related queries
    users: users::UsersQueries,
    /// Group related queries
    groups: groups::GroupsQueries,
}

#[Object]
impl Query {
    async fn users(&self) -> &users::UsersQueries {
        &self.users
    }

    async fn groups(&self) -> &groups::GroupsQueries {
        &self.groups
    }
}
