//! Mutations main entry point

use async_graphql::Object;
use derivative::Derivative;

mod groups;
mod users;

#[derive(Debug, Derivative)]
#[derivative(Default(new = "true"))]
pub struct Mutation {
    /// User related mutations
    users: users::UsersMutations,
    /// Group related mutations
    groups: groups::GroupsMutations,
}

#[Object]
impl Mutation {
    async fn users(&self) -> &users::UsersMutations {
        &self.users
    }

    async fn groups(&self) -> &groups::GroupsMutations {
        &self.groups
    }
}
