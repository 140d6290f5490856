//! Users and their credentials

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_graphql::{InputObject, SimpleObject, scalar};
use chrono::NaiveDate;
use color_eyre::eyre::{Result, bail, eyre};
use serde::{Deserialize, Serialize};
use sqlx::prelude::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("User with this email already exists")]
    EmailTaken,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Password can't be empty")]
    EmptyPassword,
}

/// Newtype for user id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct UserId(i64);

scalar!(UserId);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl UserId {
    /// Fetches `User` with this id from database
    pub async fn fetch(
        self,
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
    ) -> Result<Option<User>> {
        User::fetch(db, self).await
    }
}

/// User queryable data
#[derive(Debug, Clone, PartialEq, SimpleObject, FromRow)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

impl User {
    /// Fetches user from the database
    pub async fn fetch(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        user_id: UserId,
    ) -> Result<Option<Self>> {
        let user = sqlx::query_as(
            "select id, name, email, gender, date_of_birth from users where id = ?",
        )
        .bind(user_id)
        .fetch_optional(db)
        .await?;

        Ok(user)
    }
}

/// Data needed to register a new user
#[derive(Debug, Clone, InputObject)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

impl NewUser {
    /// Helper to create an user with only the required fields
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
            gender: None,
            date_of_birth: None,
        }
    }

    /// Creates user in the database, storing the password hash only
    pub async fn create(
        self,
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
    ) -> Result<UserId> {
        if self.password.is_empty() {
            bail!(Error::EmptyPassword);
        }

        let password_hash = hash_password(self.password).await?;

        let result = sqlx::query(
            "insert into users (name, email, password_hash, gender, date_of_birth) values (?, ?, ?, ?, ?)",
        )
        .bind(self.name)
        .bind(self.email)
        .bind(password_hash)
        .bind(self.gender)
        .bind(self.date_of_birth)
        .execute(db)
        .await;

        match result {
            Ok(result) => Ok(UserId(result.last_insert_rowid())),
            Err(err)
                if err
                    .as_database_error()
                    .is_some_and(|err| err.is_unique_violation()) =>
            {
                bail!(Error::EmailTaken)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Stored credentials of an user
#[derive(Debug, Clone, FromRow)]
pub struct Credential {
    pub user_id: UserId,
    pub password_hash: String,
}

impl Credential {
    /// Fetches credentials of the user with given email
    pub async fn fetch(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        email: &str,
    ) -> Result<Option<Self>> {
        let credential =
            sqlx::query_as("select id as user_id, password_hash from users where email = ?")
                .bind(email)
                .fetch_optional(db)
                .await?;

        Ok(credential)
    }

    /// Checks the password against the stored hash
    pub async fn verify(&self, password: &str) -> Result<bool> {
        let password_hash = self.password_hash.clone();
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || verify_password(&password_hash, &password))
            .await
            .map_err(|err| eyre!("Password verification task panicked: {err}"))?
    }

    /// Checks the email and password pair, returning the id of the user they belong to
    pub async fn authenticate(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        email: &str,
        password: &str,
    ) -> Result<UserId> {
        let Some(credential) = Self::fetch(db, email).await? else {
            bail!(Error::InvalidCredentials);
        };

        if !credential.verify(password).await? {
            bail!(Error::InvalidCredentials);
        }

        Ok(credential.user_id)
    }
}

/// Hashes the password on the blocking pool, argon2 is too slow for the async workers
async fn hash_password(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|err| eyre!("Password hashing failed: {err}"))?;

        Ok(hash.to_string())
    })
    .await
    .map_err(|err| eyre!("Password hashing task panicked: {err}"))?
}

fn verify_password(password_hash: &str, password: &str) -> Result<bool> {
    let hash = PasswordHash::new(password_hash)
        .map_err(|err| eyre!("Invalid password hash stored: {err}"))?;

    match Argon2::default().verify_password(password.as_bytes(), &hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(err) => Err(eyre!("Password verification failed: {err}")),
    }
}
