//! User queries for the keywarden store.

use keywarden_core::db::{DatabaseError, unix_timestamp};

use super::db::UserDatabase;
use super::models::{NewUserRecord, User};

impl UserDatabase {
    /// Create a new, active user.
    ///
    /// A duplicate username or e-mail is [`DatabaseError::Conflict`].
    pub async fn create_user(&self, record: &NewUserRecord<'_>) -> Result<User, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, first_name, last_name, is_active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(record.id)
        .bind(record.username)
        .bind(record.email)
        .bind(record.password_hash)
        .bind(record.first_name)
        .bind(record.last_name)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_user(record.id).await
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: &str) -> Result<User, DatabaseError> {
        self.find_user(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User {id}")))
    }

    /// Get a user by username.
    pub async fn get_user_by_username(&self, username: &str) -> Result<User, DatabaseError> {
        self.find_user_by_username(username)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User with username {username}")))
    }

    pub async fn find_user(&self, id: &str) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }

    pub async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }

    pub async fn username_exists(&self, username: &str) -> Result<bool, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(self.pool())
            .await?;
        Ok(count > 0)
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(self.pool())
            .await?;
        Ok(count > 0)
    }

    /// Enable or disable login for a user. Returns false if no such user.
    pub async fn set_active(&self, id: &str, active: bool) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(unix_timestamp())
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a user. Tokens already issued to them stop authenticating.
    pub async fn delete_user(&self, id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_users(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }
}
