//! Read-only user lookup used to resolve token subjects.

use std::future::Future;

use keywarden_core::db::DatabaseError;

use super::db::UserDatabase;
use super::models::User;

/// Source of user records for authentication.
///
/// `Ok(None)` means the user does not exist; `Err` is a storage fault.
pub trait UserDirectory: Send + Sync {
    fn find_by_id(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<User>, DatabaseError>> + Send;

    fn find_by_username(
        &self,
        username: &str,
    ) -> impl Future<Output = Result<Option<User>, DatabaseError>> + Send;
}

impl UserDirectory for UserDatabase {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, DatabaseError> {
        self.find_user(id).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, DatabaseError> {
        self.find_user_by_username(username).await
    }
}
