//! SQLite user store.
//!
//! The token core only needs to resolve a subject to a user record, which
//! it does through [`UserDirectory`]. [`UserDatabase`] is the concrete
//! store used by the session operations and the CLI.

mod db;
mod directory;
mod models;
mod queries;


pub use db::UserDatabase;
pub use directory::UserDirectory;
pub use keywarden_core::db::DatabaseError;
pub use models::{NewUserRecord, User};
