//! keywarden token service library
//!
//! - RS256 (JWS) and RSA-OAEP/A256GCM (JWE) bearer tokens over one process
//!   key pair
//! - The bearer-token gate that resolves a request to a known user
//! - Session operations: login, register, refresh, logout, verify, me
//! - `SQLite` user store

pub mod auth;
pub mod server;
pub mod storage;

pub use auth::{AuthError, AuthGate, Claims, TokenCodec, TokenError, UserIdentity};
pub use server::SessionService;
pub use storage::{UserDatabase, UserDirectory};
