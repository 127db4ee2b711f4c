//! Token issuance, verification and the bearer-token gate.

pub mod claims;
pub mod codec;
pub mod encrypted;
pub mod error;
pub mod gate;
pub mod password;
pub mod signed;

pub use claims::Claims;
pub use codec::{TokenCodec, TokenCreationError, TokenError, TokenStrategy};
pub use encrypted::EncryptedTokens;
pub use error::AuthError;
pub use gate::{AuthGate, UserIdentity, extract_bearer};
pub use signed::SignedTokens;
