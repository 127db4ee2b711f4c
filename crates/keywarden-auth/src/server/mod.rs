//! Session operations over the token codec and user store.

pub mod session_svc;
pub mod types;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod session_svc_tests;

pub use session_svc::{LOGOUT_MESSAGE, SessionService};
pub use types::{
    AuthResponse, ErrorResponse, LogoutResponse, NewUser, PublicKeyResponse, TOKEN_TYPE,
    VerifyResponse,
};
