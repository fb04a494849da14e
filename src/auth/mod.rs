//! Authentication
//!
//! Handles:
//! - Password accounts (argon2 hashes)
//! - Stateless HMAC-signed session tokens
//! - Request extractors for the authenticated caller

mod middleware;
mod password;
pub mod session;

pub use middleware::{CurrentUser, MaybeUser};
pub use password::{hash_password, verify_password};
pub use session::{Session, create_session_token, verify_session_token};
