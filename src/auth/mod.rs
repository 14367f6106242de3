//! Password hashing, token issuing and the bearer-token gate.

pub mod jwt;
pub mod middleware;
pub mod password;

pub use middleware::{require_auth, AuthUser};
