//! Identity: password hashing, bearer tokens and the login flow.

pub mod authenticator;
pub mod hasher;
pub mod token;

pub use authenticator::{AuthError, Authenticator, Login};
pub use hasher::{HashError, PasswordHasher, MAX_PASSWORD_BYTES};
pub use token::{Claims, SigningKey, TokenError, TokenIssuer};
