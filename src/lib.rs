//! # Bucketr (multi-tenant key-value buckets)
//!
//! `bucketr` stores named buckets of string key-value pairs on behalf of
//! authenticated users.
//!
//! ## Authentication
//!
//! A single `POST /api/v1/auth/login` endpoint both registers and signs in:
//! the first login for an unseen username creates the account (`201`), later
//! logins verify the bcrypt hash (`200`) or fail with `403`. Both paths return a
//! stateless HS256 bearer token whose only claim is the username. The signing
//! key is generated at process start, so a restart invalidates every token.
//!
//! ## Ownership
//!
//! Buckets are addressed by `(name, owner)`. The owner always comes from the
//! verified token, never from the request, so two users can hold buckets with
//! the same name without ever observing each other's data.
//!
//! Writing a key is a single-field update on the bucket document; concurrent
//! writes to different keys of the same bucket never clobber each other.

pub mod api;
pub mod auth;
pub mod buckets;
pub mod cli;
pub mod error;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
