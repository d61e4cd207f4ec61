//! OAuth 2.1 authorization server.
//!
//! A self-contained authorization server embedded in the gateway. Callers
//! complete an authorization-code flow with PKCE; the upstream consent hop
//! happens against Reddit, and the minted bearer carries the upstream token
//! pair.
//!
//! ## Supported Standards
//! - RFC 9728: OAuth Protected Resource Metadata
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7591: Dynamic Client Registration
//! - RFC 7636: PKCE (S256)
//! - RFC 6749: Authorization Code Grant

pub mod handlers;
pub mod pkce;
pub mod policy;
pub mod store;
pub mod token;
pub mod types;

pub use store::OAuthStateStore;
pub use token::TokenCodec;
