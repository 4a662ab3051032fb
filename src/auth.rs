//! Scope vocabulary, credential records, token secrets, and PKCE helpers.

pub mod credential;
pub mod pkce;
pub mod scope;
pub mod secret;

pub use credential::*;
pub use pkce::*;
pub use scope::*;
pub use secret::*;
