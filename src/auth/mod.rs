//! Authentication: API keys and the request middleware.
//!
//! The single credential type is an opaque API key resolved through
//! [`KeyAuthenticator`]. Authorization is a two-level role model
//! (`user` / `admin`); privileged operations go through
//! [`KeyAuthenticator::require_admin`].

mod api_key;
mod middleware;

pub use api_key::*;
pub use middleware::*;
