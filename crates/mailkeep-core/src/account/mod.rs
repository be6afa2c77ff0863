//! Account management module.
//!
//! Provides the session account, its connection-ready credential views, and
//! validation.

mod credentials;
mod model;
mod validation;

pub use credentials::{ConnectionAuth, Credentials, ServerCredentials};
pub use model::{Account, ConnectionConfig, ParseProtocolError, Protocol};
pub use validation::{ValidationError, ValidationResult, validate_account};
