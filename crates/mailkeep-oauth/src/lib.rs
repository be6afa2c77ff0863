//! # mailkeep-oauth
//!
//! `OAuth2` token handling for mail providers (IMAP/SMTP).
//!
//! ## Features
//!
//! - **Provider catalogue**: Gmail, Outlook and Yahoo endpoints, plus mail
//!   host detection (`imap.gmail.com` belongs to Google, and so on)
//! - **Token management**: expiry checking and refresh-token exchange
//! - **Address lookup**: resolve the owning email address of a token through
//!   the provider's `OpenID` userinfo endpoint
//! - **SASL mechanisms**: PLAIN (RFC 4616) and XOAUTH2
//!
//! Interactive authorization (browser redirect, device codes) is left to the
//! embedding application; this crate starts from a refresh token.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailkeep_oauth::{OAuthClient, Provider, TokenSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = OAuthClient::new("your_client_id", Provider::google()?);
//!     let source = TokenSource::new(client, "refresh_token_from_setup");
//!
//!     let token = source.access_token(None).await?;
//!     let email = source.client().query_email_address(&token).await?;
//!     println!("Token for {email}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod client;
mod error;
pub mod provider;
pub mod sasl;
mod source;
pub mod token;

pub use client::OAuthClient;
pub use error::{Error, Result};
pub use provider::Provider;
pub use source::TokenSource;
pub use token::Token;
