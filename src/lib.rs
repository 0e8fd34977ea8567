//! Call an Entra ID protected HTTP API with an OAuth2 client-credentials token.
//!
//! The crate is split along the two steps of the flow:
//!
//! * [`token`] acquires a bearer token for `{client_id}/.default` and keeps it
//!   cached while it is still valid.
//! * [`api`] attaches that token to a `GET`/`POST` request against the
//!   configured base URL and returns the parsed JSON body.
//!
//! [`report`] turns the outcome into the text printed by the `client` binary,
//! and [`server`] hosts the demo API that validates those tokens.

pub mod api;
pub mod config;
pub mod error;
pub mod report;
pub mod server;
pub mod token;

pub use api::{call_vm_api, ApiClient, ApiMethod, ApiRequest};
pub use config::{ClientConfig, ConfigError, Credentials, ServerConfig};
pub use error::{Error, Result};
pub use token::{EntraIdTokenProvider, TokenSource, TokenState};
