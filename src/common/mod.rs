//! # Common Components
//!
//! Data types shared by the client and the mock service.
//!
//! ## Modules
//!
//! - [`error`]: the [`ApiFailure`](error::ApiFailure) taxonomy
//! - [`messages`]: endpoints and JSON response bodies
//! - [`request`]: validated upload parameters and their multipart encoding
//! - [`config`]: TOML configuration

pub mod config;
pub mod error;
pub mod messages;
pub mod request;
