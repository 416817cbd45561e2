//! # Server Components
//!
//! - [`mock`]: in-process stand-in for the processing service, used by the
//!   `mock_server` binary and the integration tests

pub mod mock;

pub use mock::{MockHits, MockServer, MockService};
