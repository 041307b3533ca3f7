//! Test utilities shared across crate-level unit tests.

pub mod http;
pub mod performance;

pub use http::start_mock_server;
pub use performance::manual_performance;
