//! HTTP server

mod http;

pub use http::{run, serve, AppState};

#[cfg(test)]
pub(crate) use http::test_state;
