//! HTTP handlers for connection administration and dynamic module routes.

pub mod connection;
pub mod dynamic;
pub use connection::*;
pub use dynamic::{dispatch, API_ROOT};
