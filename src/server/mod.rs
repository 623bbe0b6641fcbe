//! HTTP interface exposing the health verdict.

mod listener;

pub use listener::{HealthServer, ServerError};
