//! Utility functions and helpers.

mod logging;
mod run_id;
mod shutdown;

pub use logging::{LogFormat, init_logging};
pub use run_id::RunId;
pub use shutdown::ShutdownSignal;
