//! Logging setup for binaries and tests

pub use log::{debug, info, warn, error, trace};

/// Initialize the logging system
///
/// `RUST_LOG` wins when it is set; otherwise `default_level` (for example
/// `"info"` or `"frame_engine=debug"`) is used as the filter.
pub fn init(default_level: &str) {
    let env = env_logger::Env::default().default_filter_or(default_level);
    // A second init (e.g. from several tests) is not an error worth surfacing.
    let _ = env_logger::Builder::from_env(env).try_init();
}
