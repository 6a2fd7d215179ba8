//! Logging for unit tests.

/// Sets up logging of events reported by the crate and its tests.
///
/// Use the RUST_LOG environment variable to override the defaults.
///
/// E.g. to see every address set a resolver publishes:
///   RUST_LOG=rpc_pool::resolver=DEBUG
///
/// Or to follow which pool connection each call goes over:
///   RUST_LOG=rpc_pool::pool=TRACE
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_ids(true)
        .without_time()
        .try_init()
        .ok();
}
