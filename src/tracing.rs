/// Initializes the tracing/logging infrastructure for applications using
/// this crate.
///
/// Sets up structured logging with environment-based filtering: control
/// verbosity via `RUST_LOG` (e.g. `RUST_LOG=fetch_cell=debug` for cache and
/// scheduler internals only).
///
/// # Example
///
/// ```ignore
/// setup_tracing();
/// tracing::info!("application started");
/// ```
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
