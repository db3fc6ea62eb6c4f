use tracing_subscriber::EnvFilter;

/// Filter comes from `FLOWHOME_LOG`, falling back to info level.
pub fn init() {
    let filter = EnvFilter::try_from_env("FLOWHOME_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
