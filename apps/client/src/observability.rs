use tracing_subscriber::EnvFilter;

/// Logs go to stderr; stdout belongs to the chat view.
pub fn init_tracing() {
    let filter = std::env::var("PARLOR_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "warn".to_string());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .compact()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
