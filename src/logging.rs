use env_logger::Env;

/// Initialize `env_logger` once per process. `RUST_LOG` wins over `debug`.
pub fn init(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .try_init();
}
