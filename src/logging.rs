use tracing_subscriber::EnvFilter;

/// Set up logging to stderr.
///
/// Defaults to `info`; use the RUST_LOG environment variable to override,
/// e.g. `RUST_LOG=dnssec_probe=debug` to see decoded responses or
/// `RUST_LOG=dnssec_probe::demux=trace` for individual socket events.
pub fn init_logging() {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(false)
		.try_init()
		.ok();
}
