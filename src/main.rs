mod cli;
mod demux;
mod dns;
mod domains;
mod error;
mod logging;
mod output;
mod probe;
mod registry;
mod report;
mod resolver;
mod tcp;
mod telemetry;
mod transport;
mod udp;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use crate::cli::Cli;
use crate::probe::Probe;
use crate::resolver::{NameserverSource, ResolvConfFile, StaticNameservers, SystemNameservers};
use crate::tcp::TokioStreamConnector;
use crate::telemetry::{HttpSink, LogSink, TelemetrySink};
use crate::udp::UdpProbeSocket;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	logging::init_logging();

	// Explicit nameservers win over a resolv.conf file, which wins over the system
	let (source, source_label): (Box<dyn NameserverSource>, String) = if !cli.nameservers.is_empty() {
		let label = cli.nameservers.join(", ");
		(Box::new(StaticNameservers(cli.nameservers.clone())), label)
	} else if let Some(path) = &cli.resolv_conf {
		(Box::new(ResolvConfFile(PathBuf::from(path))), path.clone())
	} else {
		(Box::new(SystemNameservers), "system configuration".to_string())
	};

	let sink: Box<dyn TelemetrySink> = match &cli.telemetry_url {
		Some(url) => Box::new(HttpSink::new(url)?),
		None => Box::new(LogSink),
	};

	let config = cli.probe_config();
	output::print_config_summary(&source_label, &config);

	let probe = Probe::new(
		config,
		source,
		Arc::new(UdpProbeSocket::new()),
		Arc::new(TokioStreamConnector),
		sink,
	);
	println!("Running measurement {}...", probe.measurement_id());
	let report = probe.run().await?;

	output::print_report_table(&report);

	if let Some(path) = &cli.output {
		output::write_csv(path, &report)?;
	}

	Ok(())
}
