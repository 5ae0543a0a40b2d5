use std::time::Duration;

use clap::Parser;

use crate::transport::ProbeConfig;

/// DNSSEC interference probe
#[derive(Parser, Debug)]
#[command(name = "dnssec-probe")]
#[command(about = "Probe local resolvers for DNSSEC and new record types over UDP and TCP")]
pub struct Cli {
	/// Nameserver address (repeatable); overrides the system configuration
	#[arg(short = 'r', long = "nameserver")]
	pub nameservers: Vec<String>,

	/// Read nameservers from a resolv.conf-format file instead of the system
	#[arg(long = "resolv-conf", conflicts_with = "nameservers")]
	pub resolv_conf: Option<String>,

	/// Destination port for queries
	#[arg(short = 'p', long = "port", default_value = "53")]
	pub port: u16,

	/// Wait after each UDP query before retransmitting, in milliseconds
	#[arg(long = "udp-timeout", default_value = "5000")]
	pub udp_timeout: u64,

	/// UDP attempts per nameserver
	#[arg(short = 'a', long = "attempts", default_value = "2", value_parser = clap::value_parser!(u32).range(1..))]
	pub attempts: u32,

	/// Upper bound on one TCP connection attempt in milliseconds (0 disables)
	#[arg(long = "tcp-timeout", default_value = "10000")]
	pub tcp_timeout: u64,

	/// Endpoint receiving telemetry events as JSON; events are logged when unset
	#[arg(long = "telemetry-url")]
	pub telemetry_url: Option<String>,

	/// Output CSV file path for the report
	#[arg(short = 'o', long = "output")]
	pub output: Option<String>,
}

impl Cli {
	pub fn probe_config(&self) -> ProbeConfig {
		ProbeConfig {
			port: self.port,
			udp_timeout: Duration::from_millis(self.udp_timeout),
			udp_attempts: self.attempts,
			tcp_timeout: match self.tcp_timeout {
				0 => None,
				ms => Some(Duration::from_millis(ms)),
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults_match_resolv_conf() {
		let cli = Cli::parse_from(["dnssec-probe"]);
		let config = cli.probe_config();
		assert_eq!(config.port, 53);
		assert_eq!(config.udp_attempts, 2);
		assert_eq!(config.udp_timeout, Duration::from_millis(5000));
		assert_eq!(config.tcp_timeout, Some(Duration::from_millis(10_000)));
	}

	#[test]
	fn test_repeatable_nameservers_and_disabled_tcp_timeout() {
		let cli = Cli::parse_from([
			"dnssec-probe", "-r", "10.0.0.1", "-r", "10.0.0.2", "--tcp-timeout", "0",
		]);
		assert_eq!(cli.nameservers, ["10.0.0.1", "10.0.0.2"]);
		assert_eq!(cli.probe_config().tcp_timeout, None);
	}

	#[test]
	fn test_zero_attempts_rejected() {
		assert!(Cli::try_parse_from(["dnssec-probe", "--attempts", "0"]).is_err());
		let cli = Cli::try_parse_from(["dnssec-probe", "-a", "1"]).unwrap();
		assert_eq!(cli.probe_config().udp_attempts, 1);
	}

	#[test]
	fn test_resolv_conf_conflicts_with_nameservers() {
		let result = Cli::try_parse_from([
			"dnssec-probe", "-r", "10.0.0.1", "--resolv-conf", "/etc/resolv.conf",
		]);
		assert!(result.is_err());
	}
}
