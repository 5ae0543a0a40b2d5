use std::net::Ipv4Addr;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::ProbeError;

/// Where the list of recursive nameservers comes from.
pub trait NameserverSource: Send + Sync {
	/// Return nameserver addresses in configured order.
	fn read(&self) -> Result<Vec<String>, ProbeError>;
}

/// Nameservers given explicitly, e.g. on the command line
#[derive(Debug, Clone)]
pub struct StaticNameservers(pub Vec<String>);

impl NameserverSource for StaticNameservers {
	fn read(&self) -> Result<Vec<String>, ProbeError> {
		Ok(self.0.clone())
	}
}

/// Nameservers from a resolv.conf-format file
#[derive(Debug, Clone)]
pub struct ResolvConfFile(pub PathBuf);

impl NameserverSource for ResolvConfFile {
	fn read(&self) -> Result<Vec<String>, ProbeError> {
		let content = std::fs::read_to_string(&self.0).map_err(|e| {
			ProbeError::SourceUnavailable(format!("{}: {}", self.0.display(), e))
		})?;
		Ok(parse_resolv_conf(&content))
	}
}

/// The platform's own resolver configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNameservers;

impl NameserverSource for SystemNameservers {
	#[cfg(any(unix, windows))]
	fn read(&self) -> Result<Vec<String>, ProbeError> {
		let (config, _opts) = hickory_resolver::system_conf::read_system_conf()
			.map_err(|e| ProbeError::SourceUnavailable(e.to_string()))?;

		// Each server is listed once per protocol; keep the first occurrence
		let mut servers: Vec<String> = Vec::new();
		for ns in config.name_servers() {
			let ip = ns.socket_addr.ip().to_string();
			if !servers.contains(&ip) {
				servers.push(ip);
			}
		}
		Ok(servers)
	}

	#[cfg(not(any(unix, windows)))]
	fn read(&self) -> Result<Vec<String>, ProbeError> {
		Err(ProbeError::PlatformUnsupported(std::env::consts::OS.to_string()))
	}
}

/// Extract the addresses of `nameserver` lines.
///
/// Comments (`#` or `;`) and other directives are skipped.
pub fn parse_resolv_conf(content: &str) -> Vec<String> {
	let mut servers = Vec::new();
	for line in content.lines() {
		let trimmed = line.trim();
		if trimmed.starts_with('#') || trimmed.starts_with(';') {
			continue;
		}
		let mut parts = trimmed.split_whitespace();
		if parts.next() != Some("nameserver") {
			continue;
		}
		if let Some(addr) = parts.next() {
			servers.push(addr.to_string());
		}
	}
	servers
}

/// Read nameservers from `source` and keep the IPv4 ones, in order.
///
/// Fails before any query can be sent if the source yields nothing usable.
pub fn resolve_ipv4(source: &dyn NameserverSource) -> Result<Vec<Ipv4Addr>, ProbeError> {
	let servers = source.read()?;
	if servers.is_empty() {
		return Err(ProbeError::NoNameservers);
	}

	let ipv4: Vec<Ipv4Addr> = servers.iter()
		.filter_map(|s| match s.trim().parse::<Ipv4Addr>() {
			Ok(ip) => Some(ip),
			Err(_) => {
				debug!(nameserver = %s, "skipping non-IPv4 nameserver");
				None
			}
		})
		.collect();

	if ipv4.is_empty() {
		return Err(ProbeError::NoIpv4Nameservers);
	}
	info!(nameservers = ?ipv4, "IPv4 resolvers");
	Ok(ipv4)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn source(list: &[&str]) -> StaticNameservers {
		StaticNameservers(list.iter().map(|s| s.to_string()).collect())
	}

	#[test]
	fn test_parse_resolv_conf() {
		let content = "\
# generated by NetworkManager
search example.com
nameserver 192.168.1.1
; nameserver 10.9.9.9
nameserver   fe80::1%eth0
options edns0 trust-ad
nameserver 9.9.9.9
";
		assert_eq!(parse_resolv_conf(content), ["192.168.1.1", "fe80::1%eth0", "9.9.9.9"]);
	}

	#[test]
	fn test_ipv4_filter_keeps_order_and_duplicates() {
		let servers = resolve_ipv4(&source(&["10.0.0.2", "2606:4700::1111", "10.0.0.1", "10.0.0.2"])).unwrap();
		let expected: Vec<Ipv4Addr> = ["10.0.0.2", "10.0.0.1", "10.0.0.2"]
			.iter()
			.map(|s| s.parse().unwrap())
			.collect();
		assert_eq!(servers, expected);
	}

	#[test]
	fn test_empty_source_fails() {
		assert!(matches!(resolve_ipv4(&source(&[])), Err(ProbeError::NoNameservers)));
	}

	#[test]
	fn test_ipv6_only_source_fails() {
		let result = resolve_ipv4(&source(&["::1", "2001:4860:4860::8888"]));
		assert!(matches!(result, Err(ProbeError::NoIpv4Nameservers)));
	}

	#[test]
	fn test_missing_file_is_unavailable() {
		let result = ResolvConfFile(PathBuf::from("/nonexistent/resolv.conf")).read();
		assert!(matches!(result, Err(ProbeError::SourceUnavailable(_))));
	}
}
