use crate::transport::RecordKind;

/// Zone operated for the measurement; every query lands at or under it.
pub const APEX_DOMAIN: &str = "dnssec-experiment-moz.net";

/// SMIMEA owner name: SHA2-224 hash of the local part under `_smimecert`
/// (RFC 8162)
pub const SMIMEA_DOMAIN: &str =
	"8c6976e5b5410415bde908bd4dee15dfb167a9c873fc4bb8a81f6f2a._smimecert.dnssec-experiment-moz.net";

/// HTTPS owner name for port 443 (RFC 9460 port-prefix naming)
pub const HTTPS_DOMAIN: &str = "_443._tcp.dnssec-experiment-moz.net";

/// Return the name queried for `record`.
pub fn query_name(record: RecordKind) -> &'static str {
	match record {
		RecordKind::Smimea => SMIMEA_DOMAIN,
		RecordKind::Https => HTTPS_DOMAIN,
		_ => APEX_DOMAIN,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_dedicated_names() {
		assert_eq!(query_name(RecordKind::Smimea), SMIMEA_DOMAIN);
		assert_eq!(query_name(RecordKind::Https), HTTPS_DOMAIN);
	}

	#[test]
	fn test_everything_else_uses_apex() {
		for record in RecordKind::ALL {
			if record == RecordKind::Smimea || record == RecordKind::Https {
				continue;
			}
			assert_eq!(query_name(record), APEX_DOMAIN);
		}
	}

	#[test]
	fn test_names_are_under_apex() {
		for record in RecordKind::ALL {
			assert!(query_name(record).ends_with(APEX_DOMAIN));
		}
	}
}
