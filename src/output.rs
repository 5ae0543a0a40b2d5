use comfy_table::{Table, ContentArrangement, presets::UTF8_FULL};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::report::{data_key, transmission_key, Report};
use crate::transport::{ProbeConfig, Protocol, RecordKind};

/// Print a summary of the probe configuration before running.
pub fn print_config_summary(source: &str, config: &ProbeConfig) {
	println!("DNSSEC Probe Configuration");
	println!("==========================");
	println!("Nameservers:    {}", source);
	println!("Port:           {}", config.port);
	println!("UDP timeout:    {} ms", config.udp_timeout.as_millis());
	println!("UDP attempts:   {} per nameserver", config.udp_attempts);
	match config.tcp_timeout {
		Some(limit) => println!("TCP timeout:    {} ms", limit.as_millis()),
		None => println!("TCP timeout:    none"),
	}
	let records: Vec<&str> = RecordKind::ALL.iter().map(|r| r.name()).collect();
	println!("Record types:   {}", records.join(", "));
	println!();
}

/// Size in bytes of a base64 report value.
fn decoded_len(value: Option<&str>) -> usize {
	value
		.and_then(|v| STANDARD.decode(v).ok())
		.map(|bytes| bytes.len())
		.unwrap_or(0)
}

fn response_cell(report: &Report, record: RecordKind, protocol: Protocol) -> String {
	match decoded_len(report.get(&data_key(record, protocol))) {
		0 => "-".to_string(),
		n => format!("{} B", n),
	}
}

/// Print per-record-type transmissions and response sizes.
pub fn print_report_table(report: &Report) {
	let mut table = Table::new();
	table.load_preset(UTF8_FULL);
	table.set_content_arrangement(ContentArrangement::Dynamic);
	table.set_header(vec![
		"Record",
		"UDP tx", "UDP response",
		"TCP tx", "TCP response",
	]);

	for record in RecordKind::ALL {
		let tx = |protocol| {
			report.get(&transmission_key(record, protocol))
				.unwrap_or("0")
				.to_string()
		};
		table.add_row(vec![
			record.name().to_string(),
			tx(Protocol::Udp),
			response_cell(report, record, Protocol::Udp),
			tx(Protocol::Tcp),
			response_cell(report, record, Protocol::Tcp),
		]);
	}

	println!("\nMeasurement {}", report.measurement_id);
	println!("=================================================\n");
	println!("{table}");
}

/// Write the flat report to a CSV file as `field,value` rows.
pub fn write_csv(path: &str, report: &Report) -> Result<()> {
	let mut writer = csv::Writer::from_path(path)?;

	writer.write_record(["field", "value"])?;
	writer.write_record(["measurement_id", report.measurement_id.as_str()])?;
	for (field, value) in &report.fields {
		writer.write_record([field.as_str(), value.as_str()])?;
	}

	writer.flush()?;
	println!("\nReport written to: {}", path);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::registry::ResponseRegistry;
	use bytes::Bytes;

	#[test]
	fn test_response_cell() {
		let registry = ResponseRegistry::new();
		registry.store(RecordKind::A, Protocol::Udp, Bytes::from_static(&[1, 2, 3, 4]));
		let report = Report::from_registry(&registry, "id");

		assert_eq!(response_cell(&report, RecordKind::A, Protocol::Udp), "4 B");
		assert_eq!(response_cell(&report, RecordKind::A, Protocol::Tcp), "-");
	}

	#[test]
	fn test_write_csv() {
		let registry = ResponseRegistry::new();
		registry.record_attempt(RecordKind::Https, Protocol::Udp);
		let report = Report::from_registry(&registry, "run-42");

		let path = std::env::temp_dir().join(format!("dnssec-probe-{}.csv", std::process::id()));
		let path_str = path.to_str().unwrap();
		write_csv(path_str, &report).unwrap();

		let content = std::fs::read_to_string(&path).unwrap();
		std::fs::remove_file(&path).unwrap();
		let lines: Vec<&str> = content.lines().collect();
		assert_eq!(lines[0], "field,value");
		assert_eq!(lines[1], "measurement_id,run-42");
		assert!(lines.contains(&"HTTPS_udp_transmission,1"));
		assert_eq!(lines.len(), 2 + report.fields.len());
	}
}
