//! CSV and stdout reporting, grounded on the teacher's `csv`/`comfy-table`
//! pairing: one writer for the machine-readable per-case rows, one table
//! for the human-readable run summary.

use std::net::Ipv4Addr;
use std::time::{Instant, SystemTime};

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};

use crate::stats::Report;
use crate::transport::TestCase;

/// Anchors the monotonic clock used for `sent_at`/`received_at` to a wall
/// clock reading, so CSV rows can report epoch nanoseconds even though the
/// run itself is timed with `Instant`.
#[derive(Debug, Clone, Copy)]
pub struct WallClockAnchor {
	instant: Instant,
	wall: SystemTime,
}

impl WallClockAnchor {
	pub fn capture() -> Self {
		WallClockAnchor {
			instant: Instant::now(),
			wall: SystemTime::now(),
		}
	}

	fn epoch_nanos(&self, at: Instant) -> i128 {
		let anchor_epoch = self
			.wall
			.duration_since(SystemTime::UNIX_EPOCH)
			.unwrap_or_default()
			.as_nanos() as i128;
		if at >= self.instant {
			anchor_epoch + (at - self.instant).as_nanos() as i128
		} else {
			anchor_epoch - (self.instant - at).as_nanos() as i128
		}
	}
}

/// Write one CSV row per test case, in global index order:
/// `global_index, ipv4_dotted, sent_epoch_ns, latency_ns_or_empty, rcode_or_empty`.
pub fn write_csv(path: &str, cases: &[TestCase], anchor: WallClockAnchor) -> Result<()> {
	let mut writer = csv::Writer::from_path(path)
		.with_context(|| format!("opening CSV output file '{path}'"))?;

	writer.write_record(["global_index", "ipv4", "sent_epoch_ns", "latency_ns", "rcode"])?;

	for (i, case) in cases.iter().enumerate() {
		let ipv4 = Ipv4Addr::from(case.ipv4);
		let sent_epoch_ns = case
			.sent_at
			.map(|t| anchor.epoch_nanos(t).to_string())
			.unwrap_or_default();
		let latency_ns = case
			.latency()
			.map(|d| d.as_nanos().to_string())
			.unwrap_or_default();
		let rcode = case.rcode.map(|r| r.to_string()).unwrap_or_default();

		writer.write_record([i.to_string(), ipv4.to_string(), sent_epoch_ns, latency_ns, rcode])?;
	}

	writer.flush().context("flushing CSV output")?;
	Ok(())
}

/// Print the human-readable run summary: totals, latency stats, RCODE
/// histogram.
pub fn print_summary(report: &Report) {
	println!("dns64perf run summary");
	println!("======================\n");
	println!("Total queries:  {}", report.total);
	println!("Answered:       {}", report.answered);
	println!("Timed out:      {}", report.timed_out);
	println!();

	let mut table = Table::new();
	table.load_preset(UTF8_FULL);
	table.set_content_arrangement(ContentArrangement::Dynamic);
	table.set_header(vec!["Metric", "Value"]);

	match report.latency {
		Some(latency) => {
			table.add_row(vec!["Min latency".to_string(), format!("{:.6} s", latency.min.as_secs_f64())]);
			table.add_row(vec!["Mean latency".to_string(), format!("{:.6} s", latency.mean.as_secs_f64())]);
			table.add_row(vec!["Median latency".to_string(), format!("{:.6} s", latency.median.as_secs_f64())]);
			table.add_row(vec!["Max latency".to_string(), format!("{:.6} s", latency.max.as_secs_f64())]);
		}
		None => {
			table.add_row(vec!["Min latency".to_string(), "N/A".to_string()]);
			table.add_row(vec!["Mean latency".to_string(), "N/A".to_string()]);
			table.add_row(vec!["Median latency".to_string(), "N/A".to_string()]);
			table.add_row(vec!["Max latency".to_string(), "N/A".to_string()]);
		}
	}
	println!("{table}");

	println!("\nRCODE histogram");
	println!("===============\n");
	let mut rcode_table = Table::new();
	rcode_table.load_preset(UTF8_FULL);
	rcode_table.set_content_arrangement(ContentArrangement::Dynamic);
	rcode_table.set_header(vec!["RCODE", "Count"]);
	for (rcode, count) in report.rcode_histogram.iter().enumerate() {
		if *count > 0 {
			rcode_table.add_row(vec![rcode.to_string(), count.to_string()]);
		}
	}
	rcode_table.add_row(vec!["timed-out".to_string(), report.timed_out.to_string()]);
	println!("{rcode_table}");
}
