//! Latency and reply-code statistics over a merged set of `TestCase`s.

use std::time::Duration;

use crate::transport::TestCase;

/// Latency statistics over the answered subset of a run. `None` when no
/// case was answered (e.g. the server dropped every packet).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
	pub min: Duration,
	pub max: Duration,
	pub mean: Duration,
	pub median: Duration,
}

/// Full aggregate report over every worker's merged table.
#[derive(Debug, Clone)]
pub struct Report {
	pub total: usize,
	pub answered: usize,
	pub timed_out: usize,
	pub latency: Option<LatencyStats>,
	/// Count of each RCODE value, indexed 0..=15.
	pub rcode_histogram: [usize; 16],
}

/// Compute min/mean/median/max latency (in seconds, as `Duration`) over the
/// answered cases in `cases`, plus an RCODE histogram. `cases` is assumed
/// already merged from every worker's table, in global index order.
pub fn aggregate(cases: &[TestCase]) -> Report {
	let total = cases.len();
	let mut latencies: Vec<Duration> = cases.iter().filter_map(|c| c.latency()).collect();
	let answered = latencies.len();
	let timed_out = total - answered;

	let mut rcode_histogram = [0usize; 16];
	for case in cases {
		if let Some(rcode) = case.rcode {
			rcode_histogram[(rcode & 0x0F) as usize] += 1;
		}
	}

	let latency = if latencies.is_empty() {
		None
	} else {
		latencies.sort();
		let min = latencies[0];
		let max = latencies[latencies.len() - 1];
		let mean = mean_duration(&latencies);
		let median = median_duration(&latencies);
		Some(LatencyStats { min, max, mean, median })
	};

	Report {
		total,
		answered,
		timed_out,
		latency,
		rcode_histogram,
	}
}

fn mean_duration(sorted: &[Duration]) -> Duration {
	let total_nanos: u128 = sorted.iter().map(|d| d.as_nanos()).sum();
	let mean_nanos = total_nanos / sorted.len() as u128;
	Duration::from_nanos(mean_nanos as u64)
}

fn median_duration(sorted: &[Duration]) -> Duration {
	let n = sorted.len();
	if n % 2 == 1 {
		sorted[n / 2]
	} else {
		let a = sorted[n / 2 - 1];
		let b = sorted[n / 2];
		(a + b) / 2
	}
}
