mod cli;
mod config;
mod dns;
mod fingerprint;
mod output;
mod stats;
mod timer;
mod transport;
mod worker;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use crate::cli::Cli;
use crate::output::WallClockAnchor;
use crate::transport::{RunConfig, TestCase};
use crate::worker::Worker;

/// Time between launching the run controller and the first scheduled
/// burst, giving every worker thread time to spin up before `T0` arrives.
const STARTUP_SLACK: Duration = Duration::from_secs(2);

fn main() {
	let cli = Cli::parse();

	let config = match config::validate(&cli) {
		Ok(config) => config,
		Err(e) => {
			eprintln!("{e}");
			std::process::exit(1);
		}
	};

	if let Err(e) = run(config) {
		eprintln!("{e}");
		std::process::exit(1);
	}
}

fn run(config: RunConfig) -> anyhow::Result<()> {
	let anchor = WallClockAnchor::capture();
	let t0 = Instant::now() + STARTUP_SLACK;
	let stop = Arc::new(AtomicBool::new(false));
	let worker_count = config.threads;
	let phase_offset = config.burst_interval() / worker_count.max(1);

	let mut handles = Vec::with_capacity(worker_count as usize);
	let mut spawn_failure = None;
	for w in 0..worker_count {
		let worker = Worker::new(w, worker_count, config.clone());
		let worker_stop = stop.clone();
		let start = t0 + phase_offset * w;
		match thread::Builder::new()
			.name(format!("worker-{w}"))
			.spawn(move || worker.run(start, worker_stop))
		{
			Ok(handle) => handles.push(handle),
			Err(e) => {
				spawn_failure = Some(anyhow::Error::new(e).context(format!("spawning worker {w}")));
				break;
			}
		}
	}

	// A spawn failure signals every already-running worker to stop and joins
	// them before returning, rather than abandoning live, unjoined threads.
	if spawn_failure.is_some() {
		stop.store(true, std::sync::atomic::Ordering::Release);
	}

	let mut per_worker_tables = Vec::with_capacity(handles.len());
	let mut failure = spawn_failure;
	for (w, handle) in handles.into_iter().enumerate() {
		match handle.join() {
			Ok(Ok(cases)) => per_worker_tables.push(cases),
			Ok(Err(e)) => {
				failure.get_or_insert(e);
			}
			Err(_) => {
				failure.get_or_insert(anyhow::anyhow!("worker {w} thread panicked"));
			}
		}
	}

	// Partial data is never written on a fatal abort: if any worker failed,
	// every other worker has already been joined above, and we bail out
	// here before touching the aggregator or the CSV writer.
	if let Some(e) = failure {
		return Err(e);
	}

	let merged = merge_global_order(&config, per_worker_tables);
	let report = stats::aggregate(&merged);
	output::print_summary(&report);
	output::write_csv("dns64perf.csv", &merged, anchor)?;

	Ok(())
}

/// Interleave each worker's local table into global index order: worker
/// `w`'s local slot `j` holds global index `j*threads + w` (§4.A).
fn merge_global_order(config: &RunConfig, per_worker_tables: Vec<Vec<TestCase>>) -> Vec<TestCase> {
	let mut merged: Vec<Option<TestCase>> = (0..config.num_req).map(|_| None).collect();
	for (w, table) in per_worker_tables.into_iter().enumerate() {
		for (j, case) in table.into_iter().enumerate() {
			let global_index = j as u32 * config.threads + w as u32;
			merged[global_index as usize] = Some(case);
		}
	}
	merged.into_iter().map(|c| c.expect("every global index is owned by exactly one worker")).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn case(ipv4: u32) -> TestCase {
		TestCase::new(ipv4)
	}

	#[test]
	fn merge_interleaves_worker_tables_by_global_index() {
		let config = RunConfig {
			server: "::1".parse().unwrap(),
			port: 53,
			base_ip: 0,
			netmask: 24,
			num_req: 8,
			burst_size: 2,
			threads: 2,
			burst_delay_ns: 1,
			timeout: Duration::from_secs(1),
		};
		// worker 0 owns even global indices, worker 1 owns odd (tiny-run scenario)
		let worker0 = vec![case(0), case(2), case(4), case(6)];
		let worker1 = vec![case(1), case(3), case(5), case(7)];
		let merged = merge_global_order(&config, vec![worker0, worker1]);
		let ipv4s: Vec<u32> = merged.iter().map(|c| c.ipv4).collect();
		assert_eq!(ipv4s, vec![0, 1, 2, 3, 4, 5, 6, 7]);
	}
}
