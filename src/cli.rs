use clap::Parser;

/// DNS64 translator performance tester
#[derive(Parser, Debug)]
#[command(name = "dns64perf")]
#[command(about = "Load generator and latency/rcode harness for DNS64 translators")]
pub struct Cli {
	/// DNS64 server IPv6 address
	pub server: String,

	/// UDP port on the server
	pub port: String,

	/// IPv4 subnet to synthesize query targets from, as A.B.C.D/M
	pub subnet: String,

	/// Total number of queries to send across all workers
	pub num_req: u32,

	/// Queries per burst, per worker
	pub burst_size: u32,

	/// Number of worker threads
	pub threads: u32,

	/// Nominal delay between bursts, in nanoseconds (divided across workers
	/// for phase offset)
	pub burst_delay_ns: u64,

	/// Per-query timeout, in decimal seconds (sub-second allowed)
	pub timeout_s: String,
}
