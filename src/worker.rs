//! Couples a paced sender with a concurrent receiver on one connected
//! UDP/IPv6 socket: `INIT -> SENDING -> DRAINING -> DONE`.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use crate::dns;
use crate::fingerprint;
use crate::timer::PacedTimer;
use crate::transport::{RunConfig, TestCase};

pub struct Worker {
	id: u32,
	count: u32,
	config: RunConfig,
}

impl Worker {
	pub fn new(id: u32, count: u32, config: RunConfig) -> Self {
		Worker { id, count, config }
	}

	/// Opens the socket, drives the full SENDING/DRAINING lifecycle, and
	/// returns this worker's completed `TestCase` table. `stop` is a
	/// run-wide abort flag shared by every worker; setting it cancels the
	/// pacer at its next slot boundary and bounds the receiver's exit by
	/// one socket-read timeout.
	pub fn run(self, start: Instant, stop: Arc<AtomicBool>) -> Result<Vec<TestCase>> {
		let config = self.config;
		let worker_id = self.id;
		let worker_count = self.count;

		let socket = UdpSocket::bind("[::]:0").context("binding worker UDP socket")?;
		socket
			.connect((config.server, config.port))
			.context("connecting worker UDP socket to server")?;

		let n_per_worker = config.requests_per_worker() as usize;
		let cases: Arc<Vec<Mutex<TestCase>>> = Arc::new(
			(0..n_per_worker as u32)
				.map(|j| {
					Mutex::new(TestCase::new(fingerprint::ipv4_for(
						config.base_ip,
						j,
						worker_id,
						worker_count,
					)))
				})
				.collect(),
		);

		let recv_socket = socket
			.try_clone()
			.context("cloning worker socket for receiver thread")?;
		// Polled well under the query timeout so that once the drain deadline
		// below is armed, the receiver never overshoots it by more than one
		// poll interval instead of by up to one full `SO_RCVTIMEO` period.
		let poll_interval = config.timeout.min(Duration::from_millis(20));
		recv_socket
			.set_read_timeout(Some(poll_interval))
			.context("setting worker socket receive timeout")?;

		let cases_for_recv = cases.clone();
		let stop_for_recv = stop.clone();
		let drain_deadline: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
		let drain_deadline_for_recv = drain_deadline.clone();

		let recv_handle = thread::Builder::new()
			.name(format!("Receiver {worker_id}"))
			.spawn(move || {
				receive_loop(
					recv_socket,
					cases_for_recv,
					worker_id,
					worker_count,
					n_per_worker,
					stop_for_recv,
					drain_deadline_for_recv,
				)
			})
			.context("spawning receiver thread")?;

		let cases_for_send = cases.clone();
		let burst_size = config.burst_size;
		let send_socket = socket;
		let pacer = PacedTimer::start_with_stop(
			format!("Sender {worker_id}"),
			|| {},
			move |b| {
				for q in 0..burst_size {
					let j = b as u32 * burst_size + q;
					let txid = fingerprint::txid_for(j, worker_id, worker_count);
					let ipv4 = cases_for_send[j as usize].lock().unwrap().ipv4;
					let qname = fingerprint::qname_for(ipv4);
					let bytes = dns::encode_query(&qname, txid);
					cases_for_send[j as usize].lock().unwrap().sent_at = Some(Instant::now());
					// A failed send leaves the case unanswered; it is
					// reported as timed-out, not retried (see error design).
					let _ = send_socket.send(&bytes);
				}
			},
			start,
			config.burst_interval(),
			config.bursts_per_worker(),
			stop.clone(),
		);

		pacer
			.join()
			.map_err(|_| anyhow!("sender thread for worker {worker_id} panicked"))?;
		// Armed with the *current* instant, not a stale one: any receive call
		// already blocked when this lands will observe it on its very next
		// loop iteration, bounding the remaining drain window to one more
		// `poll_interval` rather than a fresh full timeout.
		*drain_deadline.lock().unwrap() = Some(Instant::now() + config.timeout);

		recv_handle
			.join()
			.map_err(|_| anyhow!("receiver thread for worker {worker_id} panicked"))?;

		let cases = Arc::try_unwrap(cases)
			.map_err(|_| anyhow!("worker {worker_id} table still referenced after join"))?;
		Ok(cases.into_iter().map(|m| m.into_inner().unwrap()).collect())
	}
}

#[allow(clippy::too_many_arguments)]
fn receive_loop(
	socket: UdpSocket,
	cases: Arc<Vec<Mutex<TestCase>>>,
	worker_id: u32,
	worker_count: u32,
	n_per_worker: usize,
	stop: Arc<AtomicBool>,
	drain_deadline: Arc<Mutex<Option<Instant>>>,
) {
	let mut buf = [0u8; 512];

	loop {
		if stop.load(Ordering::Acquire) {
			return;
		}
		if let Some(deadline) = *drain_deadline.lock().unwrap() {
			if Instant::now() >= deadline {
				return;
			}
		}
		if all_answered(&cases) {
			return;
		}

		match socket.recv(&mut buf) {
			Ok(len) => {
				if let Ok(header) = dns::decode_reply(&buf[..len]) {
					if let Some(j) = fingerprint::slot_for_txid(header.id, worker_id, worker_count) {
						let j = j as usize;
						if j < n_per_worker {
							let mut case = cases[j].lock().unwrap();
							if !case.answered && case.sent_at.is_some() {
								case.received_at = Some(Instant::now());
								case.answered = true;
								case.rcode = Some(header.rcode);
							}
						}
					}
				}
			}
			Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {}
			Err(_) => return,
		}
	}
}

fn all_answered(cases: &[Mutex<TestCase>]) -> bool {
	cases.iter().all(|c| c.lock().unwrap().answered)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::net::SocketAddr;

	fn echo_server(rcode: u8) -> (SocketAddr, thread::JoinHandle<()>, Arc<AtomicBool>) {
		let socket = UdpSocket::bind("[::1]:0").unwrap();
		let addr = socket.local_addr().unwrap();
		socket.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
		let stop = Arc::new(AtomicBool::new(false));
		let stop_clone = stop.clone();
		let handle = thread::spawn(move || {
			let mut buf = [0u8; 512];
			while !stop_clone.load(Ordering::Acquire) {
				if let Ok((len, src)) = socket.recv_from(&mut buf) {
					if let Ok(header) = dns::decode_reply(&buf[..len]) {
						let mut reply = vec![0u8; 12];
						reply[0..2].copy_from_slice(&header.id.to_be_bytes());
						reply[3] = rcode & 0x0F;
						let _ = socket.send_to(&reply, src);
					}
				}
			}
		});
		(addr, handle, stop)
	}

	#[test]
	fn worker_resolves_all_cases_against_cooperative_server() {
		let (addr, server_handle, server_stop) = echo_server(0);
		let server_ip = match addr.ip() {
			std::net::IpAddr::V6(ip) => ip,
			_ => unreachable!(),
		};

		let config = RunConfig {
			server: server_ip,
			port: addr.port(),
			base_ip: u32::from_be_bytes([10, 0, 0, 0]),
			netmask: 24,
			num_req: 4,
			burst_size: 2,
			threads: 1,
			burst_delay_ns: 1_000_000,
			timeout: Duration::from_millis(200),
		};
		let worker = Worker::new(0, 1, config);
		let stop = Arc::new(AtomicBool::new(false));
		let start = Instant::now() + Duration::from_millis(5);
		let cases = worker.run(start, stop).unwrap();

		assert_eq!(cases.len(), 4);
		for case in &cases {
			assert!(case.answered);
			assert_eq!(case.rcode, Some(0));
			assert!(case.latency().is_some());
			assert!(case.latency().unwrap() >= Duration::ZERO);
		}

		server_stop.store(true, Ordering::Release);
		let _ = server_handle.join();
	}

	#[test]
	fn worker_times_out_against_silent_server() {
		let silent = UdpSocket::bind("[::1]:0").unwrap();
		let addr = silent.local_addr().unwrap();
		let server_ip = match addr.ip() {
			std::net::IpAddr::V6(ip) => ip,
			_ => unreachable!(),
		};

		let config = RunConfig {
			server: server_ip,
			port: addr.port(),
			base_ip: u32::from_be_bytes([10, 0, 0, 0]),
			netmask: 24,
			num_req: 2,
			burst_size: 2,
			threads: 1,
			burst_delay_ns: 1_000_000,
			timeout: Duration::from_millis(50),
		};
		let worker = Worker::new(0, 1, config);
		let stop = Arc::new(AtomicBool::new(false));
		let start = Instant::now();
		let run_started = Instant::now();
		let cases = worker.run(start, stop).unwrap();

		assert_eq!(cases.len(), 2);
		for case in &cases {
			assert!(!case.answered);
			assert!(case.rcode.is_none());
		}
		// The pacer fires immediately (burst_delay_ns is negligible here), so
		// the whole run should finish within roughly one timeout of starting,
		// not two: draining must not re-arm a fresh full timeout on top of an
		// already in-flight receive call.
		assert!(
			run_started.elapsed() < Duration::from_millis(150),
			"drain overshot the query timeout by more than one poll interval"
		);
		drop(silent);
	}
}
