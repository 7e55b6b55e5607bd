//! A fixed-interval, self-correcting repeating timer.
//!
//! Ported from the `Timer` class in the C++ source this harness is based
//! on: a dedicated thread runs `prepare()` once, then calls `task()`
//! exactly `n` times at successive deadlines anchored to a fixed start
//! instant, never to the end of the previous call. An atomic flag gives
//! cooperative, slot-boundary cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Runs `prepare` once and then `task` up to `n` times on its own thread,
/// at deadlines `start, start+interval, start+2*interval, ...`.
///
/// `task` is boxed as `FnMut() + Send + 'static` rather than generic over a
/// concrete type: the pacer only needs a callable identity, not a type to
/// monomorphize over, and workers build closures that capture per-worker
/// state of varying shape.
pub struct PacedTimer {
	stop: Arc<AtomicBool>,
	handle: Option<JoinHandle<()>>,
}

impl PacedTimer {
	/// Spawns the timer thread immediately; it sleeps until `start` before
	/// its first invocation of `task`. Owns a private cancellation flag.
	pub fn start<P, T>(
		thread_name: impl Into<String>,
		prepare: P,
		task: T,
		start: Instant,
		interval: Duration,
		n: usize,
	) -> Self
	where
		P: FnMut() + Send + 'static,
		T: FnMut(usize) + Send + 'static,
	{
		Self::start_with_stop(
			thread_name,
			prepare,
			task,
			start,
			interval,
			n,
			Arc::new(AtomicBool::new(false)),
		)
	}

	/// Like `start`, but cancellation is driven by a caller-supplied flag.
	/// Used by the worker to share a single run-wide stop flag between its
	/// pacer and its receiver, so both observe an abort at the same time.
	pub fn start_with_stop<P, T>(
		thread_name: impl Into<String>,
		mut prepare: P,
		mut task: T,
		start: Instant,
		interval: Duration,
		n: usize,
		stop: Arc<AtomicBool>,
	) -> Self
	where
		P: FnMut() + Send + 'static,
		T: FnMut(usize) + Send + 'static,
	{
		let stop_for_thread = stop.clone();

		let handle = thread::Builder::new()
			.name(thread_name.into())
			.spawn(move || {
				prepare();
				for i in 0..n {
					if stop_for_thread.load(Ordering::Acquire) {
						return;
					}
					let deadline = start + interval * i as u32;
					sleep_until(deadline);
					if stop_for_thread.load(Ordering::Acquire) {
						return;
					}
					task(i);
				}
			})
			.expect("failed to spawn timer thread");

		PacedTimer { stop, handle: Some(handle) }
	}

	/// Requests cancellation; honored at the next slot boundary. Does not
	/// block — call `join` to wait for the thread to actually stop.
	pub fn cancel(&self) {
		self.stop.store(true, Ordering::Release);
	}

	/// Blocks until the timer thread has finished (either by completing
	/// all `n` invocations or by observing cancellation). A worker-thread
	/// panic inside `task` is propagated as `Err`.
	pub fn join(mut self) -> thread::Result<()> {
		if let Some(handle) = self.handle.take() {
			handle.join()
		} else {
			Ok(())
		}
	}
}

impl Drop for PacedTimer {
	fn drop(&mut self) {
		self.cancel();
		if let Some(handle) = self.handle.take() {
			let _ = handle.join();
		}
	}
}

/// Sleep until `deadline` using the monotonic clock. A `deadline` already
/// in the past returns immediately -- this is how the schedule "catches
/// up" without ever sleeping negative duration.
fn sleep_until(deadline: Instant) {
	let now = Instant::now();
	if deadline > now {
		thread::sleep(deadline - now);
	}
}
