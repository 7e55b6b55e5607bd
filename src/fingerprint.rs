//! Deterministic mapping between a worker-local slot index, the IPv4 address
//! under test, its reverse-DNS query name, and the DNS transaction ID.
//!
//! Everything here is pure and total: no I/O, no allocation beyond the
//! returned `String`, so both the sender (building a query) and the
//! receiver (mapping a response ID back to a slot) can call the same
//! functions without sharing state.

/// IPv4 address assigned to slot `j` on worker `w` of `worker_count`, given
/// the run's base address (already masked to the configured subnet).
pub fn ipv4_for(base_ip: u32, j: u32, w: u32, worker_count: u32) -> u32 {
	base_ip.wrapping_add(j.wrapping_mul(worker_count)).wrapping_add(w)
}

/// Canonical reverse-DNS name for an IPv4 address, e.g. `198.51.100.7` ->
/// `7.100.51.198.in-addr.arpa.`.
pub fn qname_for(ipv4: u32) -> String {
	let octets = ipv4.to_be_bytes();
	format!(
		"{}.{}.{}.{}.in-addr.arpa.",
		octets[3], octets[2], octets[1], octets[0]
	)
}

/// Transaction ID for slot `j` on worker `w`: the low 16 bits of the global
/// index `j*worker_count + w`.
pub fn txid_for(j: u32, w: u32, worker_count: u32) -> u16 {
	(j.wrapping_mul(worker_count).wrapping_add(w) & 0xFFFF) as u16
}

/// Recover the worker-local slot index that produced `txid`, given the
/// worker's identity. Transaction IDs repeat every `2^16 / worker_count`
/// slots (rounded), so this only identifies *a* candidate slot; the caller
/// must additionally check that slot's `answered` flag (see `worker.rs`)
/// since IDs are not unique once a worker has issued more than 2^16
/// queries.
///
/// Returns `None` if `txid` cannot have been issued by this worker at all
/// (i.e. `(txid - w) mod worker_count != 0`).
pub fn slot_for_txid(txid: u16, w: u32, worker_count: u32) -> Option<u32> {
	let txid = txid as u32;
	let w = w % worker_count.max(1);
	let delta = (txid + 0x1_0000 - w) % 0x1_0000;
	if delta % worker_count != 0 {
		return None;
	}
	Some(delta / worker_count)
}
