//! Validates the 8 raw CLI arguments into a `RunConfig`. All checks happen
//! here, before any socket opens, matching the C++ source's one-error-one-
//! message chain in `main()`.

use std::net::Ipv6Addr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::cli::Cli;
use crate::transport::RunConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("bad server address '{0}': must be an IPv6 literal")]
	BadServerAddress(String),

	#[error("bad subnet '{0}': expected A.B.C.D/M with M in 0..=32")]
	BadSubnet(String),

	#[error("the number of requests ({num_req}) exceeds the {available} addresses available in the subnet")]
	SubnetOverflow { num_req: u32, available: u64 },

	#[error("number of requests ({num_req}) must be divisible by threads*burst_size ({threads}*{burst_size})")]
	NotDivisible {
		num_req: u32,
		threads: u32,
		burst_size: u32,
	},

	#[error("threads*burst_size ({threads}*{burst_size}) overflows a 32-bit count")]
	BurstGroupOverflow { threads: u32, burst_size: u32 },

	#[error("threads must be at least 1")]
	ZeroThreads,

	#[error("burst_size must be at least 1")]
	ZeroBurstSize,

	#[error("bad timeout '{0}': expected a decimal number of seconds")]
	BadTimeout(String),

	#[error("bad port '{0}': expected 1..=65535")]
	BadPort(String),
}

/// Parse `A.B.C.D/M` into a masked base address and netmask.
fn parse_subnet(input: &str) -> Result<(u32, u8), ConfigError> {
	let (addr_part, mask_part) = input
		.split_once('/')
		.ok_or_else(|| ConfigError::BadSubnet(input.to_string()))?;

	let octets: Vec<u8> = addr_part
		.split('.')
		.map(|s| s.parse::<u8>())
		.collect::<Result<_, _>>()
		.map_err(|_| ConfigError::BadSubnet(input.to_string()))?;
	if octets.len() != 4 {
		return Err(ConfigError::BadSubnet(input.to_string()));
	}

	let netmask: u8 = mask_part
		.parse()
		.map_err(|_| ConfigError::BadSubnet(input.to_string()))?;
	if netmask > 32 {
		return Err(ConfigError::BadSubnet(input.to_string()));
	}

	let raw = u32::from_be_bytes([octets[0], octets[1], octets[2], octets[3]]);
	let host_bits = 32 - netmask as u32;
	// Masking with a full 32-bit shift is UB-adjacent in C but well-defined
	// here: when netmask == 0 the mask below must be all zero bits.
	let mask: u32 = if host_bits == 32 {
		0
	} else {
		!0u32 << host_bits
	};
	let base = raw & mask;
	Ok((base, netmask))
}

/// Validate the raw CLI arguments and build a `RunConfig`. No socket is
/// opened and no thread is spawned here.
pub fn validate(cli: &Cli) -> Result<RunConfig, ConfigError> {
	let server = Ipv6Addr::from_str(&cli.server)
		.map_err(|_| ConfigError::BadServerAddress(cli.server.clone()))?;

	let port: u16 = cli
		.port
		.parse()
		.ok()
		.filter(|p| *p != 0)
		.ok_or_else(|| ConfigError::BadPort(cli.port.clone()))?;

	let (base_ip, netmask) = parse_subnet(&cli.subnet)?;

	if cli.threads == 0 {
		return Err(ConfigError::ZeroThreads);
	}
	if cli.burst_size == 0 {
		return Err(ConfigError::ZeroBurstSize);
	}

	let available: u64 = 1u64 << (32 - netmask as u32);
	if cli.num_req as u64 > available {
		return Err(ConfigError::SubnetOverflow {
			num_req: cli.num_req,
			available,
		});
	}

	let group_size = cli
		.threads
		.checked_mul(cli.burst_size)
		.ok_or(ConfigError::BurstGroupOverflow {
			threads: cli.threads,
			burst_size: cli.burst_size,
		})?;
	if cli.num_req % group_size != 0 {
		return Err(ConfigError::NotDivisible {
			num_req: cli.num_req,
			threads: cli.threads,
			burst_size: cli.burst_size,
		});
	}

	let timeout_secs: f64 = cli
		.timeout_s
		.parse()
		.map_err(|_| ConfigError::BadTimeout(cli.timeout_s.clone()))?;
	if !timeout_secs.is_finite() || timeout_secs < 0.0 {
		return Err(ConfigError::BadTimeout(cli.timeout_s.clone()));
	}
	let timeout = Duration::from_secs_f64(timeout_secs);

	Ok(RunConfig {
		server,
		port,
		base_ip,
		netmask,
		num_req: cli.num_req,
		burst_size: cli.burst_size,
		threads: cli.threads,
		burst_delay_ns: cli.burst_delay_ns,
		timeout,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cli(overrides: impl FnOnce(&mut Cli)) -> Cli {
		let mut cli = Cli {
			server: "::1".to_string(),
			port: "5353".to_string(),
			subnet: "10.0.0.0/24".to_string(),
			num_req: 8,
			burst_size: 2,
			threads: 2,
			burst_delay_ns: 1_000_000,
			timeout_s: "1".to_string(),
		};
		overrides(&mut cli);
		cli
	}

	#[test]
	fn accepts_tiny_run_scenario() {
		let config = validate(&cli(|_| {})).unwrap();
		assert_eq!(config.base_ip, u32::from_be_bytes([10, 0, 0, 0]));
		assert_eq!(config.requests_per_worker(), 4);
	}

	#[test]
	fn rejects_non_divisible_request_count() {
		let c = cli(|c| {
			c.num_req = 10;
			c.threads = 2;
			c.burst_size = 3;
		});
		assert!(matches!(validate(&c), Err(ConfigError::NotDivisible { .. })));
	}

	#[test]
	fn rejects_overflowing_thread_burst_product_without_panicking() {
		let c = cli(|c| {
			c.threads = 70_000;
			c.burst_size = 70_000;
		});
		assert!(matches!(validate(&c), Err(ConfigError::BurstGroupOverflow { .. })));
	}

	#[test]
	fn rejects_subnet_overflow() {
		let c = cli(|c| {
			c.subnet = "192.0.2.0/30".to_string();
			c.num_req = 8;
			c.threads = 1;
			c.burst_size = 1;
		});
		assert!(matches!(validate(&c), Err(ConfigError::SubnetOverflow { .. })));
	}

	#[test]
	fn masks_off_host_bits() {
		let c = cli(|c| c.subnet = "10.0.0.5/24".to_string());
		let config = validate(&c).unwrap();
		assert_eq!(config.base_ip, u32::from_be_bytes([10, 0, 0, 0]));
	}

	#[test]
	fn accepts_zero_length_prefix() {
		let c = cli(|c| {
			c.subnet = "0.0.0.0/0".to_string();
			c.num_req = 2;
			c.threads = 1;
			c.burst_size = 1;
		});
		assert!(validate(&c).is_ok());
	}

	#[test]
	fn rejects_bad_server_address() {
		let c = cli(|c| c.server = "not-an-address".to_string());
		assert!(matches!(validate(&c), Err(ConfigError::BadServerAddress(_))));
	}

	#[test]
	fn accepts_subsecond_timeout() {
		let c = cli(|c| c.timeout_s = "0.25".to_string());
		let config = validate(&c).unwrap();
		assert_eq!(config.timeout, Duration::from_millis(250));
	}
}
