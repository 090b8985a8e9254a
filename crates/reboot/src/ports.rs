//! Find and kill whatever is listening on a TCP port.

use std::process::Command;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::error::{Error, Result};

/// One socket owner as reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
	pub command: String,
	pub pid: u32,
	pub protocol: String,
	/// `None` when the listing did not carry a parseable port.
	pub local_port: Option<u16>,
	pub listening: bool,
}

pub trait PortQuery: Send + Sync {
	/// IPv4 TCP sockets bound to `port`, in the order the OS reports them.
	fn bindings(&self, port: u16) -> Result<Vec<PortBinding>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryBackend {
	#[default]
	Lsof,
	Native,
}

impl PortQuery for QueryBackend {
	fn bindings(&self, port: u16) -> Result<Vec<PortBinding>> {
		match self {
			QueryBackend::Lsof => Lsof.bindings(port),
			QueryBackend::Native => Native.bindings(port),
		}
	}
}

/// `lsof -n -P -i4TCP:<port>`
#[derive(Debug, Clone, Copy, Default)]
pub struct Lsof;

impl PortQuery for Lsof {
	fn bindings(&self, port: u16) -> Result<Vec<PortBinding>> {
		let output = Command::new("lsof")
			.args(["-n", "-P", &format!("-i4TCP:{}", port)])
			.output()
			.map_err(|e| Error::PortQuery(format!("lsof: {}", e)))?;
		// lsof exits 1 when nothing matched
		Ok(parse_lsof(&String::from_utf8_lossy(&output.stdout)))
	}
}

/// Parse lsof's default columns:
/// `COMMAND PID USER FD TYPE DEVICE SIZE/OFF NODE NAME [(STATE)]`.
pub fn parse_lsof(listing: &str) -> Vec<PortBinding> {
	listing
		.lines()
		.filter_map(|line| {
			let fields: Vec<&str> = line.split_whitespace().collect();
			let pid = fields.get(1)?.parse().ok()?;
			let listening = fields
				.iter()
				.skip(2)
				.any(|f| f.trim_matches(|c| c == '(' || c == ')') == "LISTEN");
			Some(PortBinding {
				command: fields[0].to_string(),
				pid,
				protocol: fields.get(7).unwrap_or(&"").to_string(),
				local_port: fields.get(8).and_then(|name| local_port(name)),
				listening,
			})
		})
		.collect()
}

/// `*:8080`, `127.0.0.1:8080->127.0.0.1:51000` → 8080
fn local_port(name: &str) -> Option<u16> {
	let local = name.split("->").next()?;
	local.rsplit(':').next()?.parse().ok()
}

/// The kernel socket table, read directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct Native;

#[cfg(any(target_os = "linux", target_os = "macos"))]
impl PortQuery for Native {
	fn bindings(&self, port: u16) -> Result<Vec<PortBinding>> {
		use netstat2::{
			get_sockets_info, AddressFamilyFlags, ProtocolFlags, ProtocolSocketInfo, TcpState,
		};

		let sockets = get_sockets_info(AddressFamilyFlags::IPV4, ProtocolFlags::TCP)
			.map_err(|e| Error::PortQuery(format!("{:?}", e)))?;

		let mut bindings = Vec::new();
		for si in &sockets {
			if let ProtocolSocketInfo::Tcp(ref tcp) = si.protocol_socket_info {
				if tcp.local_port != port {
					continue;
				}
				for pid in &si.associated_pids {
					bindings.push(PortBinding {
						command: String::new(),
						pid: *pid,
						protocol: "TCP".into(),
						local_port: Some(tcp.local_port),
						listening: tcp.state == TcpState::Listen,
					});
				}
			}
		}
		Ok(bindings)
	}
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
impl PortQuery for Native {
	fn bindings(&self, _port: u16) -> Result<Vec<PortBinding>> {
		Err(Error::PortQuery("native socket table not supported on this platform".into()))
	}
}

/// First listening record on `port`. Records without a port are trusted to
/// have been filtered by the query.
pub fn select_listener(records: &[PortBinding], port: u16) -> Option<&PortBinding> {
	records
		.iter()
		.find(|r| r.listening && r.local_port.map_or(true, |p| p == port))
}

pub fn has_listener<Q: PortQuery + ?Sized>(query: &Q, port: u16) -> Result<bool> {
	Ok(select_listener(&query.bindings(port)?, port).is_some())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
	Killed { pid: u32 },
	NotFound,
}

/// Look up the listener on `port` and hand its pid to `kill_fn`.
///
/// Only that pid is signalled, never its group: the owner was found
/// externally and its group may hold unrelated processes.
pub fn terminate_with<Q, K>(query: &Q, port: u16, kill_fn: K) -> Result<Termination>
where
	Q: PortQuery + ?Sized,
	K: FnOnce(u32) -> Result<()>,
{
	if port == 0 {
		tracing::warn!("please enter a valid port");
	}

	let records = query.bindings(port)?;
	match select_listener(&records, port) {
		Some(listener) => {
			let pid = listener.pid;
			tracing::debug!("port {} held by {} (pid {})", port, listener.command, pid);
			kill_fn(pid)?;
			Ok(Termination::Killed { pid })
		}
		None => {
			tracing::debug!("no listener on port {}", port);
			Ok(Termination::NotFound)
		}
	}
}

pub fn terminate_listener_on_port<Q>(query: &Q, port: u16) -> Result<Termination>
where
	Q: PortQuery + ?Sized,
{
	terminate_with(query, port, kill_pid)
}

pub fn kill_pid(pid: u32) -> Result<()> {
	kill(Pid::from_raw(pid as i32), Signal::SIGKILL).map_err(|source| Error::Signal {
		target: pid as i32,
		source,
	})
}
