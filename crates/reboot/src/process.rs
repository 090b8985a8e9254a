use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::{getpgid, getpgrp, Pid};
use tokio::process::{Child, Command};

use crate::error::{Error, Result};
use crate::output::{self, OutputCapture, Stream};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
	pub program: String,
	pub args: Vec<String>,
	pub dir: PathBuf,
}

/// The supervisor's record of the child it started last.
pub struct ProcessHandle {
	pub pid: u32,
	pub output: OutputCapture,
	child: Option<Child>,
}

impl ProcessHandle {
	/// A handle with no OS child attached, for launchers that track processes
	/// some other way.
	pub fn new(pid: u32, output: OutputCapture) -> Self {
		Self { pid, output, child: None }
	}

	fn with_child(pid: u32, output: OutputCapture, child: Child) -> Self {
		Self { pid, output, child: Some(child) }
	}

	/// Children are started as group leaders, so the group id is the pid.
	pub fn pgid(&self) -> u32 {
		self.pid
	}

	/// Wait for the child to exit. `None` if there is no child to wait on.
	pub async fn wait(&mut self) -> Option<ExitStatus> {
		self.child.as_mut()?.wait().await.ok()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
	Signalled { pgid: u32 },
	/// The group no longer exists; nothing to do.
	AlreadyExited,
}

/// Process start/stop primitives used by the supervisor.
pub trait Launcher: Send {
	fn launch(&mut self, command: &LaunchCommand) -> Result<ProcessHandle>;
	fn kill_group(&mut self, handle: &ProcessHandle) -> Result<KillOutcome>;
}

/// Real processes: each child leads its own group, output is tee'd.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
	fn launch(&mut self, command: &LaunchCommand) -> Result<ProcessHandle> {
		let mut child = Command::new(&command.program)
			.args(&command.args)
			.current_dir(&command.dir)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.process_group(0)
			.spawn()
			.map_err(|source| Error::Spawn {
				program: command.program.clone(),
				source,
			})?;

		let pid = child.id().unwrap_or(0);
		let output = OutputCapture::new();

		if let Some(stdout) = child.stdout.take() {
			tokio::spawn(output::tee(stdout, Stream::Stdout, output.clone()));
		}
		if let Some(stderr) = child.stderr.take() {
			tokio::spawn(output::tee(stderr, Stream::Stderr, output.clone()));
		}

		Ok(ProcessHandle::with_child(pid, output, child))
	}

	fn kill_group(&mut self, handle: &ProcessHandle) -> Result<KillOutcome> {
		kill_process_group(handle.pid)
	}
}

/// SIGKILL the whole group `pid` belongs to.
pub fn kill_process_group(pid: u32) -> Result<KillOutcome> {
	let pgid = match getpgid(Some(Pid::from_raw(pid as i32))) {
		Ok(pgid) => pgid,
		Err(_) => return Ok(KillOutcome::AlreadyExited),
	};
	if pgid == getpgrp() {
		return Err(Error::OwnGroup(pgid.as_raw()));
	}
	match killpg(pgid, Signal::SIGKILL) {
		Ok(()) => Ok(KillOutcome::Signalled {
			pgid: pgid.as_raw() as u32,
		}),
		Err(Errno::ESRCH) => Ok(KillOutcome::AlreadyExited),
		Err(source) => Err(Error::Signal {
			target: -pgid.as_raw(),
			source,
		}),
	}
}
