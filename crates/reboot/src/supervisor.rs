use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::config::LaunchConfig;
use crate::error::{Error, Result};
use crate::ports::{self, PortQuery};
use crate::process::{KillOutcome, Launcher, ProcessHandle, SystemLauncher};
use crate::types::{ChangeEvent, WatchSignal};
use crate::watcher::{ChangeWatcher, WatchOptions};

/// What to do when the watcher reports an internal error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WatchErrorPolicy {
	/// End the loop with [`Error::Watcher`].
	#[default]
	Exit,
	Continue,
}

/// Hold a relaunch until nothing listens on `port` any more, or `timeout`
/// passes. Without it the old and new process can briefly overlap.
#[derive(Clone)]
pub struct PortRelease {
	pub port: u16,
	pub timeout: Duration,
	pub interval: Duration,
	pub query: Arc<dyn PortQuery>,
}

impl PortRelease {
	async fn wait(&self) {
		let deadline = Instant::now() + self.timeout;
		loop {
			let query = Arc::clone(&self.query);
			let port = self.port;
			let check = move || ports::has_listener(query.as_ref(), port);
			let busy = tokio::task::spawn_blocking(check).await;
			match busy {
				Ok(Ok(false)) => return,
				Ok(Ok(true)) => {}
				Ok(Err(e)) => {
					tracing::warn!("port {} check failed: {}", port, e);
					return;
				}
				Err(e) => {
					tracing::warn!("port {} check panicked: {}", port, e);
					return;
				}
			}
			if Instant::now() >= deadline {
				tracing::warn!(
					"port {} still in use after {:?}, starting anyway",
					port,
					self.timeout
				);
				return;
			}
			tokio::time::sleep(self.interval).await;
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
	/// The watcher closed; the last child was left running.
	Closed,
	/// Interactive stop; the last child's group was killed.
	Shutdown,
}

/// Owns the single current child and restarts it on every change event.
pub struct Supervisor<L: Launcher = SystemLauncher> {
	config: LaunchConfig,
	launcher: L,
	current: Option<ProcessHandle>,
	on_watch_error: WatchErrorPolicy,
	port_release: Option<PortRelease>,
	launches: u64,
}

impl<L: Launcher> Supervisor<L> {
	pub fn new(config: LaunchConfig, launcher: L) -> Self {
		Self {
			config,
			launcher,
			current: None,
			on_watch_error: WatchErrorPolicy::default(),
			port_release: None,
			launches: 0,
		}
	}

	pub fn with_watch_error_policy(mut self, policy: WatchErrorPolicy) -> Self {
		self.on_watch_error = policy;
		self
	}

	pub fn with_port_release(mut self, release: PortRelease) -> Self {
		self.port_release = Some(release);
		self
	}

	pub fn current(&self) -> Option<&ProcessHandle> {
		self.current.as_ref()
	}

	pub fn current_mut(&mut self) -> Option<&mut ProcessHandle> {
		self.current.as_mut()
	}

	pub fn launches(&self) -> u64 {
		self.launches
	}

	pub fn launcher(&self) -> &L {
		&self.launcher
	}

	/// Consume signals one at a time until the watcher closes, a shutdown
	/// arrives, or a watcher error ends the session.
	pub async fn run(&mut self, signals: &mut UnboundedReceiver<WatchSignal>) -> Result<Exit> {
		while let Some(signal) = signals.recv().await {
			match signal {
				WatchSignal::Change(event) => self.restart(&event).await,
				WatchSignal::Error(message) => match self.on_watch_error {
					WatchErrorPolicy::Exit => return Err(Error::Watcher(message)),
					WatchErrorPolicy::Continue => tracing::warn!("watcher error: {}", message),
				},
				WatchSignal::Closed => {
					tracing::debug!("watcher closed");
					return Ok(Exit::Closed);
				}
				WatchSignal::Shutdown => {
					tracing::info!("shutting down");
					self.stop_current();
					return Ok(Exit::Shutdown);
				}
			}
		}
		Ok(Exit::Closed)
	}

	async fn restart(&mut self, event: &ChangeEvent) {
		tracing::info!("{}", event);
		if self.stop_current() {
			if let Some(release) = &self.port_release {
				release.wait().await;
			}
		}
		self.launch();
	}

	/// Returns true when a kill signal actually went out.
	fn stop_current(&mut self) -> bool {
		let Some(handle) = self.current.take() else {
			return false;
		};
		match self.launcher.kill_group(&handle) {
			Ok(KillOutcome::Signalled { pgid }) => {
				tracing::debug!("killed process group {}", pgid);
				true
			}
			Ok(KillOutcome::AlreadyExited) => {
				tracing::debug!("pid {} already exited", handle.pid);
				false
			}
			Err(e) => {
				tracing::warn!("failed to stop pid {}: {}", handle.pid, e);
				false
			}
		}
	}

	fn launch(&mut self) {
		let command = self.config.launch_command();
		match self.launcher.launch(&command) {
			Ok(handle) => {
				self.launches += 1;
				tracing::info!("started {} (pid {})", command.program, handle.pid);
				self.current = Some(handle);
			}
			Err(e) => tracing::error!("{}", e),
		}
	}
}

#[derive(Clone, Default)]
pub struct StartOptions {
	pub watch: WatchOptions,
	pub on_watch_error: WatchErrorPolicy,
	pub port_release: Option<PortRelease>,
}

/// Watch `config.dir` and run the supervisor until the session ends.
///
/// Fails immediately if the root can't be watched. Ctrl-C is turned into
/// [`WatchSignal::Shutdown`].
pub async fn start(config: LaunchConfig, options: StartOptions) -> Result<Exit> {
	for warning in config.warnings() {
		tracing::warn!("{}", warning);
	}

	let (tx, mut rx) = mpsc::unbounded_channel();
	let watcher = ChangeWatcher::start(&config.dir, &config.include, &options.watch, tx.clone())?;
	tracing::info!(
		"watching {} for changes matching {:?}",
		watcher.root().display(),
		config.include
	);

	let shutdown = tx;
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			let _ = shutdown.send(WatchSignal::Shutdown);
		}
	});

	let mut supervisor =
		Supervisor::new(config, SystemLauncher).with_watch_error_policy(options.on_watch_error);
	if let Some(release) = options.port_release {
		supervisor = supervisor.with_port_release(release);
	}

	let task = tokio::spawn(async move { supervisor.run(&mut rx).await });
	let result = task
		.await
		.map_err(|e| Error::Watcher(format!("event loop stopped: {}", e)))?;
	drop(watcher);
	result
}
