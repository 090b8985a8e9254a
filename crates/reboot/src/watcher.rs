//! Filesystem change source for the supervisor.
//!
//! Wraps `notify` so the event loop only ever sees filtered, coalesced
//! [`WatchSignal`]s on a channel.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::event::{EventKind, ModifyKind};
use notify::{Event, PollWatcher, RecursiveMode, Watcher};
use regex::Regex;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{Error, Result};
use crate::types::{ChangeEvent, ChangeOp, WatchSignal};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
	Native,
	Poll { interval: Duration },
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
	pub debounce: Duration,
	pub backend: Backend,
}

impl Default for WatchOptions {
	fn default() -> Self {
		Self {
			debounce: DEFAULT_DEBOUNCE,
			backend: Backend::Native,
		}
	}
}

/// Inclusion rule on the full changed path.
#[derive(Debug, Clone)]
pub struct PathFilter {
	re: Regex,
}

impl PathFilter {
	pub fn new(include: &str) -> Result<Self> {
		let re = Regex::new(&format!("^.*{}.*$", include)).map_err(|source| Error::Pattern {
			pattern: include.to_string(),
			source,
		})?;
		Ok(Self { re })
	}

	pub fn matches(&self, path: &Path) -> bool {
		self.re.is_match(&path.to_string_lossy())
	}
}

/// Admits at most one event per window; the rest of a burst is dropped.
#[derive(Debug, Clone)]
pub struct Coalescer {
	window: Duration,
	last: Option<Instant>,
}

impl Coalescer {
	pub fn new(window: Duration) -> Self {
		Self { window, last: None }
	}

	pub fn admit(&mut self, now: Instant) -> bool {
		match self.last {
			Some(last) if now.saturating_duration_since(last) < self.window => false,
			_ => {
				self.last = Some(now);
				true
			}
		}
	}
}

fn classify(event: &Event) -> Option<ChangeOp> {
	match &event.kind {
		EventKind::Create(_) => Some(ChangeOp::Create),
		EventKind::Remove(_) => Some(ChangeOp::Remove),
		EventKind::Modify(ModifyKind::Name(_)) => match event.paths.as_slice() {
			[from, to] if from.parent() != to.parent() => Some(ChangeOp::Move),
			_ => Some(ChangeOp::Rename),
		},
		EventKind::Modify(ModifyKind::Metadata(_)) => None,
		EventKind::Modify(_) | EventKind::Any => Some(ChangeOp::Write),
		_ => None,
	}
}

/// Turn a raw notify event into a change event, or `None` when it is an
/// uninteresting kind or no path passes the filter.
pub fn translate(event: &Event, filter: &PathFilter) -> Option<ChangeEvent> {
	let op = classify(event)?;
	// For a two-path rename, report where the file ended up.
	let path: &PathBuf = event.paths.iter().rev().find(|p| filter.matches(p))?;
	Some(ChangeEvent::new(path.clone(), op))
}

/// A live recursive watch. Dropping it stops notifications; [`ChangeWatcher::close`]
/// also tells the event loop.
pub struct ChangeWatcher {
	_watcher: Box<dyn Watcher + Send>,
	signals: UnboundedSender<WatchSignal>,
	root: PathBuf,
}

impl ChangeWatcher {
	pub fn start(
		root: &Path,
		include: &str,
		options: &WatchOptions,
		signals: UnboundedSender<WatchSignal>,
	) -> Result<Self> {
		check_root(root)?;

		let filter = PathFilter::new(include)?;
		let mut gate = Coalescer::new(options.debounce);
		let tx = signals.clone();
		let handler = move |result: notify::Result<Event>| match result {
			Ok(event) => {
				let Some(change) = translate(&event, &filter) else {
					return;
				};
				if gate.admit(Instant::now()) {
					let _ = tx.send(WatchSignal::Change(change));
				} else {
					tracing::trace!("coalesced {}", change);
				}
			}
			Err(e) => {
				let _ = tx.send(WatchSignal::Error(e.to_string()));
			}
		};

		let mut watcher: Box<dyn Watcher + Send> = match options.backend {
			Backend::Native => Box::new(notify::recommended_watcher(handler)?),
			Backend::Poll { interval } => Box::new(PollWatcher::new(
				handler,
				notify::Config::default().with_poll_interval(interval),
			)?),
		};
		watcher.watch(root, RecursiveMode::Recursive)?;

		tracing::debug!("watching {} ({:?})", root.display(), options.backend);

		Ok(Self {
			_watcher: watcher,
			signals,
			root: root.to_path_buf(),
		})
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Stop watching and send `Closed` to the event loop.
	pub fn close(self) {
		let _ = self.signals.send(WatchSignal::Closed);
	}
}

fn check_root(root: &Path) -> Result<()> {
	let fail = |source| Error::WatchRoot {
		path: root.to_path_buf(),
		source,
	};
	let meta = std::fs::metadata(root).map_err(fail)?;
	if meta.is_dir() {
		std::fs::read_dir(root).map_err(fail)?;
	}
	Ok(())
}
