use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("cannot watch {}: {source}", path.display())]
	WatchRoot {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("watcher error: {0}")]
	Notify(#[from] notify::Error),

	/// Reported by a running watcher; fatal under the default policy.
	#[error("watcher failed: {0}")]
	Watcher(String),

	#[error("invalid include pattern {pattern:?}: {source}")]
	Pattern {
		pattern: String,
		#[source]
		source: regex::Error,
	},

	#[error("failed to start {program}: {source}")]
	Spawn {
		program: String,
		#[source]
		source: io::Error,
	},

	#[error("failed to signal {target}: {source}")]
	Signal {
		target: i32,
		#[source]
		source: nix::errno::Errno,
	},

	#[error("refusing to signal our own process group {0}")]
	OwnGroup(i32),

	#[error("port query failed: {0}")]
	PortQuery(String),
}

pub type Result<T> = std::result::Result<T, Error>;
