use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
	Create,
	Write,
	Remove,
	Rename,
	Move,
}

impl fmt::Display for ChangeOp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			ChangeOp::Create => "CREATE",
			ChangeOp::Write => "WRITE",
			ChangeOp::Remove => "REMOVE",
			ChangeOp::Rename => "RENAME",
			ChangeOp::Move => "MOVE",
		};
		f.write_str(s)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
	pub path: PathBuf,
	pub op: ChangeOp,
}

impl ChangeEvent {
	pub fn new(path: impl Into<PathBuf>, op: ChangeOp) -> Self {
		Self { path: path.into(), op }
	}
}

impl fmt::Display for ChangeEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {:?}", self.op, self.path.display().to_string())
	}
}

/// Everything the supervisor's event loop reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchSignal {
	Change(ChangeEvent),
	Error(String),
	/// The watcher went away. The current child is left running.
	Closed,
	/// Interactive stop (Ctrl-C). The current child's group is killed first.
	Shutdown,
}
