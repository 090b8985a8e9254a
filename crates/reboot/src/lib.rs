//! # reboot
//!
//! Watch a project tree and restart a dev command whenever its sources change.
//!
//! The [`Supervisor`] owns at most one child process. Every change event
//! delivered by the [`ChangeWatcher`] kills the current child's process group
//! and launches a fresh one. [`ports::terminate_listener_on_port`] is the
//! standalone "free this port" path used by the `kill` command.
//!
//! ```rust,no_run
//! use reboot::{LaunchConfig, StartOptions};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = LaunchConfig {
//!     dir: ".".into(),
//!     command: "mvn".into(),
//!     args: vec!["spring-boot:run".into()],
//!     include: "src".into(),
//!     port: 8080,
//!     config_file: None,
//! };
//!
//! reboot::start(config, StartOptions::default()).await.unwrap();
//! # }
//! ```

pub mod config;
pub mod error;
pub mod output;
pub mod ports;
pub mod process;
pub mod supervisor;
pub mod types;
pub mod watcher;

pub use config::{jvm_config_argument, LaunchConfig};
pub use error::{Error, Result};
pub use output::{OutputCapture, Stream};
pub use ports::{PortBinding, PortQuery, QueryBackend, Termination};
pub use process::{KillOutcome, LaunchCommand, Launcher, ProcessHandle, SystemLauncher};
pub use supervisor::{start, Exit, PortRelease, StartOptions, Supervisor, WatchErrorPolicy};
pub use types::{ChangeEvent, ChangeOp, WatchSignal};
pub use watcher::{Backend, ChangeWatcher, Coalescer, PathFilter, WatchOptions};
