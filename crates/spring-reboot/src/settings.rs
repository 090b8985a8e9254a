use reboot::{
	Backend, LaunchConfig, PortRelease, QueryBackend, StartOptions, WatchErrorPolicy, WatchOptions,
};
use owo_colors::OwoColorize;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const APP_NAME: &str = "spring-reboot";
pub const PROJECT_FILE: &str = ".spring-reboot.toml";
pub const DEFAULT_PORT: u16 = 8080;

const DEFAULT_COMMAND: &str = "mvn";
const DEFAULT_ARGS: &[&str] = &["spring-boot:run"];
const DEFAULT_INCLUDE: &str = "src";
const DEFAULT_DEBOUNCE_MS: u64 = 100;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const PORT_RELEASE_INTERVAL: Duration = Duration::from_millis(100);

// ── config.toml / .spring-reboot.toml ───────────────────────────────────────

/// One settings file. Every key is optional so files can be layered.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileSettings {
	pub command: Option<String>,
	pub args: Option<Vec<String>>,
	pub include: Option<String>,
	pub port: Option<u16>,
	pub config_file: Option<String>,
	pub debounce_ms: Option<u64>,
	pub poll: Option<bool>,
	pub poll_interval_ms: Option<u64>,
	pub on_watch_error: Option<OnWatchError>,
	pub port_query: Option<PortQueryKind>,
	pub await_port_release_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OnWatchError {
	Exit,
	Continue,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PortQueryKind {
	Lsof,
	Native,
}

impl FileSettings {
	/// Keys set in `over` win.
	pub fn overlay(self, over: FileSettings) -> FileSettings {
		FileSettings {
			command: over.command.or(self.command),
			args: over.args.or(self.args),
			include: over.include.or(self.include),
			port: over.port.or(self.port),
			config_file: over.config_file.or(self.config_file),
			debounce_ms: over.debounce_ms.or(self.debounce_ms),
			poll: over.poll.or(self.poll),
			poll_interval_ms: over.poll_interval_ms.or(self.poll_interval_ms),
			on_watch_error: over.on_watch_error.or(self.on_watch_error),
			port_query: over.port_query.or(self.port_query),
			await_port_release_ms: over.await_port_release_ms.or(self.await_port_release_ms),
		}
	}

	pub fn query_backend(&self) -> QueryBackend {
		match self.port_query {
			Some(PortQueryKind::Native) => QueryBackend::Native,
			Some(PortQueryKind::Lsof) | None => QueryBackend::Lsof,
		}
	}
}

pub fn config_dir() -> PathBuf {
	if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
		PathBuf::from(dir).join(APP_NAME)
	} else if let Ok(home) = std::env::var("HOME") {
		PathBuf::from(home).join(".config").join(APP_NAME)
	} else {
		PathBuf::from("/tmp").join(APP_NAME).join("config")
	}
}

/// Missing file → defaults. Unreadable or malformed → warning, defaults.
pub fn load_file(path: &Path) -> FileSettings {
	if !path.exists() {
		return FileSettings::default();
	}
	match std::fs::read_to_string(path) {
		Ok(content) => match toml::from_str(&content) {
			Ok(settings) => return settings,
			Err(e) => {
				eprintln!("{} failed to parse {}: {}", "warning:".yellow(), path.display(), e)
			}
		},
		Err(e) => eprintln!("{} failed to read {}: {}", "warning:".yellow(), path.display(), e),
	}
	FileSettings::default()
}

/// Global settings overlaid with the project's own file.
pub fn load(project_dir: &Path) -> FileSettings {
	let global = load_file(&config_dir().join("config.toml"));
	let project = load_file(&project_dir.join(PROJECT_FILE));
	global.overlay(project)
}

// ── resolution ──────────────────────────────────────────────────────────────

/// Values given on the command line for `start`.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
	pub command: Option<String>,
	pub args: Vec<String>,
	pub include: Option<String>,
	pub port: Option<u16>,
	pub config_file: Option<String>,
	pub poll: bool,
}

pub struct Resolved {
	pub config: LaunchConfig,
	pub options: StartOptions,
}

pub fn resolve(dir: PathBuf, file: FileSettings, cli: Overrides) -> Resolved {
	let args = if !cli.args.is_empty() {
		cli.args
	} else {
		file.args
			.clone()
			.unwrap_or_else(|| DEFAULT_ARGS.iter().map(|a| a.to_string()).collect())
	};
	let port = cli.port.or(file.port).unwrap_or(DEFAULT_PORT);

	let config = LaunchConfig {
		dir,
		command: cli
			.command
			.or_else(|| file.command.clone())
			.unwrap_or_else(|| DEFAULT_COMMAND.to_string()),
		args,
		include: cli
			.include
			.or_else(|| file.include.clone())
			.unwrap_or_else(|| DEFAULT_INCLUDE.to_string()),
		port,
		config_file: cli.config_file.or_else(|| file.config_file.clone()),
	};

	let backend = if cli.poll || file.poll.unwrap_or(false) {
		let interval_ms = file.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
		Backend::Poll {
			interval: Duration::from_millis(interval_ms),
		}
	} else {
		Backend::Native
	};

	let on_watch_error = match file.on_watch_error {
		Some(OnWatchError::Continue) => WatchErrorPolicy::Continue,
		Some(OnWatchError::Exit) | None => WatchErrorPolicy::Exit,
	};

	let port_release = file.await_port_release_ms.map(|ms| PortRelease {
		port,
		timeout: Duration::from_millis(ms),
		interval: PORT_RELEASE_INTERVAL,
		query: Arc::new(file.query_backend()),
	});

	Resolved {
		config,
		options: StartOptions {
			watch: WatchOptions {
				debounce: Duration::from_millis(file.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)),
				backend,
			},
			on_watch_error,
			port_release,
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_a_maven_project() {
		let r = resolve(".".into(), FileSettings::default(), Overrides::default());
		assert_eq!(r.config.command, "mvn");
		assert_eq!(r.config.args, vec!["spring-boot:run"]);
		assert_eq!(r.config.include, "src");
		assert_eq!(r.config.port, 8080);
		assert_eq!(r.config.config_file, None);
		assert_eq!(r.options.watch.backend, Backend::Native);
		assert_eq!(r.options.watch.debounce, Duration::from_millis(100));
		assert_eq!(r.options.on_watch_error, WatchErrorPolicy::Exit);
		assert!(r.options.port_release.is_none());
	}

	#[test]
	fn command_line_beats_files() {
		let file: FileSettings = toml::from_str(
			r#"
			command = "./gradlew"
			args = ["bootRun"]
			port = 9000
			config_file = "/etc/file.yaml"
			"#,
		)
		.unwrap();
		let cli = Overrides {
			args: vec!["spring-boot:run".into(), "-Pdev".into()],
			port: Some(9100),
			config_file: Some("/etc/cli.yaml".into()),
			..Overrides::default()
		};
		let r = resolve("/p".into(), file, cli);
		assert_eq!(r.config.command, "./gradlew");
		assert_eq!(r.config.args, vec!["spring-boot:run", "-Pdev"]);
		assert_eq!(r.config.port, 9100);
		assert_eq!(r.config.config_file.as_deref(), Some("/etc/cli.yaml"));
	}

	#[test]
	fn project_file_overlays_global() {
		let global: FileSettings = toml::from_str("include = \"src/main\"\nport = 9000\n").unwrap();
		let project: FileSettings = toml::from_str("port = 9001\n").unwrap();
		let merged = global.overlay(project);
		assert_eq!(merged.include.as_deref(), Some("src/main"));
		assert_eq!(merged.port, Some(9001));
	}

	#[test]
	fn poll_and_policies_from_file() {
		let file: FileSettings = toml::from_str(
			r#"
			poll = true
			poll_interval_ms = 250
			debounce_ms = 300
			on_watch_error = "continue"
			port_query = "native"
			await_port_release_ms = 2000
			"#,
		)
		.unwrap();
		assert_eq!(file.query_backend(), QueryBackend::Native);

		let r = resolve(".".into(), file, Overrides::default());
		assert_eq!(
			r.options.watch.backend,
			Backend::Poll { interval: Duration::from_millis(250) }
		);
		assert_eq!(r.options.watch.debounce, Duration::from_millis(300));
		assert_eq!(r.options.on_watch_error, WatchErrorPolicy::Continue);
		let release = r.options.port_release.unwrap();
		assert_eq!(release.port, 8080);
		assert_eq!(release.timeout, Duration::from_secs(2));
	}

	#[test]
	fn malformed_file_falls_back_to_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(PROJECT_FILE);
		std::fs::write(&path, "port = \"not a number\"\n").unwrap();
		assert_eq!(load_file(&path), FileSettings::default());

		std::fs::write(&path, "colour = \"blue\"\n").unwrap();
		assert_eq!(load_file(&path), FileSettings::default());

		assert_eq!(load_file(&dir.path().join("absent.toml")), FileSettings::default());
	}
}
