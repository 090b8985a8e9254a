use std::path::PathBuf;

use crate::process::LaunchCommand;

const RUN_JVM_ARGUMENTS: &str = "spring-boot.run.jvmArguments";
const CONFIG_ADDITIONAL_LOCATION: &str = "spring.config.additional-location";

/// Resolved inputs for a watch session. Built once, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
	pub dir: PathBuf,
	pub command: String,
	pub args: Vec<String>,
	/// Regex fragment; a changed path must contain a match to trigger a restart.
	pub include: String,
	pub port: u16,
	pub config_file: Option<String>,
}

impl LaunchConfig {
	/// Problems worth telling the user about. None of them stop the session.
	pub fn warnings(&self) -> Vec<String> {
		let mut warnings = Vec::new();
		if self.command.trim().is_empty() {
			warnings.push("no command given".to_string());
		}
		if self.args.is_empty() {
			warnings.push("no arguments given".to_string());
		}
		warnings
	}

	pub fn config_file(&self) -> Option<&str> {
		self.config_file.as_deref().filter(|p| !p.is_empty())
	}

	/// The argv for the next launch. The config file argument, when present,
	/// always comes last.
	pub fn launch_command(&self) -> LaunchCommand {
		let mut args = self.args.clone();
		if let Some(path) = self.config_file() {
			args.push(jvm_config_argument(path));
		}
		LaunchCommand {
			program: self.command.clone(),
			args,
			dir: self.dir.clone(),
		}
	}
}

/// `-Dspring-boot.run.jvmArguments="-Dspring.config.additional-location=<path>"`
///
/// The Maven plugin parses this shape verbatim, quotes included.
pub fn jvm_config_argument(path: &str) -> String {
	format!(
		"-D{}=\"-D{}={}\"",
		RUN_JVM_ARGUMENTS, CONFIG_ADDITIONAL_LOCATION, path
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config(config_file: Option<&str>) -> LaunchConfig {
		LaunchConfig {
			dir: "/project".into(),
			command: "mvn".into(),
			args: vec!["spring-boot:run".into()],
			include: "src".into(),
			port: 8080,
			config_file: config_file.map(String::from),
		}
	}

	#[test]
	fn config_file_argument_is_appended_once() {
		let cmd = config(Some("/etc/app/app.yaml")).launch_command();
		let expected = concat!(
			"-Dspring-boot.run.jvmArguments=",
			"\"-Dspring.config.additional-location=/etc/app/app.yaml\"",
		);
		assert_eq!(cmd.args, vec!["spring-boot:run", expected]);
		let injected = cmd.args.iter().filter(|a| a.starts_with("-Dspring-boot.run")).count();
		assert_eq!(injected, 1);
	}

	#[test]
	fn empty_config_file_adds_nothing() {
		assert_eq!(config(Some("")).launch_command().args, vec!["spring-boot:run"]);
		assert_eq!(config(None).launch_command().args, vec!["spring-boot:run"]);
	}

	#[test]
	fn launch_command_uses_dir_and_program() {
		let cmd = config(None).launch_command();
		assert_eq!(cmd.program, "mvn");
		assert_eq!(cmd.dir, PathBuf::from("/project"));
	}

	#[test]
	fn warns_on_missing_command_and_args() {
		let mut c = config(None);
		assert!(c.warnings().is_empty());
		c.command = String::new();
		c.args.clear();
		assert_eq!(c.warnings(), vec!["no command given", "no arguments given"]);
	}
}
