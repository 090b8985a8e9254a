//! spring-reboot: restart a Spring Boot dev server whenever its sources
//! change, or free the port a stray instance is still holding.

mod settings;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;
use reboot::ports::{self, Termination};
use reboot::Exit;
use tracing::Level;

#[derive(Parser)]
#[command(name = "spring-reboot", version)]
#[command(about = "A simple utility to assist in the development of Spring Boot web apps")]
struct Cli {
	/// Enable debug logging
	#[arg(short, long, global = true)]
	verbose: bool,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Watch a project and restart the app on every source change
	#[command(visible_alias = "s")]
	Start(StartArgs),

	/// Kill a running app on a given port
	#[command(visible_aliases = ["k", "stop"])]
	Kill {
		/// Port the app listens on [default: 8080]
		#[arg(short, long)]
		port: Option<u16>,
	},
}

#[derive(Args)]
struct StartArgs {
	/// Project directory; takes precedence over --dir
	path: Option<PathBuf>,

	/// Project directory
	#[arg(short, long, default_value = ".")]
	dir: PathBuf,

	/// Port the app listens on
	#[arg(short, long)]
	port: Option<u16>,

	/// Extra Spring config file, passed as spring.config.additional-location
	#[arg(short = 'c', long = "config")]
	config_file: Option<String>,

	/// Program to run [default: mvn]
	#[arg(long)]
	command: Option<String>,

	/// Argument for the program; repeat for several [default: spring-boot:run]
	#[arg(long = "arg", allow_hyphen_values = true)]
	args: Vec<String>,

	/// Only changes to paths matching this pattern trigger a restart [default: src]
	#[arg(long)]
	include: Option<String>,

	/// Poll the filesystem instead of using native notifications
	#[arg(long)]
	poll: bool,
}

#[tokio::main]
async fn main() {
	let cli = Cli::parse();

	let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
	tracing_subscriber::fmt()
		.with_max_level(level)
		.with_target(false)
		.init();

	match cli.command {
		Commands::Start(args) => cmd_start(args).await,
		Commands::Kill { port } => cmd_kill(port),
	}
}

async fn cmd_start(args: StartArgs) {
	let dir = args.path.unwrap_or(args.dir);
	let file = settings::load(&dir);
	let resolved = settings::resolve(
		dir,
		file,
		settings::Overrides {
			command: args.command,
			args: args.args,
			include: args.include,
			port: args.port,
			config_file: args.config_file,
			poll: args.poll,
		},
	);

	eprintln!(
		"{} {} {} (port {})",
		"spring-reboot".bold(),
		resolved.config.command.cyan(),
		resolved.config.args.join(" ").cyan(),
		resolved.config.port
	);

	match reboot::start(resolved.config, resolved.options).await {
		Ok(Exit::Closed) => tracing::debug!("watcher closed"),
		Ok(Exit::Shutdown) => {}
		Err(e) => {
			tracing::error!("{}", e);
			std::process::exit(1);
		}
	}
}

/// Always exits 0: "nothing on that port" is a normal answer.
fn cmd_kill(port: Option<u16>) {
	let file = settings::load(Path::new("."));
	let port = port.or(file.port).unwrap_or(settings::DEFAULT_PORT);

	match ports::terminate_listener_on_port(&file.query_backend(), port) {
		Ok(Termination::Killed { pid }) => {
			eprintln!("killed pid {} on port {}", pid.bold(), port);
		}
		Ok(Termination::NotFound) => {
			eprintln!("process not found on port {}", port);
		}
		Err(e) => {
			eprintln!("{} port {}: {}", "error:".red().bold(), port, e);
		}
	}
}
