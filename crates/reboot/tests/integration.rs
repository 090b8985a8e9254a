use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::unistd::{getpgid, getpgrp, Pid};
use reboot::*;
use tokio::sync::mpsc;

fn command(dir: &Path, program: &str, args: &[&str]) -> LaunchCommand {
	LaunchCommand {
		program: program.to_string(),
		args: args.iter().map(|a| a.to_string()).collect(),
		dir: dir.to_path_buf(),
	}
}

async fn wait_for_output(capture: &OutputCapture, stream: Stream, needle: &str) -> String {
	for _ in 0..100 {
		let text = String::from_utf8_lossy(&capture.snapshot(stream).await).to_string();
		if text.contains(needle) {
			return text;
		}
		tokio::time::sleep(Duration::from_millis(20)).await;
	}
	String::from_utf8_lossy(&capture.snapshot(stream).await).to_string()
}

// --- Launcher ---

#[tokio::test]
async fn launch_tees_both_streams() {
	let dir = tempfile::tempdir().unwrap();
	let mut launcher = SystemLauncher;
	let mut handle = launcher
		.launch(&command(dir.path(), "sh", &["-c", "echo hello; echo oops 1>&2"]))
		.unwrap();

	let status = handle.wait().await.unwrap();
	assert!(status.success());
	assert!(wait_for_output(&handle.output, Stream::Stdout, "hello").await.contains("hello"));
	assert!(wait_for_output(&handle.output, Stream::Stderr, "oops").await.contains("oops"));
}

#[tokio::test]
async fn launch_runs_in_working_dir() {
	let dir = tempfile::tempdir().unwrap();
	let expected = dir.path().canonicalize().unwrap();
	let mut handle = SystemLauncher.launch(&command(dir.path(), "pwd", &[])).unwrap();
	handle.wait().await;

	let out = wait_for_output(&handle.output, Stream::Stdout, "\n").await;
	assert_eq!(PathBuf::from(out.trim()).canonicalize().unwrap(), expected);
}

#[tokio::test]
async fn child_leads_its_own_group() {
	let dir = tempfile::tempdir().unwrap();
	let mut launcher = SystemLauncher;
	let mut handle = launcher.launch(&command(dir.path(), "sleep", &["30"])).unwrap();

	let pgid = getpgid(Some(Pid::from_raw(handle.pid as i32))).unwrap();
	assert_eq!(pgid.as_raw() as u32, handle.pid);
	assert_ne!(pgid, getpgrp());

	launcher.kill_group(&handle).unwrap();
	handle.wait().await;
}

#[tokio::test]
async fn kill_group_sends_sigkill() {
	let dir = tempfile::tempdir().unwrap();
	let mut launcher = SystemLauncher;
	let mut handle = launcher.launch(&command(dir.path(), "sleep", &["30"])).unwrap();

	let outcome = launcher.kill_group(&handle).unwrap();
	assert_eq!(outcome, KillOutcome::Signalled { pgid: handle.pid });

	let status = tokio::time::timeout(Duration::from_secs(5), handle.wait())
		.await
		.unwrap()
		.unwrap();
	assert_eq!(status.signal(), Some(9));
}

#[tokio::test]
async fn kill_group_after_exit_is_harmless() {
	let dir = tempfile::tempdir().unwrap();
	let mut launcher = SystemLauncher;
	let mut handle = launcher.launch(&command(dir.path(), "true", &[])).unwrap();
	handle.wait().await;

	assert_eq!(launcher.kill_group(&handle).unwrap(), KillOutcome::AlreadyExited);
}

#[tokio::test]
async fn spawn_failure_is_reported() {
	let dir = tempfile::tempdir().unwrap();
	let result = SystemLauncher.launch(&command(dir.path(), "reboot-no-such-binary", &[]));
	assert!(matches!(
		result,
		Err(Error::Spawn { ref program, .. }) if program == "reboot-no-such-binary"
	));
}

// --- Supervisor with real processes ---

#[tokio::test]
async fn supervisor_replaces_running_child() {
	let dir = tempfile::tempdir().unwrap();
	let config = LaunchConfig {
		dir: dir.path().to_path_buf(),
		command: "sleep".into(),
		args: vec!["30".into()],
		include: "src".into(),
		port: 8080,
		config_file: None,
	};
	let mut sup = Supervisor::new(config, SystemLauncher);

	let (tx, mut rx) = mpsc::unbounded_channel();
	tx.send(WatchSignal::Change(ChangeEvent::new("/p/src/A.java", ChangeOp::Write))).unwrap();
	tx.send(WatchSignal::Closed).unwrap();
	sup.run(&mut rx).await.unwrap();
	let first = sup.current().map(|h| h.pid).unwrap();

	tx.send(WatchSignal::Change(ChangeEvent::new("/p/src/A.java", ChangeOp::Write))).unwrap();
	tx.send(WatchSignal::Closed).unwrap();
	sup.run(&mut rx).await.unwrap();
	let second = sup.current().map(|h| h.pid).unwrap();
	assert_ne!(first, second);
	assert_eq!(sup.launches(), 2);

	let handle = sup.current_mut().unwrap();
	reboot::process::kill_process_group(handle.pid).unwrap();
	let status = tokio::time::timeout(Duration::from_secs(5), handle.wait())
		.await
		.unwrap()
		.unwrap();
	assert_eq!(status.signal(), Some(9));
}

#[tokio::test]
async fn start_fails_fast_on_missing_root() {
	let dir = tempfile::tempdir().unwrap();
	let config = LaunchConfig {
		dir: dir.path().join("missing"),
		command: "true".into(),
		args: vec![],
		include: "src".into(),
		port: 8080,
		config_file: None,
	};
	let result = reboot::start(config, StartOptions::default()).await;
	assert!(matches!(result, Err(Error::WatchRoot { .. })));
}

// --- Watcher ---

#[tokio::test]
async fn poll_watcher_only_reports_included_paths() {
	let dir = tempfile::tempdir().unwrap();
	std::fs::create_dir(dir.path().join("src")).unwrap();
	std::fs::create_dir(dir.path().join("docs")).unwrap();

	let options = WatchOptions {
		debounce: Duration::from_millis(10),
		backend: Backend::Poll {
			interval: Duration::from_millis(50),
		},
	};
	let (tx, mut rx) = mpsc::unbounded_channel();
	let watcher = ChangeWatcher::start(dir.path(), "/src/", &options, tx).unwrap();

	std::fs::write(dir.path().join("docs/readme.md"), "docs").unwrap();
	tokio::time::sleep(Duration::from_millis(200)).await;
	std::fs::write(dir.path().join("src/Main.java"), "class Main {}").unwrap();

	let signal = tokio::time::timeout(Duration::from_secs(5), rx.recv())
		.await
		.unwrap()
		.unwrap();
	let WatchSignal::Change(event) = signal else {
		panic!("expected a change, got {:?}", signal);
	};
	assert!(event.path.ends_with("src/Main.java"), "{:?}", event.path);

	watcher.close();
	loop {
		match rx.recv().await {
			Some(WatchSignal::Closed) | None => break,
			Some(WatchSignal::Change(e)) => assert!(!e.path.to_string_lossy().contains("docs")),
			Some(other) => panic!("unexpected {:?}", other),
		}
	}
}

// --- Ports ---

#[test]
fn unused_port_reports_not_found_twice() {
	// Nothing in the test environment listens on this port.
	struct Empty;
	impl PortQuery for Empty {
		fn bindings(&self, _port: u16) -> Result<Vec<PortBinding>> {
			Ok(vec![])
		}
	}
	for _ in 0..2 {
		assert_eq!(
			ports::terminate_listener_on_port(&Empty, 65_001).unwrap(),
			Termination::NotFound
		);
	}
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
#[test]
fn native_query_sees_our_own_listener() {
	let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
	let port = listener.local_addr().unwrap().port();

	let bindings = match ports::Native.bindings(port) {
		Ok(b) => b,
		// restricted sandboxes may hide the socket table
		Err(_) => return,
	};
	assert_own_listener(&bindings, port);
	drop(listener);
}

#[test]
fn lsof_query_sees_our_own_listener() {
	let lsof_missing = matches!(
		std::process::Command::new("lsof").arg("-v").output(),
		Err(ref e) if e.kind() == std::io::ErrorKind::NotFound
	);
	if lsof_missing {
		return;
	}

	let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
	let port = listener.local_addr().unwrap().port();

	let bindings = ports::Lsof.bindings(port).unwrap();
	assert_own_listener(&bindings, port);
	drop(listener);
}

fn assert_own_listener(bindings: &[PortBinding], port: u16) {
	let found = ports::select_listener(bindings, port)
		.unwrap_or_else(|| panic!("no listener on {} in {:?}", port, bindings));
	assert_eq!(found.pid, std::process::id());
	assert_eq!(found.local_port, Some(port));
}
