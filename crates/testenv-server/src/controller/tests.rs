//! Unit tests for the lifecycle state machine, hooks and process handling.
#![cfg(unix)]

use std::fs;
use std::net::TcpListener;
use std::path::Path;
use std::time::Duration;

use mockall::mock;
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use tempfile::TempDir;

use super::*;
use crate::descriptor::DescriptorContext;
use crate::probe;

mock! {
    Hooks {}
    impl ServerHooks for Hooks {
        fn fill(&mut self, descriptor: &ServerDescriptor, pid: Option<u32>) -> Result<(), HookError>;
        fn ctrl(
            &mut self,
            descriptor: &ServerDescriptor,
            pid: Option<u32>,
            args: &[String],
        ) -> Result<(), HookError>;
    }
}

struct Harness {
    dir: TempDir,
    context: DescriptorContext,
}

impl Harness {
    fn descriptor(&self, name: &str, raw: Value) -> ServerDescriptor {
        ServerDescriptor::from_value(name, raw, &self.context).expect("valid descriptor")
    }

    fn controller(&self, name: &str, raw: Value) -> ServerController<Vec<u8>> {
        ServerController::with_diagnostics(self.descriptor(name, raw), Vec::new())
    }

    fn run_dir(&self) -> &Path {
        self.context.run_dir()
    }
}

#[fixture]
fn harness() -> Harness {
    let dir = TempDir::new().expect("temp dir");
    let context = DescriptorContext::new(dir.path().join("run"), dir.path());
    Harness { dir, context }
}

fn wait_until_exited<W: Write>(controller: &mut ServerController<W>) -> bool {
    probe::wait_for(|| !controller.is_running(), Duration::from_secs(5))
}

#[rstest]
fn operations_out_of_order_are_rejected(harness: Harness) {
    let mut controller = harness.controller("svc", json!({"command": "sleep 30"}));
    for result in [controller.start().map(|_| ()), controller.wait_ready(), controller.fill()] {
        assert!(matches!(
            result,
            Err(LifecycleError::InvalidState {
                state: ServerState::Created,
                ..
            })
        ));
    }
    assert_eq!(controller.stop(), StopOutcome::NotRunning);
    assert_eq!(controller.state(), ServerState::Created);
    assert!(!controller.is_running());
}

#[rstest]
fn prepare_creates_private_directory_and_config(harness: Harness) {
    let mut controller = harness.controller(
        "db",
        json!({
            "command": "sleep 30",
            "config": {"port": 6380},
            "configtype": "ini",
            "configfile": "db.ini"
        }),
    );
    controller.prepare().expect("prepare");
    let basedir = harness.run_dir().join("db");
    assert!(basedir.is_dir());
    assert_eq!(
        fs::read_to_string(basedir.join("db.ini")).expect("config written"),
        "port = 6380\n"
    );
    assert_eq!(controller.state(), ServerState::Prepared);
    assert!(matches!(
        controller.prepare(),
        Err(LifecycleError::InvalidState {
            operation: "prepare",
            ..
        })
    ));
}

#[rstest]
fn prepare_refuses_existing_directory(harness: Harness) {
    fs::create_dir_all(harness.run_dir().join("db")).expect("leftover dir");
    let mut controller = harness.controller("db", json!({"command": "sleep 30"}));
    assert!(matches!(
        controller.prepare(),
        Err(LifecycleError::DirectoryExists { ref server, .. }) if server == "db"
    ));
    assert_eq!(controller.state(), ServerState::Created);
}

#[rstest]
fn unwritable_config_surfaces_writer_error(harness: Harness) {
    let mut controller = harness.controller(
        "db",
        json!({
            "command": "sleep 30",
            "config": {"nested": {"too": {"deep": 1}}},
            "configtype": "ini",
            "configfile": "db.ini"
        }),
    );
    assert!(matches!(
        controller.prepare(),
        Err(LifecycleError::ConfigWrite {
            source: crate::emitter::ConfigWriteError::Unsupported { .. },
            ..
        })
    ));
}

#[rstest]
fn start_writes_command_and_pid_diagnostics(harness: Harness) {
    let mut controller = harness.controller("svc", json!({"command": "sleep 30"}));
    controller.prepare().expect("prepare");
    let pid = controller.start().expect("start");
    assert_eq!(controller.pid(), Some(pid));
    assert_eq!(controller.state(), ServerState::Started);
    assert!(controller.is_running());

    let diagnostics = String::from_utf8(controller.diagnostics().clone()).expect("utf8");
    let lines: Vec<&str> = diagnostics.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines.first().copied(), Some(controller.descriptor().command_line().as_str()));
    assert_eq!(lines.get(1).copied(), Some(format!("pid = {pid}").as_str()));

    assert_eq!(controller.stop(), StopOutcome::Exited);
    assert!(!probe::is_running(pid));
    assert!(!controller.is_running());
}

#[rstest]
fn stopped_controllers_cannot_restart(harness: Harness) {
    let mut controller = harness.controller("svc", json!({"command": "sleep 30"}));
    controller.prepare().expect("prepare");
    controller.start().expect("start");
    controller.stop();
    assert_eq!(controller.state(), ServerState::Stopped);
    assert_eq!(controller.stop(), StopOutcome::NotRunning);
    assert!(matches!(
        controller.start(),
        Err(LifecycleError::InvalidState {
            state: ServerState::Stopped,
            ..
        })
    ));
}

#[rstest]
fn exited_children_are_reaped_by_is_running(harness: Harness) {
    let mut controller = harness.controller("svc", json!({"command": "true"}));
    controller.prepare().expect("prepare");
    let pid = controller.start().expect("start");
    assert!(wait_until_exited(&mut controller));
    assert!(!probe::is_running(pid), "exited child left as zombie");
    assert_eq!(controller.stop(), StopOutcome::NotRunning);
}

#[rstest]
fn stdout_and_stderr_share_default_log(harness: Harness) {
    let mut controller = harness.controller(
        "svc",
        json!({"command": ["sh", "-c", "echo out; echo err >&2"]}),
    );
    controller.prepare().expect("prepare");
    controller.start().expect("start");
    assert!(wait_until_exited(&mut controller));
    let log = fs::read_to_string(harness.run_dir().join("svc").join("svc.log")).expect("log");
    assert_eq!(log, "out\nerr\n");
}

#[rstest]
fn environment_overrides_reach_the_child(harness: Harness) {
    let mut controller = harness.controller(
        "svc",
        json!({
            "command": ["sh", "-c", "printf '%s:%s' \"$GREETING\" \"${HOME:-unset}\" > env.txt"],
            "environ": {"GREETING": "hello"},
            "clear_environ": true
        }),
    );
    controller.prepare().expect("prepare");
    controller.start().expect("start");
    assert!(wait_until_exited(&mut controller));
    let written = fs::read_to_string(harness.run_dir().join("svc").join("env.txt")).expect("env");
    assert_eq!(written, "hello:unset");
}

#[rstest]
fn servers_without_address_are_ready_immediately(harness: Harness) {
    let mut controller = harness.controller("svc", json!({"command": "sleep 30"}));
    assert!(controller.is_ready());
    controller.prepare().expect("prepare");
    controller.start().expect("start");
    controller.wait_ready().expect("ready");
    assert_eq!(controller.state(), ServerState::Ready);
    controller.wait_ready().expect("ready is idempotent");
}

#[rstest]
fn hooks_receive_descriptor_pid_and_args(harness: Harness) {
    let mut hooks = MockHooks::new();
    hooks
        .expect_fill()
        .withf(|descriptor, pid| descriptor.name() == "svc" && pid.is_some())
        .times(1)
        .returning(|_, _| Ok(()));
    hooks
        .expect_ctrl()
        .withf(|_, _, args| args.iter().map(String::as_str).eq(["flush", "all"]))
        .times(1)
        .returning(|_, _, _| Ok(()));
    hooks
        .expect_ctrl()
        .withf(|_, _, args| args.iter().map(String::as_str).eq(["boom"]))
        .times(1)
        .returning(|_, _, _| Err(HookError::new("no such command")));

    let mut controller = harness
        .controller("svc", json!({"command": "sleep 30"}))
        .with_hooks(hooks);
    controller.prepare().expect("prepare");
    controller.start().expect("start");
    controller.wait_ready().expect("ready");
    controller.fill().expect("fill");
    controller
        .ctrl(&["flush".to_owned(), "all".to_owned()])
        .expect("ctrl");
    match controller.ctrl(&["boom".to_owned()]) {
        Err(LifecycleError::Hook { hook, source, .. }) => {
            assert_eq!(hook, "ctrl");
            assert_eq!(source.message(), "no such command");
        }
        other => panic!("expected hook failure, got {other:?}"),
    }
}

#[rstest]
fn dropping_a_running_controller_stops_it(harness: Harness) {
    let mut controller = harness.controller("svc", json!({"command": "sleep 30"}));
    controller.prepare().expect("prepare");
    let pid = controller.start().expect("start");
    drop(controller);
    assert!(!probe::is_running(pid));
}

#[rstest]
fn missing_output_directory_fails_start(harness: Harness) {
    let mut controller = harness.controller(
        "svc",
        json!({"command": "sleep 30", "stdout": "missing/out.log"}),
    );
    controller.prepare().expect("prepare");
    assert!(matches!(
        controller.start(),
        Err(LifecycleError::OpenOutput { .. })
    ));
    assert_eq!(controller.state(), ServerState::Prepared);
    assert!(harness.dir.path().join("run").join("svc").is_dir());
}

#[rstest]
fn huge_start_timeouts_bound_nothing_and_never_overflow(harness: Harness) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind listener");
    let port = listener.local_addr().expect("local addr").port();
    let mut controller = harness.controller(
        "svc",
        json!({
            "command": ["sh", "-c", "echo $$ > svc.pid; exec sleep 30"],
            "pidfile": "svc.pid",
            "address": format!("127.0.0.1:{port}"),
            "start_timeout": u64::MAX
        }),
    );
    assert_eq!(
        controller.descriptor().start_timeout(),
        Duration::from_secs(u64::MAX)
    );
    controller.prepare().expect("prepare");
    let pid = controller.start().expect("start");
    controller.wait_ready().expect("ready");
    assert_eq!(controller.stop(), StopOutcome::Exited);
    assert!(!probe::is_running(pid));
}

/// Collects formatted events for inspection.
#[derive(Clone, Default)]
struct CapturedLog(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CapturedLog {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log buffer")).into_owned()
    }
}

#[rstest]
fn process_events_carry_the_server_span(harness: Harness) {
    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let mut controller = harness.controller("spanned", json!({"command": "sleep 30"}));
        controller.prepare().expect("prepare");
        controller.start().expect("start");
        assert_eq!(controller.stop(), StopOutcome::Exited);
    });

    let text = log.text();
    let stop_line = text
        .lines()
        .find(|line| line.contains("stop finished"))
        .unwrap_or_else(|| panic!("no stop event in:\n{text}"));
    assert!(stop_line.contains("server{server=spanned}"), "line: {stop_line}");
}
