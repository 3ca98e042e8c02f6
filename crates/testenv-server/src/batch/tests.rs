//! Unit tests for batch ordering and coordinated start/stop.
#![cfg(unix)]

use rstest::{fixture, rstest};
use serde_json::{Value, json};
use tempfile::TempDir;

use super::*;
use crate::probe;

struct Batch {
    _dir: TempDir,
    context: DescriptorContext,
}

impl Batch {
    fn descriptors(&self, entries: &[(&str, Value)]) -> Vec<ServerDescriptor> {
        entries
            .iter()
            .map(|(name, raw)| {
                ServerDescriptor::from_value(name, raw.clone(), &self.context)
                    .expect("valid descriptor")
            })
            .collect()
    }

    fn quiet_set(&self, entries: &[(&str, Value)]) -> Result<ServerSet<Vec<u8>>, RunError> {
        let controllers = self
            .descriptors(entries)
            .into_iter()
            .map(|descriptor| ServerController::with_diagnostics(descriptor, Vec::new()))
            .collect();
        ServerSet::from_controllers(controllers)
    }
}

#[fixture]
fn batch() -> Batch {
    let dir = TempDir::new().expect("temp dir");
    let context = DescriptorContext::new(dir.path().join("run"), dir.path());
    Batch { _dir: dir, context }
}

fn sleeper(after: Value) -> Value {
    json!({"command": "sleep 30", "after": after})
}

#[rstest]
fn dependencies_start_first_and_ties_keep_input_order(batch: Batch) {
    let set = batch
        .quiet_set(&[
            ("web", sleeper(json!(["db", "cache"]))),
            ("worker", sleeper(json!("cache"))),
            ("cache", sleeper(Value::Null)),
            ("db", sleeper(Value::Null)),
        ])
        .expect("orderable batch");
    assert_eq!(set.names().collect::<Vec<_>>(), ["cache", "worker", "db", "web"]);
    assert_eq!(set.len(), 4);
}

#[rstest]
fn duplicate_names_are_rejected_before_start(batch: Batch) {
    let result = batch.quiet_set(&[("db", sleeper(Value::Null)), ("db", sleeper(Value::Null))]);
    assert!(matches!(
        result,
        Err(RunError::DuplicateServer { ref server }) if server == "db"
    ));
    assert!(!batch.context.run_dir().exists());
}

#[rstest]
fn unknown_dependencies_are_rejected(batch: Batch) {
    let result = batch.quiet_set(&[("web", sleeper(json!("db")))]);
    assert!(matches!(
        result,
        Err(RunError::UnknownDependency { ref server, ref dependency })
            if server == "web" && dependency == "db"
    ));
}

#[rstest]
#[case::self_loop(vec![("a", json!("a"))], vec!["a"])]
#[case::pair(vec![("a", json!("b")), ("b", json!("a")), ("c", json!(null))], vec!["a", "b"])]
fn cycles_are_rejected(
    batch: Batch,
    #[case] graph: Vec<(&str, Value)>,
    #[case] expected: Vec<&str>,
) {
    let entries: Vec<(&str, Value)> = graph
        .iter()
        .map(|(name, after)| (*name, sleeper(after.clone())))
        .collect();
    match batch.quiet_set(&entries) {
        Err(RunError::DependencyCycle { servers }) => assert_eq!(servers, expected),
        other => panic!("expected cycle, got {other:?}"),
    }
}

#[rstest]
fn invalid_entries_fail_batch_construction(batch: Batch) {
    let result = ServerSet::from_entries(
        [("db", json!({"command": "sleep 30"})), ("bad", json!({}))],
        &batch.context,
    );
    assert!(matches!(
        result,
        Err(RunError::Config {
            source: ConfigError::MissingField { field: "command", .. }
        })
    ));
}

#[rstest]
fn start_all_then_stop_all_in_reverse(batch: Batch) {
    let mut set = batch
        .quiet_set(&[
            ("app", sleeper(json!("db"))),
            ("db", sleeper(Value::Null)),
        ])
        .expect("orderable batch");
    set.start_all().expect("batch starts");
    let pids: Vec<u32> = set.iter().filter_map(ServerController::pid).collect();
    assert_eq!(pids.len(), 2);
    assert!(pids.iter().all(|pid| probe::is_running(*pid)));

    let outcomes = set.stop_all();
    let names: Vec<&str> = outcomes.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["app", "db"]);
    assert!(outcomes.iter().all(|(_, outcome)| *outcome == StopOutcome::Exited));
    assert!(pids.iter().all(|pid| !probe::is_running(*pid)));
}

#[rstest]
fn failed_start_stops_servers_already_running(batch: Batch) {
    let mut set = batch
        .quiet_set(&[
            ("db", sleeper(Value::Null)),
            (
                "app",
                json!({
                    "command": "sleep 30",
                    "after": "db",
                    "address": "127.0.0.1:1",
                    "start_timeout": 0
                }),
            ),
            ("late", sleeper(json!("app"))),
        ])
        .expect("orderable batch");
    let db_pid = {
        let error = set.start_all().expect_err("app never becomes ready");
        assert!(matches!(
            error,
            RunError::Server {
                ref server,
                source: LifecycleError::ReadinessTimeout { .. },
            } if server == "app"
        ));
        set.get("db").and_then(ServerController::pid).expect("db started")
    };
    assert!(!probe::is_running(db_pid));
    assert_eq!(
        set.get("late").map(ServerController::state),
        Some(crate::controller::ServerState::Created)
    );
}

#[rstest]
fn ctrl_targets_named_server(batch: Batch) {
    let mut set = batch
        .quiet_set(&[("db", sleeper(Value::Null))])
        .expect("orderable batch");
    assert!(matches!(
        set.ctrl("db", &[]),
        Err(RunError::Server {
            source: LifecycleError::InvalidState { .. },
            ..
        })
    ));
    set.start_all().expect("batch starts");
    set.ctrl("db", &["flush".to_owned()]).expect("noop ctrl");
    assert!(matches!(
        set.ctrl("nope", &[]),
        Err(RunError::UnknownServer { ref server }) if server == "nope"
    ));
}

#[rstest]
fn dropping_a_set_stops_its_servers(batch: Batch) {
    let mut set = batch
        .quiet_set(&[("db", sleeper(Value::Null))])
        .expect("orderable batch");
    set.start_all().expect("batch starts");
    let pid = set.get("db").and_then(ServerController::pid).expect("pid");
    drop(set);
    assert!(!probe::is_running(pid));
}
