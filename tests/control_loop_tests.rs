use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use cyclelog::io::{Actuation, InputSnapshot, InputSource};
use cyclelog::kernel::diagnostics::RecordingSink;
use cyclelog::kernel::reactor::LoopConfig;
use cyclelog::kernel::telemetry::ConsoleTailReader;
use cyclelog::kernel::time::CycleNumber;
use cyclelog::{ControlLoop, ModeController, OperatingMode, Session, TelemetryConfig};
use tokio_util::sync::CancellationToken;

struct Ramp {
    value: f64,
    step: f64,
}

impl InputSource for Ramp {
    fn read_inputs(&mut self) -> InputSnapshot {
        self.value += self.step;
        InputSnapshot::new()
            .with("value", self.value)
            .with("history", vec![self.value, self.value * 2.0])
    }

    fn actuate(&mut self, _command: &Actuation) -> Result<(), String> {
        Ok(())
    }
}

fn ramp(step: f64) -> Box<dyn InputSource> {
    Box::new(Ramp { value: 0.0, step })
}

fn loop_config() -> LoopConfig {
    LoopConfig {
        period_ms: 1,
        console_poll_every: 1,
        print_epochs: false,
    }
}

fn start(mode: OperatingMode, log: &Path, sink: Arc<RecordingSink>) -> ControlLoop {
    let controller = ModeController::new();
    controller.initialize(mode).unwrap();
    let config = TelemetryConfig {
        mode: mode.as_str().to_string(),
        log_path: Some(log.to_path_buf()),
        ..TelemetryConfig::default()
    };
    let session = Session::start(&controller, &config, sink).unwrap();
    let arm = session.bind_port("Arm", || ramp(0.5), || ramp(0.1));
    let elevator = session.bind_port("Elevator", || ramp(2.0), || ramp(0.3));
    let mut control = ControlLoop::new(session, loop_config());
    control.add_port(arm);
    control.add_port(elevator);
    control
}

#[test]
fn test_replay_run_matches_live_run() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("run.jsonl");

    let mut live = start(OperatingMode::Simulated, &log, Arc::new(RecordingSink::new()));
    let live_reports: Vec<_> = (0..30).map(|_| live.tick_step()).collect();
    let stats = live.shutdown().unwrap().unwrap();
    assert_eq!(stats.records_written, 60);

    let mut replay = start(OperatingMode::Replay, &log, Arc::new(RecordingSink::new()));
    for expected in &live_reports {
        let report = replay.tick_step();
        assert_eq!(report.cycle, expected.cycle);
        assert_eq!(report.timestamp_us, expected.timestamp_us);
        assert_eq!(report.inputs.len(), 2);
        for ((name, snap), (expected_name, expected_snap)) in report.inputs.iter().zip(&expected.inputs) {
            assert_eq!(name, expected_name);
            assert!(snap.bit_eq(expected_snap), "{name} diverged at cycle {}", report.cycle);
        }
    }

    let end = replay.tick_step();
    assert!(end.run_complete);
    assert!(replay.is_finished());
    assert!(replay.shutdown().unwrap().is_none());
}

#[test]
fn test_exhausted_subsystem_halts_alone() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("partial.jsonl");

    // Record a run where the elevator stops reporting after cycle 2.
    {
        let controller = ModeController::new();
        controller.initialize(OperatingMode::Simulated).unwrap();
        let config = TelemetryConfig {
            log_path: Some(log.clone()),
            ..TelemetryConfig::default()
        };
        let session = Session::start(&controller, &config, Arc::new(RecordingSink::new())).unwrap();
        let mut arm = session.bind_port("Arm", || ramp(1.0), || ramp(1.0));
        let mut elevator = session.bind_port("Elevator", || ramp(1.0), || ramp(1.0));
        for c in 1..=4 {
            let cycle = CycleNumber(c);
            session.begin_cycle(cycle).unwrap();
            arm.refresh_inputs(cycle).unwrap();
            if c <= 2 {
                elevator.refresh_inputs(cycle).unwrap();
            }
        }
        session.finish().unwrap();
    }

    let mut replay = start(OperatingMode::Replay, &log, Arc::new(RecordingSink::new()));
    replay.tick_step();
    replay.tick_step();
    let third = replay.tick_step();
    assert_eq!(third.halted, vec!["Elevator".to_string()]);
    assert_eq!(third.inputs.len(), 1);
    assert!(replay.is_halted("Elevator"));
    assert!(!replay.is_halted("Arm"));

    let fourth = replay.tick_step();
    assert_eq!(fourth.inputs.len(), 1);
    assert!(fourth.halted.is_empty());
    assert!(!replay.is_finished());
}

#[test]
fn test_console_polled_each_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("run.jsonl");
    let console_path = dir.path().join("console.log");
    std::fs::write(&console_path, "boot\n").unwrap();

    let sink = Arc::new(RecordingSink::new());
    let console = ConsoleTailReader::open(&console_path, sink.clone());
    let mut control = start(OperatingMode::Simulated, &log, sink.clone()).with_console(Box::new(console));

    assert_eq!(control.tick_step().console, "boot\n");
    assert_eq!(control.tick_step().console, "");

    let mut f = OpenOptions::new().append(true).open(&console_path).unwrap();
    f.write_all(b"brownout\n").unwrap();
    assert_eq!(control.tick_step().console, "brownout\n");

    let names: Vec<_> = control.tracer().epochs().iter().map(|e| e.label.clone()).collect();
    assert_eq!(names, vec!["begin_cycle", "Arm", "Elevator", "console"]);
    control.shutdown().unwrap();
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_run_stops_when_replay_ends() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("run.jsonl");

    let mut live = start(OperatingMode::Simulated, &log, Arc::new(RecordingSink::new()));
    for _ in 0..5 {
        live.tick_step();
    }
    live.shutdown().unwrap();

    let mut replay = start(OperatingMode::Replay, &log, Arc::new(RecordingSink::new()));
    replay.run(CancellationToken::new()).await;
    assert_eq!(replay.cycle, CycleNumber(6));
    assert!(replay.is_finished());
}

#[tokio::test]
async fn test_run_stops_on_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("run.jsonl");
    let mut control = start(OperatingMode::Simulated, &log, Arc::new(RecordingSink::new()));

    let cancel = CancellationToken::new();
    cancel.cancel();
    control.run(cancel).await;
    assert_eq!(control.cycle, CycleNumber(0));
    control.shutdown().unwrap();
}
