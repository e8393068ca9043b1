use std::sync::Arc;

use anyhow::Context;
use cyclelog::io::{Actuation, InputSnapshot, InputSource};
use cyclelog::kernel::diagnostics::TracingSink;
use cyclelog::kernel::reactor::LoopConfig;
use cyclelog::kernel::telemetry::ConsoleTailReader;
use cyclelog::{ControlLoop, ModeController, Session, TelemetryConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Pivot arm physics for simulated runs: the angle integrates the commanded
/// speed every cycle.
struct SimulatedArm {
    angle: f64,
    speed: f64,
    dt: f64,
}

impl InputSource for SimulatedArm {
    fn read_inputs(&mut self) -> InputSnapshot {
        self.angle += self.speed * self.dt;
        InputSnapshot::new()
            .with("angle_rad", self.angle)
            .with("speed_rad_per_s", self.speed)
    }

    fn actuate(&mut self, command: &Actuation) -> Result<(), String> {
        let speed = command
            .get("speed_rad_per_s")
            .and_then(|v| v.as_number())
            .ok_or_else(|| "missing speed_rad_per_s".to_string())?;
        self.speed = speed;
        Ok(())
    }
}

/// Stand-in for hardware that is not attached to this machine.
struct NoHardware;

impl InputSource for NoHardware {
    fn read_inputs(&mut self) -> InputSnapshot {
        InputSnapshot::new()
    }

    fn actuate(&mut self, _command: &Actuation) -> Result<(), String> {
        Err("no hardware attached".to_string())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("cyclelog booting...");

    let config = match std::env::args().nth(1) {
        Some(path) => TelemetryConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => TelemetryConfig::default(),
    }
    .apply_env()?;

    // Mode misconfiguration is fatal at startup.
    let controller = ModeController::new();
    controller.initialize(config.operating_mode()?)?;

    let sink = Arc::new(TracingSink);
    let session = Session::start(&controller, &config, sink.clone())?;
    let dt = config.cycle_period_ms as f64 / 1000.0;
    let arm = session.bind_port(
        "PivotArm",
        || Box::new(NoHardware) as Box<dyn InputSource>,
        move || Box::new(SimulatedArm { angle: 0.0, speed: 0.5, dt }) as Box<dyn InputSource>,
    );

    let console = ConsoleTailReader::open(&config.console_path, sink);
    let mut control = ControlLoop::new(session, LoopConfig::from(&config)).with_console(Box::new(console));
    control.add_port(arm);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    tracing::info!("cyclelog active. Press Ctrl+C to stop.");
    control.run(cancel).await;

    if let Some(stats) = control.shutdown()? {
        tracing::info!("Captured {} records", stats.records_written);
    }
    Ok(())
}
