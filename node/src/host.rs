use std::{io::ErrorKind, path::PathBuf, time::Duration};

use anyhow::Context;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use statusboard_common::{Board, EventLoop, RuntimeConfig, SharedStore, SocketStack};

const DEFAULT_HOST_PORT: u16 = 8080;
const PRESS_PERIOD_MS: u64 = 7_000;
const PRESS_HOLD_MS: u64 = 600;
/// Raw code that converts to roughly 27 °C with the default calibration.
const ADC_BASELINE: u16 = 876;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut runtime = match load_runtime_config()
        .await
        .context("failed to load runtime config")?
    {
        Some(runtime) => runtime,
        None => {
            let mut runtime = RuntimeConfig::default();
            runtime.monitor.http_port = DEFAULT_HOST_PORT;
            runtime
        }
    };
    if let Some(port) = std::env::var("STATUSBOARD_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        runtime.monitor.http_port = port;
    }
    debug!(
        "effective monitor config: {}",
        serde_json::to_string(&runtime.monitor)?
    );

    let monitor = runtime.monitor;
    let store = SharedStore::new(monitor.event_log_capacity);
    let board = SimulatedBoard::new(monitor.button_active_low);
    let stack = SocketStack::new(monitor.send_buffer_size);

    let mut event_loop = EventLoop::start(&monitor, board, stack, store)
        .with_context(|| format!("failed to start http responder on port {}", monitor.http_port))?;
    let port = event_loop.stack_mut().local_port()?;
    info!("status board simulator serving http://127.0.0.1:{port}/");

    let mut interval = tokio::time::interval(Duration::from_millis(monitor.tick_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                event_loop.run_once();
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    warn!("failed to listen for ctrl-c: {err}");
                }
                break;
            }
        }
    }

    info!(
        "shutting down after {} responses",
        event_loop.responder().responses_completed()
    );
    Ok(())
}

async fn load_runtime_config() -> anyhow::Result<Option<RuntimeConfig>> {
    let path = std::env::var("STATUSBOARD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.statusboard/runtime.json"));

    match tokio::fs::read(&path).await {
        Ok(raw) => RuntimeConfig::from_json_slice(&raw)
            .map(Some)
            .with_context(|| format!("invalid config at {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!("no config at {}; using defaults", path.display());
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Stand-in hardware: the button is held for a moment every few seconds and
/// the temperature code drifts slowly around the baseline.
struct SimulatedBoard {
    started: Instant,
    active_low: bool,
    indicator: bool,
}

impl SimulatedBoard {
    fn new(active_low: bool) -> Self {
        Self {
            started: Instant::now(),
            active_low,
            indicator: false,
        }
    }
}

impl Board for SimulatedBoard {
    fn button_level(&mut self) -> bool {
        let held = self.now_ms() % PRESS_PERIOD_MS >= PRESS_PERIOD_MS - PRESS_HOLD_MS;
        held != self.active_low
    }

    fn set_indicator(&mut self, on: bool) {
        if self.indicator != on {
            self.indicator = on;
            info!("indicator {}", if on { "on" } else { "off" });
        }
    }

    fn temperature_raw(&mut self) -> u16 {
        let step = (self.now_ms() / 1_000) % 40;
        let offset = if step < 20 { step } else { 40 - step };
        ADC_BASELINE - 10 + offset as u16
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}
