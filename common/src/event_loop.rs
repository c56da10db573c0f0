use log::info;

use crate::{
    board::Board,
    config::MonitorConfig,
    debounce::{ButtonEdge, ButtonMonitor},
    error::NetError,
    render::PageTemplate,
    responder::Responder,
    sampler::TemperatureSampler,
    stack::TcpStack,
    store::{SharedStore, STATUS_PRESSED, STATUS_RELEASED},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub edge: Option<ButtonEdge>,
    pub temperature_c: f32,
}

/// Cooperative single-context loop.
///
/// Each [`EventLoop::run_once`] lets the stack make progress (which may run
/// responder callbacks), advances the button debouncer, refreshes the status
/// text and samples the temperature. The caller sleeps between iterations.
pub struct EventLoop<B, S> {
    board: B,
    stack: S,
    responder: Responder,
    button: ButtonMonitor,
    sampler: TemperatureSampler,
    store: SharedStore,
    status_refresh_ms: u64,
    last_status_refresh_ms: u64,
}

impl<B: Board, S: TcpStack> EventLoop<B, S> {
    /// Binds the responder's listener. A bind failure is fatal to startup.
    pub fn start(
        config: &MonitorConfig,
        board: B,
        mut stack: S,
        store: SharedStore,
    ) -> Result<Self, NetError> {
        let mut responder = Responder::new(
            store.clone(),
            PageTemplate::new(config.page_refresh_secs),
            config.response_capacity(),
        );
        responder.listen(&mut stack, config.http_port)?;

        let now_ms = board.now_ms();
        Ok(Self {
            board,
            stack,
            responder,
            button: ButtonMonitor::new(config.debounce_ms, config.button_active_low, now_ms),
            sampler: TemperatureSampler::new(config.calibration),
            store,
            status_refresh_ms: config.status_refresh_ms,
            last_status_refresh_ms: now_ms,
        })
    }

    pub fn run_once(&mut self) -> Tick {
        self.stack.poll(&mut self.responder);

        let now_ms = self.board.now_ms();
        let level = self.board.button_level();
        let edge = self.button.update(level, now_ms);
        match edge {
            Some(ButtonEdge::Pressed) => {
                let entry = format!("Button pressed at second {}.<br>", now_ms / 1_000);
                self.store.with(|state| {
                    state.append_event(&entry);
                    state.set_status(STATUS_PRESSED);
                });
                self.board.set_indicator(true);
                info!("button pressed at {now_ms} ms");
            }
            Some(ButtonEdge::Released) => {
                self.store.set_status(STATUS_RELEASED);
                self.board.set_indicator(false);
                info!("button released at {now_ms} ms");
            }
            None => {}
        }

        if now_ms.saturating_sub(self.last_status_refresh_ms) >= self.status_refresh_ms {
            self.last_status_refresh_ms = now_ms;
            let status = if self.button.is_pressed() {
                STATUS_PRESSED
            } else {
                STATUS_RELEASED
            };
            self.store.set_status(status);
        }

        let raw = self.board.temperature_raw();
        let temperature_c = self.sampler.sample(raw, &self.store);

        Tick {
            edge,
            temperature_c,
        }
    }

    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn stack_mut(&mut self) -> &mut S {
        &mut self.stack
    }
}
