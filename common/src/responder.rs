use log::{debug, info, warn};

use crate::{
    error::NetError,
    render::{PageTemplate, ResponseBuffer},
    stack::{AcceptVerdict, ConnId, TcpHandler, TcpStack},
    store::SharedStore,
};

pub const REQUEST_SENTINEL: &[u8] = b"GET";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Listening,
    AwaitingRequest,
    Sending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendProgress {
    /// A chunk of this many bytes was queued and flushed.
    Wrote(usize),
    /// The stack has no send window; wait for the next acknowledgement.
    Stalled,
    /// Everything was sent and the connection closed.
    Complete,
    /// Nothing to do: no connection or no response in flight.
    Idle,
    /// A write or flush failed and the connection was torn down.
    Failed,
}

/// Single-client HTTP responder driven by stack callbacks.
#[derive(Debug)]
pub struct Responder {
    store: SharedStore,
    template: PageTemplate,
    port: Option<u16>,
    active: Option<ConnId>,
    phase: Phase,
    response: ResponseBuffer,
    bytes_sent: usize,
    completed: u64,
}

impl Responder {
    pub fn new(store: SharedStore, template: PageTemplate, response_capacity: usize) -> Self {
        Self {
            store,
            template,
            port: None,
            active: None,
            phase: Phase::Listening,
            response: ResponseBuffer::new(response_capacity),
            bytes_sent: 0,
            completed: 0,
        }
    }

    pub fn listen<S: TcpStack>(&mut self, stack: &mut S, port: u16) -> Result<(), NetError> {
        stack.listen(port)?;
        self.port = Some(port);
        info!("http responder listening on port {port}");
        Ok(())
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn active_connection(&self) -> Option<ConnId> {
        self.active
    }

    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    pub fn response_len(&self) -> usize {
        self.response.len()
    }

    pub fn responses_completed(&self) -> u64 {
        self.completed
    }

    pub fn send_step<S: TcpStack>(&mut self, stack: &mut S) -> SendProgress {
        let Some(conn) = self.active else {
            return SendProgress::Idle;
        };
        if self.phase != Phase::Sending {
            return SendProgress::Idle;
        }

        let remaining = self.response.len() - self.bytes_sent;
        if remaining == 0 {
            self.completed = self.completed.saturating_add(1);
            debug!("response to {conn} complete ({} bytes)", self.response.len());
            self.close(stack);
            return SendProgress::Complete;
        }

        let window = stack.send_window(conn);
        if window == 0 {
            debug!("send window closed for {conn}, {remaining} bytes pending");
            return SendProgress::Stalled;
        }

        let chunk = remaining.min(window);
        let start = self.bytes_sent;
        if let Err(err) = stack.write(conn, &self.response.as_bytes()[start..start + chunk]) {
            warn!("write to {conn} failed: {err}; dropping connection");
            self.close(stack);
            return SendProgress::Failed;
        }
        self.bytes_sent += chunk;

        if let Err(err) = stack.output(conn) {
            warn!("flush to {conn} failed: {err}; dropping connection");
            self.close(stack);
            return SendProgress::Failed;
        }

        debug!("sent {chunk} bytes to {conn} ({}/{})", self.bytes_sent, self.response.len());
        SendProgress::Wrote(chunk)
    }

    /// Idempotent teardown of the active connection.
    pub fn close<S: TcpStack>(&mut self, stack: &mut S) {
        if let Some(conn) = self.active.take() {
            if let Err(err) = stack.close(conn) {
                warn!("graceful close of {conn} failed: {err}; aborting");
                stack.abort(conn);
            }
            debug!("connection {conn} closed");
        }
        self.phase = Phase::Listening;
        self.bytes_sent = 0;
    }

    fn begin_response<S: TcpStack>(&mut self, stack: &mut S) {
        let template = &self.template;
        let response = &mut self.response;
        self.store.with(|state| template.render(state, response));
        if self.response.is_full() {
            warn!("response truncated at {} bytes", self.response.capacity());
        }

        self.bytes_sent = 0;
        self.phase = Phase::Sending;
        self.send_step(stack);
    }
}

impl<S: TcpStack> TcpHandler<S> for Responder {
    fn on_accept(&mut self, stack: &mut S, conn: ConnId) -> AcceptVerdict {
        if let Some(active) = self.active {
            info!("rejecting {conn}: {active} is still being served");
            stack.abort(conn);
            return AcceptVerdict::Rejected;
        }

        debug!("accepted {conn}");
        self.active = Some(conn);
        self.phase = Phase::AwaitingRequest;
        self.bytes_sent = 0;
        AcceptVerdict::Adopted
    }

    fn on_receive(&mut self, stack: &mut S, conn: ConnId, payload: Option<&[u8]>) {
        if self.active != Some(conn) {
            return;
        }

        let Some(payload) = payload else {
            debug!("peer closed {conn}");
            self.close(stack);
            return;
        };

        stack.recved(conn, payload.len());

        if payload.starts_with(REQUEST_SENTINEL) {
            self.begin_response(stack);
        } else {
            debug!("ignoring {} byte non-GET payload on {conn}", payload.len());
        }
    }

    fn on_sent(&mut self, stack: &mut S, conn: ConnId, _len: usize) {
        if self.active == Some(conn) {
            self.send_step(stack);
        }
    }

    fn on_error(&mut self, conn: ConnId, err: NetError) {
        if self.active == Some(conn) {
            warn!("connection {conn} failed: {err}");
            self.active = None;
            self.phase = Phase::Listening;
            self.bytes_sent = 0;
        }
    }
}
