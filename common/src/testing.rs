//! In-memory stack used by unit tests.

use std::collections::VecDeque;

use crate::{
    error::NetError,
    stack::{ConnId, TcpHandler, TcpStack},
};

const DEFAULT_WINDOW: usize = 1_024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StackCall {
    Listen(u16),
    Write(ConnId, usize),
    Output(ConnId),
    Recved(ConnId, usize),
    Close(ConnId),
    Abort(ConnId),
}

#[derive(Debug, Clone)]
pub(crate) enum ScriptedEvent {
    Accept(ConnId),
    Receive(ConnId, Option<Vec<u8>>),
    Sent(ConnId, usize),
}

/// Records every call and replays a scripted send window sequence.
#[derive(Debug, Default)]
pub(crate) struct ScriptedStack {
    pub calls: Vec<StackCall>,
    pub windows: VecDeque<usize>,
    pub events: VecDeque<ScriptedEvent>,
    pub fail_writes: bool,
    pub fail_close: bool,
    bytes: Vec<u8>,
    window_cursor: std::cell::Cell<usize>,
}

impl ScriptedStack {
    pub fn written(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    pub fn written_chunks(&self) -> Vec<usize> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                StackCall::Write(_, len) => Some(*len),
                _ => None,
            })
            .collect()
    }
}

impl TcpStack for ScriptedStack {
    fn listen(&mut self, port: u16) -> Result<(), NetError> {
        self.calls.push(StackCall::Listen(port));
        Ok(())
    }

    fn send_window(&self, _conn: ConnId) -> usize {
        let index = self.window_cursor.get();
        self.window_cursor.set(index + 1);
        self.windows.get(index).copied().unwrap_or(DEFAULT_WINDOW)
    }

    fn write(&mut self, conn: ConnId, data: &[u8]) -> Result<(), NetError> {
        if self.fail_writes {
            return Err(NetError::Reset);
        }
        self.calls.push(StackCall::Write(conn, data.len()));
        self.bytes.extend_from_slice(data);
        Ok(())
    }

    fn output(&mut self, conn: ConnId) -> Result<(), NetError> {
        self.calls.push(StackCall::Output(conn));
        Ok(())
    }

    fn recved(&mut self, conn: ConnId, len: usize) {
        self.calls.push(StackCall::Recved(conn, len));
    }

    fn close(&mut self, conn: ConnId) -> Result<(), NetError> {
        self.calls.push(StackCall::Close(conn));
        if self.fail_close {
            return Err(NetError::Reset);
        }
        Ok(())
    }

    fn abort(&mut self, conn: ConnId) {
        self.calls.push(StackCall::Abort(conn));
    }

    fn poll<H: TcpHandler<Self>>(&mut self, handler: &mut H) {
        while let Some(event) = self.events.pop_front() {
            match event {
                ScriptedEvent::Accept(conn) => {
                    handler.on_accept(self, conn);
                }
                ScriptedEvent::Receive(conn, payload) => {
                    handler.on_receive(self, conn, payload.as_deref());
                }
                ScriptedEvent::Sent(conn, len) => handler.on_sent(self, conn, len),
            }
        }
    }
}
