//! Network-stack seam.
//!
//! A [`TcpStack`] owns the sockets and, inside [`TcpStack::poll`], reports
//! what happened to them by calling back into a [`TcpHandler`]. Handlers get
//! the stack back as `&mut S` so they can write, close or abort from within
//! the callback, the same way an lwIP `tcp_recv`/`tcp_sent` handler would.

use core::fmt;

use crate::error::NetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u32);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptVerdict {
    /// The handler adopted the peer; the stack delivers its events from now on.
    Adopted,
    /// The handler aborted the peer from inside the callback.
    Rejected,
}

pub trait TcpHandler<S: ?Sized> {
    fn on_accept(&mut self, stack: &mut S, conn: ConnId) -> AcceptVerdict;

    /// `None` signals end-of-stream (the peer closed its side).
    fn on_receive(&mut self, stack: &mut S, conn: ConnId, payload: Option<&[u8]>);

    fn on_sent(&mut self, stack: &mut S, conn: ConnId, len: usize);

    /// The connection is already gone when this is called; do not close it.
    fn on_error(&mut self, conn: ConnId, err: NetError);
}

pub trait TcpStack {
    fn listen(&mut self, port: u16) -> Result<(), NetError>;

    /// Bytes the stack will currently accept through [`TcpStack::write`].
    fn send_window(&self, conn: ConnId) -> usize;

    /// Copies `data` into a stack-owned buffer; nothing is transmitted until
    /// [`TcpStack::output`].
    fn write(&mut self, conn: ConnId, data: &[u8]) -> Result<(), NetError>;

    fn output(&mut self, conn: ConnId) -> Result<(), NetError>;

    /// Receive-window update after the handler consumed `len` bytes.
    fn recved(&mut self, conn: ConnId, len: usize);

    /// Graceful close. Stops event delivery for `conn` immediately; queued
    /// bytes still drain.
    fn close(&mut self, conn: ConnId) -> Result<(), NetError>;

    /// Abrupt teardown, queued bytes are discarded.
    fn abort(&mut self, conn: ConnId);

    fn poll<H: TcpHandler<Self>>(&mut self, handler: &mut H)
    where
        Self: Sized;
}
