//! [`TcpStack`] over non-blocking `std::net` sockets.
//!
//! Works on a host OS and on ESP-IDF, whose lwIP socket layer backs `std::net`.
//! Each connection gets a stack-owned send buffer of `send_buffer_size` bytes;
//! its free space is the send window. Bytes pushed into the kernel by
//! [`TcpStack::output`] are reported back as sent-acknowledgements on the next
//! [`TcpStack::poll`].

use std::{
    collections::BTreeMap,
    io::{ErrorKind, Read, Write},
    net::{Shutdown, SocketAddr, TcpListener, TcpStream},
    time::{Duration, Instant},
};

use log::{debug, info, warn};

use crate::{
    error::NetError,
    stack::{AcceptVerdict, ConnId, TcpHandler, TcpStack},
};

const RX_CHUNK_SIZE: usize = 1_460;
/// How long a gracefully closed connection may keep unsent bytes queued.
pub const DEFAULT_CLOSE_LINGER: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct Conn {
    stream: TcpStream,
    peer: SocketAddr,
    outbox: Vec<u8>,
    flushed_unreported: usize,
}

impl Conn {
    /// Pushes as much of the outbox into the socket as it takes right now.
    fn flush(&mut self) -> Result<usize, NetError> {
        let mut flushed = 0;
        while !self.outbox.is_empty() {
            match self.stream.write(&self.outbox) {
                Ok(0) => return Err(NetError::Reset),
                Ok(n) => {
                    self.outbox.drain(..n);
                    flushed += n;
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        self.flushed_unreported += flushed;
        Ok(flushed)
    }
}

#[derive(Debug)]
struct Draining {
    conn: Conn,
    deadline: Instant,
}

#[derive(Debug)]
pub struct SocketStack {
    listener: Option<TcpListener>,
    conns: BTreeMap<ConnId, Conn>,
    draining: Vec<Draining>,
    close_linger: Duration,
    next_id: u32,
    send_buffer_size: usize,
    rx_buf: Vec<u8>,
}

impl SocketStack {
    pub fn new(send_buffer_size: usize) -> Self {
        Self {
            listener: None,
            conns: BTreeMap::new(),
            draining: Vec::new(),
            close_linger: DEFAULT_CLOSE_LINGER,
            next_id: 1,
            send_buffer_size,
            rx_buf: vec![0_u8; RX_CHUNK_SIZE],
        }
    }

    pub fn with_close_linger(mut self, linger: Duration) -> Self {
        self.close_linger = linger;
        self
    }

    pub fn local_port(&self) -> Result<u16, NetError> {
        let listener = self.listener.as_ref().ok_or(NetError::NotListening)?;
        Ok(listener.local_addr()?.port())
    }

    pub fn open_connections(&self) -> usize {
        self.conns.len()
    }

    pub fn is_draining(&self) -> bool {
        !self.draining.is_empty()
    }

    fn accept_pending<H: TcpHandler<Self>>(&mut self, handler: &mut H) {
        loop {
            let accepted = match self.listener.as_ref() {
                Some(listener) => listener.accept(),
                None => return,
            };

            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return,
                Err(err) => {
                    warn!("accept failed: {err}");
                    return;
                }
            };

            if let Err(err) = stream.set_nonblocking(true) {
                warn!("dropping {peer}: cannot make socket non-blocking: {err}");
                continue;
            }
            let _ = stream.set_nodelay(true);

            let id = ConnId(self.next_id);
            self.next_id = self.next_id.wrapping_add(1).max(1);
            self.conns.insert(
                id,
                Conn {
                    stream,
                    peer,
                    outbox: Vec::with_capacity(self.send_buffer_size),
                    flushed_unreported: 0,
                },
            );

            match handler.on_accept(self, id) {
                AcceptVerdict::Adopted => info!("client {peer} connected as {id}"),
                AcceptVerdict::Rejected => {
                    if self.conns.contains_key(&id) {
                        self.abort(id);
                    }
                }
            }
        }
    }

    fn drain_closed(&mut self) {
        let now = Instant::now();
        self.draining.retain_mut(|entry| {
            let conn = &mut entry.conn;
            if now >= entry.deadline {
                warn!(
                    "dropping closed connection to {} with {} bytes unsent",
                    conn.peer,
                    conn.outbox.len()
                );
                let _ = conn.stream.shutdown(Shutdown::Both);
                return false;
            }

            match conn.flush() {
                Ok(_) if conn.outbox.is_empty() => {
                    let _ = conn.stream.shutdown(Shutdown::Write);
                    false
                }
                Ok(_) => true,
                Err(err) => {
                    debug!("dropping closed connection to {}: {err}", conn.peer);
                    false
                }
            }
        });
    }

    fn service<H: TcpHandler<Self>>(&mut self, handler: &mut H, id: ConnId) {
        let flushed = match self.conns.get_mut(&id) {
            Some(conn) => conn.flush().map(|_| std::mem::take(&mut conn.flushed_unreported)),
            None => return,
        };
        match flushed {
            Ok(0) => {}
            Ok(len) => handler.on_sent(self, id, len),
            Err(err) => {
                self.conns.remove(&id);
                handler.on_error(id, err);
                return;
            }
        }

        let read = match self.conns.get_mut(&id) {
            Some(conn) => conn.stream.read(&mut self.rx_buf),
            None => return,
        };
        match read {
            Ok(0) => handler.on_receive(self, id, None),
            Ok(n) => {
                let buf = std::mem::take(&mut self.rx_buf);
                handler.on_receive(self, id, Some(&buf[..n]));
                self.rx_buf = buf;
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {}
            Err(err) => {
                self.conns.remove(&id);
                handler.on_error(id, err.into());
            }
        }
    }

    fn conn_mut(&mut self, id: ConnId) -> Result<&mut Conn, NetError> {
        self.conns.get_mut(&id).ok_or(NetError::UnknownConnection(id))
    }
}

impl TcpStack for SocketStack {
    fn listen(&mut self, port: u16) -> Result<(), NetError> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .map_err(|source| NetError::Bind { port, source })?;
        listener.set_nonblocking(true)?;
        self.listener = Some(listener);
        Ok(())
    }

    fn send_window(&self, conn: ConnId) -> usize {
        self.conns
            .get(&conn)
            .map(|c| self.send_buffer_size.saturating_sub(c.outbox.len()))
            .unwrap_or(0)
    }

    fn write(&mut self, conn: ConnId, data: &[u8]) -> Result<(), NetError> {
        let available = self.send_window(conn);
        let entry = self.conn_mut(conn)?;
        if data.len() > available {
            return Err(NetError::WindowExceeded {
                requested: data.len(),
                available,
            });
        }
        entry.outbox.extend_from_slice(data);
        Ok(())
    }

    fn output(&mut self, conn: ConnId) -> Result<(), NetError> {
        self.conn_mut(conn)?.flush().map(|_| ())
    }

    fn recved(&mut self, _conn: ConnId, _len: usize) {
        // The kernel reopens the receive window as soon as read() returns.
    }

    fn close(&mut self, conn: ConnId) -> Result<(), NetError> {
        let mut entry = self
            .conns
            .remove(&conn)
            .ok_or(NetError::UnknownConnection(conn))?;
        debug!("closing {conn} ({})", entry.peer);

        entry.flush()?;
        if entry.outbox.is_empty() {
            let _ = entry.stream.shutdown(Shutdown::Write);
        } else {
            self.draining.push(Draining {
                conn: entry,
                deadline: Instant::now() + self.close_linger,
            });
        }
        Ok(())
    }

    fn abort(&mut self, conn: ConnId) {
        if let Some(entry) = self.conns.remove(&conn) {
            debug!("aborting {conn} ({})", entry.peer);
            let _ = entry.stream.shutdown(Shutdown::Both);
        }
    }

    fn poll<H: TcpHandler<Self>>(&mut self, handler: &mut H) {
        self.accept_pending(handler);
        self.drain_closed();

        let ids: Vec<ConnId> = self.conns.keys().copied().collect();
        for id in ids {
            self.service(handler, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        net::TcpStream,
        thread,
        time::Duration,
    };

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        board::Board,
        config::MonitorConfig,
        event_loop::EventLoop,
        render::PageTemplate,
        responder::{Phase, Responder},
        sampler::TemperatureSampler,
        store::{SharedStore, EMPTY_LOG_SENTINEL},
    };

    #[derive(Debug, Default)]
    struct BenchBoard;

    impl Board for BenchBoard {
        fn button_level(&mut self) -> bool {
            true
        }

        fn set_indicator(&mut self, _on: bool) {}

        fn temperature_raw(&mut self) -> u16 {
            876
        }

        fn now_ms(&self) -> u64 {
            0
        }
    }

    fn serving(send_buffer_size: usize) -> (SocketStack, Responder, SharedStore, u16) {
        let store = SharedStore::new(2_048);
        let mut stack = SocketStack::new(send_buffer_size);
        let mut responder = Responder::new(store.clone(), PageTemplate::new(2), 3_072);
        responder.listen(&mut stack, 0).unwrap();
        let port = stack.local_port().unwrap();
        (stack, responder, store, port)
    }

    fn client(port: u16) -> TcpStream {
        let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    fn pump_until(
        stack: &mut SocketStack,
        responder: &mut Responder,
        mut done: impl FnMut(&SocketStack, &Responder) -> bool,
    ) {
        for _ in 0..5_000 {
            stack.poll(responder);
            if done(stack, responder) {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("condition not reached; responder in {:?}", responder.phase());
    }

    #[test]
    fn serves_a_get_in_small_chunks_over_loopback() {
        let (mut stack, mut responder, store, port) = serving(128);
        store.set_temperature(31.5);
        store.append_event("Button pressed at second 3.<br>");

        let mut conn = client(port);
        conn.write_all(b"GET / HTTP/1.1\r\nHost: device\r\n\r\n").unwrap();

        pump_until(&mut stack, &mut responder, |stack, responder| {
            responder.responses_completed() == 1 && !stack.is_draining()
        });

        let mut body = String::new();
        conn.read_to_string(&mut body).unwrap();

        assert_eq!(body.len(), responder.response_len());
        assert!(body.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(body.contains("Current temperature: 31.50 &deg;C"));
        assert!(body.contains("Button pressed at second 3.<br>"));
        assert!(body.ends_with("</html>"));
        assert_eq!(responder.phase(), Phase::Listening);
        assert_eq!(stack.open_connections(), 0);
    }

    #[test]
    fn concurrent_client_is_aborted_while_first_is_kept() {
        let (mut stack, mut responder, _store, port) = serving(2_920);

        let mut first = client(port);
        pump_until(&mut stack, &mut responder, |_, responder| {
            responder.active_connection().is_some()
        });
        let first_id = responder.active_connection().unwrap();

        let mut second = client(port);
        pump_until(&mut stack, &mut responder, |stack, _| stack.next_id > 2);

        let mut scratch = [0_u8; 16];
        let rejected = second.read(&mut scratch);
        assert!(matches!(rejected, Ok(0) | Err(_)));
        assert_eq!(responder.active_connection(), Some(first_id));
        assert_eq!(stack.open_connections(), 1);

        first.write_all(b"GET /").unwrap();
        pump_until(&mut stack, &mut responder, |_, responder| {
            responder.responses_completed() == 1
        });
        let mut body = Vec::new();
        first.read_to_end(&mut body).unwrap();
        assert!(body.starts_with(b"HTTP/1.1 200 OK"));
    }

    #[test]
    fn peer_hangup_returns_to_listening() {
        let (mut stack, mut responder, _store, port) = serving(2_920);

        let conn = client(port);
        pump_until(&mut stack, &mut responder, |_, responder| {
            responder.phase() == Phase::AwaitingRequest
        });
        drop(conn);

        pump_until(&mut stack, &mut responder, |stack, responder| {
            responder.phase() == Phase::Listening && stack.open_connections() == 0
        });
        assert_eq!(responder.responses_completed(), 0);
    }

    #[test]
    fn bind_failure_is_reported() {
        let (stack, _responder, _store, port) = serving(2_920);
        let mut other = SocketStack::new(2_920);

        let err = other.listen(port).unwrap_err();

        assert!(matches!(err, NetError::Bind { port: p, .. } if p == port));
        drop(stack);
    }

    #[test]
    fn write_beyond_window_is_refused() {
        let (mut stack, mut responder, _store, port) = serving(16);
        let _conn = client(port);
        pump_until(&mut stack, &mut responder, |_, responder| {
            responder.active_connection().is_some()
        });
        let id = responder.active_connection().unwrap();

        let err = stack.write(id, &[0_u8; 17]).unwrap_err();

        assert!(matches!(
            err,
            NetError::WindowExceeded {
                requested: 17,
                available: 16
            }
        ));
        assert!(matches!(
            stack.write(ConnId(999), b"x"),
            Err(NetError::UnknownConnection(ConnId(999)))
        ));
    }

    #[test]
    fn event_loop_serves_the_status_page_over_loopback() {
        let config = MonitorConfig {
            http_port: 0,
            send_buffer_size: 256,
            ..MonitorConfig::default()
        };
        let mut event_loop = EventLoop::start(
            &config,
            BenchBoard,
            SocketStack::new(config.send_buffer_size),
            SharedStore::new(config.event_log_capacity),
        )
        .unwrap();
        event_loop.run_once();
        let port = event_loop.stack_mut().local_port().unwrap();

        let mut conn = client(port);
        conn.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        for _ in 0..5_000 {
            event_loop.run_once();
            if event_loop.responder().responses_completed() == 1
                && !event_loop.stack_mut().is_draining()
            {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }

        let mut body = String::new();
        conn.read_to_string(&mut body).unwrap();

        let celsius = TemperatureSampler::new(config.calibration).convert(876);
        assert!(body.contains(&format!("Current temperature: {celsius:.2} &deg;C")));
        assert!(body.contains("Button status: Button released."));
        assert!(body.contains(EMPTY_LOG_SENTINEL));
    }

    #[test]
    fn unbound_stack_has_no_port() {
        let stack = SocketStack::new(2_920);
        assert!(matches!(stack.local_port(), Err(NetError::NotListening)));
    }

    #[test]
    fn closed_connection_is_dropped_after_linger_expires() {
        let mut stack = SocketStack::new(64).with_close_linger(Duration::ZERO);
        stack.listen(0).unwrap();
        let mut peer = client(stack.local_port().unwrap());
        let (stream, addr) = loop {
            match stack.listener.as_ref().unwrap().accept() {
                Ok(pair) => break pair,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(1))
                }
                Err(err) => panic!("accept failed: {err}"),
            }
        };
        stack.draining.push(Draining {
            conn: Conn {
                stream,
                peer: addr,
                outbox: b"never delivered".to_vec(),
                flushed_unreported: 0,
            },
            deadline: Instant::now(),
        });
        assert!(stack.is_draining());

        stack.drain_closed();

        assert!(!stack.is_draining());
        let mut body = Vec::new();
        let _ = peer.read_to_end(&mut body);
        assert!(body.is_empty());
    }
}
