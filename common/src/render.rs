use core::fmt::{self, Write as _};

use crate::store::MonitorState;

const PAGE_STYLE: &str = "body{font-family:Arial,sans-serif;text-align:center;margin-top:50px;background-color:#f0f0f0;}\
h1{color:#333;}\
.info-box{background-color:white;border-radius:10px;padding:20px;margin:20px auto;max-width:600px;box-shadow:0 4px 8px rgba(0,0,0,0.1);text-align:left;}\
.status{font-size:20px;margin:10px 0;}.temperature{color:#d9534f;}\
.log-title{font-weight:bold;margin-top:20px;}\
.log-area{background-color:#e9e9e9;border-left:4px solid #5cb85c;padding:10px;margin-top:5px;height:200px;overflow-y:auto;font-family:monospace;}";

/// Fixed-capacity response bytes. Writes past capacity are dropped.
#[derive(Debug)]
pub struct ResponseBuffer {
    bytes: Vec<u8>,
    capacity: usize,
}

impl ResponseBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.bytes.len() >= self.capacity
    }

    #[cfg(test)]
    pub(crate) fn fill(&mut self, len: usize) {
        self.bytes.clear();
        self.bytes.resize(len.min(self.capacity), b'x');
    }
}

impl fmt::Write for ResponseBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.capacity - self.bytes.len();
        let take = s.len().min(room);
        self.bytes.extend_from_slice(&s.as_bytes()[..take]);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PageTemplate {
    pub title: &'static str,
    pub heading: &'static str,
    pub refresh_secs: u32,
}

impl PageTemplate {
    pub fn new(refresh_secs: u32) -> Self {
        Self {
            title: "Status Board",
            heading: "Device Status Monitor",
            refresh_secs,
        }
    }

    /// Renders the full HTTP response (status line, headers, HTML) for `state`.
    pub fn render(&self, state: &MonitorState, out: &mut ResponseBuffer) {
        out.clear();
        // ResponseBuffer never fails a write, it truncates.
        let _ = self.write_response(state, out);
    }

    fn write_response(&self, state: &MonitorState, out: &mut ResponseBuffer) -> fmt::Result {
        out.write_str(
            "HTTP/1.1 200 OK\r\n\
             Content-Type: text/html\r\n\
             Connection: close\r\n\
             Cache-Control: no-cache\r\n\r\n",
        )?;
        write!(
            out,
            "<!DOCTYPE html><html><head><title>{title}</title><style>{PAGE_STYLE}</style>\
             <meta http-equiv=\"refresh\" content=\"{refresh}\"></head>\
             <body><h1>{heading}</h1><div class=\"info-box\">\
             <p class=\"status temperature\">Current temperature: {temp:.2} &deg;C</p>\
             <p class=\"status\">Button status: {status}</p>\
             <p class=\"log-title\">Button event log:</p>\
             <div class=\"log-area\">{log}</div>\
             </div></body></html>",
            title = self.title,
            refresh = self.refresh_secs,
            heading = self.heading,
            temp = state.temperature_c(),
            status = state.status(),
            log = state.event_log().as_str(),
        )
    }
}
