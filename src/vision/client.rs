//! Vision Client — request/response façade to an external camera-side
//! detector over a byte-oriented serial link (spec.md §4.6, §6). The
//! detector firmware defines its own framing; here we speak a small
//! newline-delimited JSON protocol (`invoke\n` request, one JSON array
//! line of detections back), which is a reasonable concrete choice for
//! an otherwise firmware-defined format.

use crate::error::VisionError;
use crate::vision::detection::Detection;
use parking_lot::Mutex;
use std::io::{BufRead, BufReader, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait VisionTransport: Send {
    fn invoke(&mut self, timeout: Duration) -> Result<Vec<Detection>, VisionError>;
}

pub struct SerialVisionTransport {
    writer: Box<dyn serialport::SerialPort>,
    reader: BufReader<Box<dyn serialport::SerialPort>>,
}

impl SerialVisionTransport {
    pub fn open(path: &str, baud: u32) -> Result<Self, VisionError> {
        let writer = serialport::new(path, baud).open()?;
        let reader_port = writer.try_clone()?;
        Ok(Self { writer, reader: BufReader::new(reader_port) })
    }
}

impl VisionTransport for SerialVisionTransport {
    fn invoke(&mut self, timeout: Duration) -> Result<Vec<Detection>, VisionError> {
        self.writer.set_timeout(timeout).ok();
        self.writer
            .write_all(b"invoke\n")
            .map_err(|e| VisionError::Protocol(e.to_string()))?;

        let deadline = Instant::now() + timeout;
        let mut line = String::new();
        loop {
            if Instant::now() > deadline {
                return Err(VisionError::Timeout(timeout));
            }
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return Err(VisionError::Protocol("eof".into())),
                Ok(_) => break,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    return Err(VisionError::Timeout(timeout))
                }
                Err(e) => return Err(VisionError::Protocol(e.to_string())),
            }
        }
        serde_json::from_str::<Vec<Detection>>(line.trim())
            .map_err(|e| VisionError::Protocol(e.to_string()))
    }
}

/// Test/offline double: returns a pre-seeded sequence of responses.
#[derive(Default)]
pub struct MockVisionTransport {
    pub responses: std::collections::VecDeque<Result<Vec<Detection>, VisionError>>,
}

impl VisionTransport for MockVisionTransport {
    fn invoke(&mut self, _timeout: Duration) -> Result<Vec<Detection>, VisionError> {
        self.responses.pop_front().unwrap_or(Ok(Vec::new()))
    }
}

/// The client serializes requests over the serial bus under a mutex —
/// only one `invoke_once` in flight at a time (spec.md §4.6).
#[derive(Clone)]
pub struct VisionClient {
    transport: Arc<Mutex<Box<dyn VisionTransport>>>,
}

impl VisionClient {
    pub fn new(transport: Box<dyn VisionTransport>) -> Self {
        Self { transport: Arc::new(Mutex::new(transport)) }
    }

    pub fn invoke_once(&self, timeout: Duration) -> Result<Vec<Detection>, VisionError> {
        self.transport.lock().invoke(timeout)
    }
}
