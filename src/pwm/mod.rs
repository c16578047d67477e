//! PWM Bus Driver — talks to a 16-channel PWM expander over a serial bus.
//! Single-owner, serialized under a mutex shared by every `Servo` on the
//! same bus (spec.md §4.1).

use crate::error::BusError;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const CHANNEL_COUNT: u8 = 16;

/// Wire command sent to the expander firmware. The expander protocol
/// itself is not specified by spec.md ("framing defined by the detector
/// firmware" is stated only for vision) — this is a small, explicit
/// line protocol: `"S <channel> <on_ticks> <off_ticks>\n"` and
/// `"F <hz>\n"`, ack'd with a single `"OK\n"` line.
fn encode_set_pwm(channel: u8, on_ticks: u16, off_ticks: u16) -> Vec<u8> {
    format!("S {channel} {on_ticks} {off_ticks}\n").into_bytes()
}

fn encode_set_freq(hz: u32) -> Vec<u8> {
    format!("F {hz}\n").into_bytes()
}

/// Abstraction over the physical transport so tests can substitute an
/// in-memory double without a real serial port attached.
pub trait PwmTransport: Send {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()>;
    fn read_ack(&mut self) -> std::io::Result<()>;
}

pub struct SerialPwmTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialPwmTransport {
    pub fn open(path: &str, baud: u32) -> Result<Self, BusError> {
        let port = serialport::new(path, baud)
            .timeout(Duration::from_millis(200))
            .open()?;
        Ok(Self { port })
    }
}

impl PwmTransport for SerialPwmTransport {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.port.write_all(buf)
    }

    fn read_ack(&mut self) -> std::io::Result<()> {
        let mut buf = [0u8; 3];
        self.port.read_exact(&mut buf)
    }
}

/// Loopback double used by tests and by callers without hardware attached.
#[derive(Default)]
pub struct MockPwmTransport {
    pub writes: Vec<Vec<u8>>,
    pub fail_next: bool,
}

impl PwmTransport for MockPwmTransport {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        if self.fail_next {
            self.fail_next = false;
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "forced failure"));
        }
        self.writes.push(buf.to_vec());
        Ok(())
    }

    fn read_ack(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// The single-owner PWM bus. Cloned handles share the same mutex, so
/// writes from different Servos on the same bus are totally ordered.
#[derive(Clone)]
pub struct PwmBus {
    inner: Arc<Mutex<Box<dyn PwmTransport>>>,
    carrier_hz: Arc<Mutex<u32>>,
}

impl PwmBus {
    pub fn new(transport: Box<dyn PwmTransport>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(transport)),
            carrier_hz: Arc::new(Mutex::new(50)),
        }
    }

    pub fn set_freq(&self, hz: u32) -> Result<(), BusError> {
        self.write_retrying(&encode_set_freq(hz), 0)?;
        *self.carrier_hz.lock() = hz;
        Ok(())
    }

    /// Atomic per-channel write: `on_ticks`/`off_ticks` are the PCA9685-style
    /// 12-bit on/off counter pair within one PWM period.
    pub fn set_pwm(&self, channel: u8, on_ticks: u16, off_ticks: u16) -> Result<(), BusError> {
        self.write_retrying(&encode_set_pwm(channel, on_ticks, off_ticks), channel)
    }

    /// Convenience: express the write as a pulse width in microseconds at a
    /// given carrier frequency (spec.md §4.1).
    pub fn set_pulse_us(&self, channel: u8, pulse_us: f32, freq_hz: u32) -> Result<(), BusError> {
        let period_us = 1_000_000.0 / freq_hz as f32;
        let off = ((pulse_us / period_us) * 4096.0).round().clamp(0.0, 4095.0) as u16;
        self.set_pwm(channel, 0, off)
    }

    /// Release a channel to a safe (zero) pulse.
    pub fn release(&self, channel: u8) -> Result<(), BusError> {
        self.write_retrying(&encode_set_pwm(channel, 0, 0), channel)
    }

    /// Local retry with exponential backoff, up to 3 attempts, before
    /// surfacing the error (spec.md §7).
    fn write_retrying(&self, payload: &[u8], channel: u8) -> Result<(), BusError> {
        let mut attempt = 0u32;
        loop {
            let mut guard = self.inner.lock();
            let result = guard.write_all(payload).and_then(|_| guard.read_ack());
            drop(guard);
            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    attempt += 1;
                    if attempt >= 3 {
                        warn!(channel, attempts = attempt, "pwm bus write failed permanently");
                        return Err(BusError::Io { channel, source: e });
                    }
                    let backoff = Duration::from_millis(5u64 << attempt);
                    debug!(channel, attempt, ?backoff, "pwm bus write failed, retrying");
                    std::thread::sleep(backoff);
                }
            }
        }
    }
}
