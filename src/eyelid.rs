//! Eyelid Controller — own thread; autonomous blinker with an
//! override-for-duration API used by listening animations (spec.md §4.4).

use crate::servo::Servo;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone, Copy)]
pub struct EyelidConfig {
    pub blink_min_s: f32,
    pub blink_max_s: f32,
    pub blink_close_s: f32,
    pub blink_hold_s: f32,
    pub blink_open_s: f32,
    pub open_angle: f32,
}

impl Default for EyelidConfig {
    fn default() -> Self {
        Self {
            blink_min_s: 2.0,
            blink_max_s: 6.0,
            blink_close_s: 0.08,
            blink_hold_s: 0.05,
            blink_open_s: 0.12,
            open_angle: 150.0,
        }
    }
}

enum Command {
    Override { angle: f32, duration: Duration },
    Closed,
    Sleep(f32),
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Auto,
    Hold(f32),
    Closed,
    Sleep(f32),
}

enum BlinkPhase {
    Waiting { until: Instant },
    Closing { until: Instant },
    Holding { until: Instant },
    Opening { until: Instant },
}

pub struct EyelidController {
    cmd_tx: Sender<Command>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EyelidController {
    pub fn start(mut servo: Servo, config: EyelidConfig) -> Self {
        let (cmd_tx, cmd_rx): (Sender<Command>, Receiver<Command>) = bounded(16);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();

        let handle = std::thread::Builder::new()
            .name("eyelid".into())
            .spawn(move || {
                info!("eyelid controller started");
                run(&mut servo, config, cmd_rx, stop_thread);
                let closed = closed_angle(&config);
                servo.set_target(closed);
                let mut t = Instant::now();
                for _ in 0..20 {
                    t += Duration::from_millis(20);
                    let _ = servo.update(t);
                    std::thread::sleep(Duration::from_millis(20));
                }
                let _ = servo.release();
                info!("eyelid controller terminal: closed");
            })
            .expect("failed to spawn eyelid thread");

        Self { cmd_tx, stop, handle: Some(handle) }
    }

    pub fn set_override(&self, angle: f32, duration: Duration) {
        let _ = self.cmd_tx.send(Command::Override { angle, duration });
    }

    pub fn set_closed(&self) {
        let _ = self.cmd_tx.send(Command::Closed);
    }

    pub fn set_sleep(&self, fraction: f32) {
        let _ = self.cmd_tx.send(Command::Sleep(fraction.clamp(0.0, 1.0)));
    }

    pub fn set_auto(&self) {
        let _ = self.cmd_tx.send(Command::Auto);
    }

    /// Stop the thread; terminal pose is always `closed` regardless of the
    /// mode active at shutdown time (spec.md §4.4).
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for EyelidController {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

fn closed_angle(config: &EyelidConfig) -> f32 {
    // spec.md §4.4 gives no explicit min/max here; the lid servo's own
    // config clamps it, so we only compute the nominal target.
    config.open_angle - 60.0
}

fn sample_blink_interval(config: &EyelidConfig) -> Duration {
    let secs = rand::thread_rng().gen_range(config.blink_min_s..=config.blink_max_s);
    Duration::from_secs_f32(secs)
}

fn run(servo: &mut Servo, config: EyelidConfig, cmd_rx: Receiver<Command>, stop: Arc<AtomicBool>) {
    let tick = Duration::from_millis(20);
    let mut mode = Mode::Auto;
    let mut override_until: Option<Instant> = None;
    let mut phase = BlinkPhase::Waiting { until: Instant::now() + sample_blink_interval(&config) };
    let mut now = Instant::now();

    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }

        match cmd_rx.recv_timeout(tick) {
            Ok(Command::Override { angle, duration }) => {
                mode = Mode::Hold(angle);
                override_until = Some(Instant::now() + duration);
            }
            Ok(Command::Closed) => {
                mode = Mode::Closed;
                override_until = None;
            }
            Ok(Command::Sleep(f)) => {
                mode = Mode::Sleep(f);
                override_until = None;
            }
            Ok(Command::Auto) => {
                mode = Mode::Auto;
                override_until = None;
                phase = BlinkPhase::Waiting { until: Instant::now() + sample_blink_interval(&config) };
            }
            Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {}
        }

        now = Instant::now();

        if let Some(until) = override_until {
            if now >= until {
                mode = Mode::Auto;
                override_until = None;
                phase = BlinkPhase::Waiting { until: now + sample_blink_interval(&config) };
            }
        }

        let target = match mode {
            Mode::Hold(angle) => angle,
            Mode::Closed => closed_angle(&config),
            Mode::Sleep(f) => config.open_angle + f * (closed_angle(&config) - config.open_angle),
            Mode::Auto => {
                phase = advance_blink_phase(phase, now, &config);
                blink_phase_target(&phase, &config)
            }
        };

        servo.set_target(target);
        let _ = servo.update(now);
    }
}

fn advance_blink_phase(phase: BlinkPhase, now: Instant, config: &EyelidConfig) -> BlinkPhase {
    match phase {
        BlinkPhase::Waiting { until } if now >= until => {
            BlinkPhase::Closing { until: now + Duration::from_secs_f32(config.blink_close_s) }
        }
        BlinkPhase::Closing { until } if now >= until => {
            BlinkPhase::Holding { until: now + Duration::from_secs_f32(config.blink_hold_s) }
        }
        BlinkPhase::Holding { until } if now >= until => {
            BlinkPhase::Opening { until: now + Duration::from_secs_f32(config.blink_open_s) }
        }
        BlinkPhase::Opening { until } if now >= until => {
            BlinkPhase::Waiting { until: now + sample_blink_interval(config) }
        }
        other => other,
    }
}

fn blink_phase_target(phase: &BlinkPhase, config: &EyelidConfig) -> f32 {
    match phase {
        BlinkPhase::Waiting { .. } | BlinkPhase::Opening { .. } => config.open_angle,
        BlinkPhase::Closing { .. } | BlinkPhase::Holding { .. } => closed_angle(config),
    }
}
