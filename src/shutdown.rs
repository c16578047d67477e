//! Process control — SIGINT/SIGTERM trigger graceful shutdown: stop every
//! worker thread with a bounded timeout, then drive all servos to their
//! calibrated stop angles, close lids, and release the PWM channels
//! (spec.md §6, §5 "Cancellation").

use crate::servo::ServoRegistry;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const PER_THREAD_TIMEOUT: Duration = Duration::from_millis(800);
const RELEASE_SETTLE: Duration = Duration::from_millis(800);

/// Blocks until SIGINT or SIGTERM arrives, then returns the signal number.
pub fn wait_for_signal() -> Result<i32, std::io::Error> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let sig = signals.forever().next().expect("signal iterator never ends on its own");
    info!(signal = sig, "shutdown signal received");
    Ok(sig)
}

/// Runs `f` to completion on a dedicated thread, waiting up to
/// `PER_THREAD_TIMEOUT`. If `f` hasn't returned in time, logs a warning and
/// moves on rather than blocking shutdown indefinitely — the thread is left
/// to finish on its own.
pub fn stop_with_timeout(name: &'static str, f: impl FnOnce() + Send + 'static) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    std::thread::spawn(move || {
        f();
        let _ = tx.send(());
    });
    if rx.recv_timeout(PER_THREAD_TIMEOUT).is_err() {
        warn!(thread = name, "did not stop within timeout, continuing shutdown");
    }
}

/// Drives every registered servo to its calibrated stop angle, waits for
/// convergence (bounded), closes the given lid servo's pose already being
/// handled by the eyelid controller's own shutdown, and releases every
/// channel.
pub fn park_and_release(registry: &mut ServoRegistry, stop_angles: &std::collections::HashMap<&'static str, f32>) {
    for servo in registry.iter_mut() {
        if let Some(&angle) = stop_angles.get(servo.name()) {
            servo.set_target(angle);
        }
    }

    let deadline = Instant::now() + RELEASE_SETTLE;
    while Instant::now() < deadline {
        let now = Instant::now();
        for servo in registry.iter_mut() {
            let _ = servo.update(now);
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    for servo in registry.iter_mut() {
        if let Err(e) = servo.release() {
            warn!(servo = servo.name(), error = %e, "failed to release servo on shutdown");
        }
    }
    info!("all servos parked and released");
}
