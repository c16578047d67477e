//! Short-lived thread loops for "listening/curious", "thinking", and
//! "talking/mouth" animations; each owns a disjoint set of servos for its
//! lifetime and hands them back on stop (spec.md §4.5). Animations never
//! call back into the dialogue controller — only into their own servos
//! (spec.md §9).

pub mod listening;
pub mod talking;
pub mod thinking;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Common stop-signal/join-handle pair every animation loop is wrapped in.
/// `T` is whatever the loop body owned and reverted to neutral before
/// returning — typically the servo(s) it was given exclusive use of.
pub struct AnimationHandle<T> {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<T>>,
}

impl<T: Send + 'static> AnimationHandle<T> {
    pub(crate) fn spawn<F>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(Arc<AtomicBool>) -> T + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();
        let handle = std::thread::Builder::new()
            .name(name.into())
            .spawn(move || body(stop_thread))
            .expect("failed to spawn animation thread");
        Self { stop, handle: Some(handle) }
    }

    /// Idempotent: calling stop twice returns `None` the second time.
    /// Returns the servo(s) the animation owned, reverted to neutral.
    pub fn stop(&mut self) -> Option<T> {
        self.stop.store(true, Ordering::SeqCst);
        self.handle.take().and_then(|h| h.join().ok())
    }
}

impl<T> Drop for AnimationHandle<T> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}
