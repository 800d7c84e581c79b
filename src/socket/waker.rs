use alloc::vec::Vec;
use core::task::Waker;

/// Utility struct to register and wake the tasks waiting on a session.
#[derive(Debug)]
pub struct WakerRegistration {
    wakers: Vec<Waker>,
}

impl Drop for WakerRegistration {
    fn drop(&mut self) {
        self.wake_all()
    }
}

impl WakerRegistration {
    pub const fn new() -> Self {
        Self { wakers: Vec::new() }
    }

    /// Register a waker, replacing every previously registered one.
    pub fn register(&mut self, w: &Waker) {
        match &self.wakers[..] {
            // Keep the old waker if it wakes the same task, skipping the clone.
            [w2] if w2.will_wake(w) => {}
            _ => {
                self.wakers.clear();
                self.wakers.push(w.clone());
            }
        }
    }

    /// Register an additional waker.
    pub fn add(&mut self, w: &Waker) {
        if !self.wakers.iter().any(|w2| w2.will_wake(w)) {
            self.wakers.push(w.clone());
        }
    }

    /// Wake all registered wakers, if any.
    pub fn wake_all(&mut self) {
        for w in self.wakers.drain(..) {
            w.wake();
        }
    }

    /// Forget every registered waker without waking it.
    pub fn clear(&mut self) {
        self.wakers.clear();
    }
}
