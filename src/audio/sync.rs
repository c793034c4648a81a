//! `SyncPoint`: lets the host park every secondary audio thread.
//!
//! The window/event side calls [`SyncPoint::halt_threads`] when the process is
//! suspended; stream workers and the ME watcher call
//! [`SyncPoint::pass_secondary_sync`] once per polling cycle and block there
//! until [`SyncPoint::resume_threads`].

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::common::flag::AtomicFlag;

#[derive(Default)]
pub struct SyncPoint {
    halted: Mutex<bool>,
    cvar: Condvar,
}

impl SyncPoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn halt_threads(&self) {
        let mut halted = self.halted.lock();
        if !*halted {
            debug!("halting secondary audio threads");
        }
        *halted = true;
    }

    pub fn resume_threads(&self) {
        let mut halted = self.halted.lock();
        if *halted {
            debug!("resuming secondary audio threads");
        }
        *halted = false;
        self.cvar.notify_all();
    }

    pub fn is_halted(&self) -> bool {
        *self.halted.lock()
    }

    /// Blocks the calling secondary thread while a halt is in effect.
    pub fn pass_secondary_sync(&self) {
        let mut halted = self.halted.lock();
        while *halted {
            self.cvar.wait(&mut halted);
        }
    }

    /// Like [`pass_secondary_sync`](Self::pass_secondary_sync), but also
    /// returns once `term_req` is set. The thread setting it must call
    /// [`wake`](Self::wake) afterwards.
    pub fn pass_secondary_sync_unless(&self, term_req: &AtomicFlag) {
        let mut halted = self.halted.lock();
        while *halted && !term_req.is_set() {
            self.cvar.wait(&mut halted);
        }
    }

    /// Wake parked threads so they re-check their termination flag. The
    /// halt stays in effect.
    pub fn wake(&self) {
        let _halted = self.halted.lock();
        self.cvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        thread,
        time::Duration,
    };

    #[test]
    fn pass_is_free_when_not_halted() {
        let sync = SyncPoint::new();
        sync.pass_secondary_sync();
        assert!(!sync.is_halted());
    }

    #[test]
    fn halted_thread_waits_for_resume() {
        let sync = Arc::new(SyncPoint::new());
        let passes = Arc::new(AtomicUsize::new(0));
        sync.halt_threads();

        let worker = {
            let sync = sync.clone();
            let passes = passes.clone();
            thread::spawn(move || {
                sync.pass_secondary_sync();
                passes.fetch_add(1, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(passes.load(Ordering::SeqCst), 0);

        sync.resume_threads();
        worker.join().unwrap();
        assert_eq!(passes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn termination_request_releases_a_parked_thread() {
        let sync = Arc::new(SyncPoint::new());
        let term = Arc::new(AtomicFlag::new());
        sync.halt_threads();

        let worker = {
            let sync = sync.clone();
            let term = term.clone();
            thread::spawn(move || sync.pass_secondary_sync_unless(&term))
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!worker.is_finished());

        term.set();
        sync.wake();
        worker.join().unwrap();
        assert!(sync.is_halted());
    }
}
