//! Admission control for kernel requests
//!
//! Every kernel callback enters the gate before touching the store and leaves
//! it when the reply has been sent. Unmount closes the gate, then waits for the
//! in-flight count to reach zero before tearing the session down, so no reply
//! is ever written to a session that is already gone.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct GateState {
    accepting: bool,
    in_flight: usize,
}

#[derive(Debug)]
pub struct SessionGate {
    state: Mutex<GateState>,
    idle: Condvar,
}

impl SessionGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(GateState {
                accepting: true,
                in_flight: 0,
            }),
            idle: Condvar::new(),
        })
    }

    /// Admit one request, or `None` once the gate is closed
    pub fn enter(self: &Arc<Self>) -> Option<CallGuard> {
        let mut state = self.state.lock();
        if !state.accepting {
            return None;
        }
        state.in_flight += 1;
        Some(CallGuard { gate: self.clone() })
    }

    /// Stop admitting new requests; requests already admitted keep running
    pub fn close(&self) {
        self.state.lock().accepting = false;
    }

    pub fn is_accepting(&self) -> bool {
        self.state.lock().accepting
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Block until no request is in flight
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.in_flight > 0 {
            if self.idle.wait_until(&mut state, deadline).timed_out() {
                return state.in_flight == 0;
            }
        }
        true
    }

    fn leave(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            self.idle.notify_all();
        }
    }
}

/// Held for the duration of one kernel request
#[derive(Debug)]
pub struct CallGuard {
    gate: Arc<SessionGate>,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.gate.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_enter_and_leave() {
        let gate = SessionGate::new();
        let first = gate.enter().unwrap();
        let second = gate.enter().unwrap();
        assert_eq!(gate.in_flight(), 2);

        drop(first);
        drop(second);
        assert_eq!(gate.in_flight(), 0);
    }

    #[test]
    fn test_closed_gate_refuses() {
        let gate = SessionGate::new();
        let admitted = gate.enter().unwrap();
        gate.close();

        assert!(!gate.is_accepting());
        assert!(gate.enter().is_none());
        // Already admitted requests are unaffected
        assert_eq!(gate.in_flight(), 1);
        drop(admitted);
        assert_eq!(gate.in_flight(), 0);
    }

    #[test]
    fn test_wait_idle_waits_for_in_flight() {
        let gate = SessionGate::new();
        let guard = gate.enter().unwrap();
        gate.close();

        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            drop(guard);
        });

        let start = Instant::now();
        assert!(gate.wait_idle(Duration::from_secs(5)));
        assert!(start.elapsed() >= Duration::from_millis(40));
        releaser.join().unwrap();
    }

    #[test]
    fn test_wait_idle_times_out() {
        let gate = SessionGate::new();
        let _stuck = gate.enter().unwrap();
        assert!(!gate.wait_idle(Duration::from_millis(20)));
    }

    #[test]
    fn test_wait_idle_when_already_idle() {
        let gate = SessionGate::new();
        assert!(gate.wait_idle(Duration::ZERO));
    }
}
