//! Timer wheel backing autofire/turbo/macro scheduling (spec.md §4.H;
//! supplemented from the original `IO::SetTimer`, narrowed here to the
//! Map Manager's internal use rather than a general scripting built-in).
//!
//! One ticker thread scans a small set of active, interval-keyed timers
//! and fires any that are due, mirroring the Conditional Layer's
//! background-thread shape.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::debug;

const TICK_MS: u64 = 10;

type TimerCallback = Arc<dyn Fn() + Send + Sync>;

struct Timer {
    interval: Duration,
    next_fire: Instant,
    callback: TimerCallback,
}

#[derive(Default)]
struct Timers {
    by_id: HashMap<u64, Timer>,
}

pub struct TimerWheel {
    timers: Arc<Mutex<Timers>>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
    next_id: Mutex<u64>,
}

impl Default for TimerWheel {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerWheel {
    pub fn new() -> Self {
        TimerWheel {
            timers: Arc::new(Mutex::new(Timers::default())),
            running: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
            next_id: Mutex::new(1),
        }
    }

    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let timers = Arc::clone(&self.timers);
        let running = Arc::clone(&self.running);
        let handle = std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(TICK_MS));
                let now = Instant::now();
                let mut due: Vec<TimerCallback> = Vec::new();
                {
                    let mut guard = timers.lock().unwrap();
                    for timer in guard.by_id.values_mut() {
                        if now >= timer.next_fire {
                            timer.next_fire = now + timer.interval;
                            due.push(Arc::clone(&timer.callback));
                        }
                    }
                }
                for callback in due {
                    callback();
                }
            }
        });
        *self.thread.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.timers.lock().unwrap().by_id.clear();
    }

    /// Register a repeating timer; returns its id for later cancellation.
    pub fn register(&self, interval_ms: u64, callback: TimerCallback) -> u64 {
        let mut next_id = self.next_id.lock().unwrap();
        let id = *next_id;
        *next_id += 1;
        drop(next_id);

        let interval = Duration::from_millis(interval_ms.max(1));
        self.timers.lock().unwrap().by_id.insert(
            id,
            Timer {
                interval,
                next_fire: Instant::now() + interval,
                callback,
            },
        );
        debug!(id, interval_ms, "timer registered");
        id
    }

    pub fn cancel(&self, id: u64) {
        self.timers.lock().unwrap().by_id.remove(&id);
    }

    pub fn is_active(&self, id: u64) -> bool {
        self.timers.lock().unwrap().by_id.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn fires_repeatedly_while_registered() {
        let wheel = Arc::new(TimerWheel::new());
        wheel.start();
        let count = Arc::new(AtomicU32::new(0));
        let count2 = Arc::clone(&count);
        let id = wheel.register(5, Arc::new(move || {
            count2.fetch_add(1, Ordering::SeqCst);
        }));
        std::thread::sleep(Duration::from_millis(60));
        wheel.cancel(id);
        let fired = count.load(Ordering::SeqCst);
        wheel.stop();
        assert!(fired >= 2, "expected several fires, got {fired}");
    }

    #[test]
    fn cancel_stops_further_fires() {
        let wheel = Arc::new(TimerWheel::new());
        wheel.start();
        let count = Arc::new(AtomicU32::new(0));
        let count2 = Arc::clone(&count);
        let id = wheel.register(5, Arc::new(move || {
            count2.fetch_add(1, Ordering::SeqCst);
        }));
        std::thread::sleep(Duration::from_millis(30));
        wheel.cancel(id);
        let after_cancel = count.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        wheel.stop();
        assert_eq!(count.load(Ordering::SeqCst), after_cancel);
    }
}
