//! Shared helpers for integration tests.
#![allow(dead_code)]

use cachelease::{CacheId, Coordinator, CoordinatorError, Flag, Metadata, RequestOutcome};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Something the coordinator was asked to do, in call order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Register(String),
    ResizeStarted(u64),
    ResizeFinished(u64),
    Migrate(u32),
    Unregister,
}

/// A coordinator that accepts everything, records every call and can be
/// slowed down to widen race windows.
pub struct RecordingCoordinator {
    pub resize_delay: Duration,
    pub unregister_delay: Duration,
    pub cooldown: Duration,
    pub initial_log_size: u32,
    events: Mutex<Vec<Event>>,
    in_flight: AtomicUsize,
    overlapped: AtomicBool,
    next_id: AtomicU64,
}

impl RecordingCoordinator {
    pub fn new() -> Self {
        Self {
            resize_delay: Duration::ZERO,
            unregister_delay: Duration::ZERO,
            cooldown: Duration::ZERO,
            initial_log_size: 8,
            events: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            overlapped: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_resize_delay(mut self, delay: Duration) -> Self {
        self.resize_delay = delay;
        self
    }

    pub fn with_unregister_delay(mut self, delay: Duration) -> Self {
        self.unregister_delay = delay;
        self
    }

    pub fn unregister_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| **e == Event::Unregister)
            .count()
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn resize_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, Event::ResizeStarted(_)))
            .count()
    }

    pub fn migrations(&self) -> Vec<u32> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Migrate(log_size) => Some(*log_size),
                _ => None,
            })
            .collect()
    }

    /// Whether two resizes were ever in flight at the same time.
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }
}

impl Coordinator for RecordingCoordinator {
    fn register(&self, name: &str, requested_limit: u64) -> Result<Arc<Metadata>, CoordinatorError> {
        self.events.lock().push(Event::Register(name.to_string()));
        let id = CacheId(self.next_id.fetch_add(1, Ordering::Relaxed));
        Ok(Arc::new(Metadata::new(id, requested_limit, self.initial_log_size)))
    }

    fn unregister(&self, _metadata: &Arc<Metadata>) {
        thread::sleep(self.unregister_delay);
        self.events.lock().push(Event::Unregister);
    }

    fn request_resize(&self, metadata: &Arc<Metadata>, new_limit: u64) -> RequestOutcome {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        self.events.lock().push(Event::ResizeStarted(new_limit));
        metadata.lock().toggle_flag(Flag::Resizing);

        thread::sleep(self.resize_delay);
        {
            let mut state = metadata.lock();
            state.set_limits(new_limit, new_limit);
            state.toggle_flag(Flag::Resizing);
        }

        self.events.lock().push(Event::ResizeFinished(new_limit));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        RequestOutcome::accepted(Instant::now() + self.cooldown)
    }

    fn request_migrate(&self, metadata: &Arc<Metadata>, new_log_size: u32) -> RequestOutcome {
        self.events.lock().push(Event::Migrate(new_log_size));
        metadata.lock().set_log_size(new_log_size);
        RequestOutcome::accepted(Instant::now() + self.cooldown)
    }
}
