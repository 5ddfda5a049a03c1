use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::dialogue::state::{Session, State};

#[derive(Debug)]
pub struct Slot {
    pub session: Session,
    touched: Instant,
}

impl Slot {
    fn new() -> Self {
        Self {
            session: Session::default(),
            touched: Instant::now(),
        }
    }

    fn expired(&self, ttl: Duration) -> bool {
        self.touched.elapsed() >= ttl
    }

    /// Drops an abandoned flow so its partial data never outlives the TTL.
    pub fn expire_if_stale(&mut self, ttl: Duration) -> bool {
        if self.session.state != State::Idle && self.expired(ttl) {
            debug!(state = ?self.session.state, "session expired");
            self.session = Session::default();
            return true;
        }
        false
    }

    pub fn touch(&mut self) {
        self.touched = Instant::now();
    }
}

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sessions keyed by external identity. Each identity gets its own lock, so
/// inputs from one identity apply one at a time while others proceed.
pub struct SessionRegistry {
    ttl: Duration,
    slots: Mutex<HashMap<String, Arc<Mutex<Slot>>>>,
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn slot(&self, external_id: &str) -> Arc<Mutex<Slot>> {
        relock(&self.slots)
            .entry(external_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Slot::new())))
            .clone()
    }

    pub fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
        relock(slot)
    }

    /// Removes sessions idle for longer than the TTL that nobody is using.
    pub fn sweep(&self) -> usize {
        let mut slots = relock(&self.slots);
        let before = slots.len();
        let ttl = self.ttl;
        slots.retain(|_, slot| Arc::strong_count(slot) > 1 || !relock(slot).expired(ttl));
        let removed = before - slots.len();
        if removed > 0 {
            info!(removed, remaining = slots.len(), "expired sessions swept");
        }
        removed
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        relock(&self.slots).len()
    }
}
