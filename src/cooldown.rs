use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Fixed-window per-user rate limit.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    last: HashMap<u64, DateTime<Utc>>,
}

impl CooldownTracker {
    /// Records the hit and returns `Ok(())`, or leaves state untouched and
    /// returns how long the user still has to wait.
    pub fn check(&mut self, user_id: u64, now: DateTime<Utc>, window: Duration) -> Result<(), Duration> {
        if let Some(last) = self.last.get(&user_id) {
            let ready_at = *last + window;
            if ready_at > now {
                return Err(ready_at - now);
            }
        }
        self.last.insert(user_id, now);
        Ok(())
    }

    /// Forgets entries whose window has passed.
    pub fn sweep(&mut self, now: DateTime<Utc>, window: Duration) {
        self.last.retain(|_, last| *last + window > now);
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}
