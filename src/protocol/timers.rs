//! Wall-clock timer helpers shared by the protocol engines.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;

pub fn has_expired(since: DateTime<Utc>, now: DateTime<Utc>, timeout: Duration) -> bool {
    now.signed_duration_since(since) > timeout
}

/// Fires at most once per `interval`, independently of how often it is polled.
#[derive(Debug, Clone)]
pub struct PeriodicTimer {
    interval: Duration,
    last_fired: Option<DateTime<Utc>>,
}

impl PeriodicTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn last_fired(&self) -> Option<DateTime<Utc>> {
        self.last_fired
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_fired {
            Some(last) => now.signed_duration_since(last) >= self.interval,
            None => true,
        }
    }

    /// Returns true and re-arms the timer if it was due.
    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_due(now) {
            self.last_fired = Some(now);
            true
        } else {
            false
        }
    }
}

/// An entry subject to two-stage aging: it becomes invalid once it has not
/// been refreshed for a while, then is flushed after sitting invalid.
pub trait Ageable {
    fn last_refreshed(&self) -> DateTime<Utc>;

    /// `Some(t)` once the entry was invalidated at `t`.
    fn invalid_since(&self) -> Option<DateTime<Utc>>;

    fn invalidate(&mut self, now: DateTime<Utc>);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgingReport<K> {
    pub invalidated: Vec<K>,
    pub flushed: Vec<K>,
}

impl<K> AgingReport<K> {
    pub fn is_empty(&self) -> bool {
        self.invalidated.is_empty() && self.flushed.is_empty()
    }
}

/// One aging pass over `table`. Entries are collected first and changed
/// afterwards so the table is never mutated while it is being iterated.
pub fn age_table<K, V>(
    table: &mut HashMap<K, V>,
    now: DateTime<Utc>,
    invalid_after: Duration,
    flush_after_invalid: Duration,
) -> AgingReport<K>
where
    K: Clone + Eq + Hash,
    V: Ageable,
{
    let mut invalidated = Vec::new();
    let mut flushed = Vec::new();

    for (key, entry) in table.iter() {
        match entry.invalid_since() {
            None if has_expired(entry.last_refreshed(), now, invalid_after) => {
                invalidated.push(key.clone());
            }
            Some(since) if has_expired(since, now, flush_after_invalid) => {
                flushed.push(key.clone());
            }
            _ => {}
        }
    }

    for key in &invalidated {
        if let Some(entry) = table.get_mut(key) {
            entry.invalidate(now);
        }
    }
    for key in &flushed {
        table.remove(key);
    }

    AgingReport {
        invalidated,
        flushed,
    }
}
