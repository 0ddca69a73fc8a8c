use gcs_proto::LogLevel;
use std::collections::VecDeque;
use time::OffsetDateTime;
use tracing::{error, info, warn};

pub const DEFAULT_CAPACITY: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorLogEntry {
    pub ts: OffsetDateTime,
    pub level: LogLevel,
    pub message: String,
}

/// Bounded history of operator-facing messages, oldest first. Every entry is
/// also mirrored to tracing.
#[derive(Debug)]
pub struct OperatorLog {
    entries: VecDeque<OperatorLogEntry>,
    capacity: usize,
    evicted: u64,
}

impl Default for OperatorLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl OperatorLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { entries: VecDeque::with_capacity(capacity), capacity, evicted: 0 }
    }

    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Error => error!(target: "operator", "{}", message),
            LogLevel::Warning => warn!(target: "operator", "{}", message),
            LogLevel::Info | LogLevel::Normal => info!(target: "operator", "{}", message),
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.evicted = self.evicted.saturating_add(1);
        }
        self.entries.push_back(OperatorLogEntry { ts: OffsetDateTime::now_utc(), level, message });
    }

    pub fn entries(&self) -> impl Iterator<Item = &OperatorLogEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&OperatorLogEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries pushed out by newer ones since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_newest_in_order() {
        let mut log = OperatorLog::new(3);
        for i in 0..5 {
            log.push(LogLevel::Info, format!("m{}", i));
        }
        let msgs: Vec<&str> = log.entries().map(|e| e.message.as_str()).collect();
        assert_eq!(msgs, vec!["m2", "m3", "m4"]);
        assert_eq!(log.evicted(), 2);
        assert_eq!(log.latest().unwrap().message, "m4");
    }

    #[test]
    fn keeps_level() {
        let mut log = OperatorLog::default();
        assert!(log.is_empty());
        log.push(LogLevel::Error, "Drone connection error");
        assert_eq!(log.len(), 1);
        assert_eq!(log.latest().unwrap().level, LogLevel::Error);
    }
}
