//! Terminal collaborators: numbered module log and table change lines

use chrono::{DateTime, Local};
use loki_core::{Change, ChangeKind, LogSink, ModuleObserver};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Prints module log lines to stdout, numbered and timestamped
#[derive(Debug, Default)]
pub struct ConsoleLog {
    counter: AtomicU64,
}

impl ConsoleLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines printed so far
    pub fn count(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

/// `[   7] 14:02:11 ospf: message`
pub fn format_line(number: u64, time: DateTime<Local>, module: &str, message: &str) -> String {
    format!("[{:>4}] {} {}: {}", number, time.format("%H:%M:%S"), module, message)
}

impl LogSink for ConsoleLog {
    fn log(&self, message: &str, module: &str) {
        let number = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        println!("{}", format_line(number, Local::now(), module, message));
    }
}

/// Reports table changes as debug events
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleObserver;

fn report(table: &str, change: &Change) {
    let action = match change.kind {
        ChangeKind::Added => "added",
        ChangeKind::Updated => "updated",
        ChangeKind::Removed => "removed",
    };
    debug!(module = change.module, table, key = %change.key, "{} {}", table, action);
}

impl ModuleObserver for ConsoleObserver {
    fn on_host_changed(&self, change: &Change) {
        report("host", change);
    }

    fn on_neighbor_changed(&self, change: &Change) {
        report("neighbor", change);
    }

    fn on_peer_changed(&self, change: &Change) {
        report("peer", change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_line_format() {
        let time = Local.with_ymd_and_hms(2024, 3, 1, 14, 2, 11).unwrap();
        assert_eq!(
            format_line(7, time, "ospf", "OSPF: Got new peer 10.0.0.5"),
            "[   7] 14:02:11 ospf: OSPF: Got new peer 10.0.0.5"
        );
    }

    #[test]
    fn test_lines_are_numbered() {
        let log = ConsoleLog::new();
        log.log("first", "arp");
        log.log("second", "arp");
        assert_eq!(log.count(), 2);
    }
}
