use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free running counters for one task execution, updated from
/// whichever worker is currently processing a table and read by the CLI's
/// progress command without blocking the writer.
#[derive(Debug, Default)]
pub struct Metrics {
    total_rows: AtomicU64,
    processed_rows: AtomicU64,
    failed_rows: AtomicU64,
    bytes_written: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub total_rows: u64,
    pub processed_rows: u64,
    pub failed_rows: u64,
    pub bytes_written: u64,
}

impl Metrics {
    pub fn add_total(&self, n: u64) {
        self.total_rows.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_processed(&self, n: u64) {
        self.processed_rows.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_failed(&self, n: u64) {
        self.failed_rows.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, n: u64) {
        self.bytes_written.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_rows: self.total_rows.load(Ordering::Relaxed),
            processed_rows: self.processed_rows.load(Ordering::Relaxed),
            failed_rows: self.failed_rows.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    pub fn progress_percent(&self) -> f64 {
        if self.total_rows == 0 {
            return 0.0;
        }
        (self.processed_rows as f64 / self.total_rows as f64 * 100.0).min(100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_accumulated_counts() {
        let metrics = Metrics::default();
        metrics.add_total(100);
        metrics.add_processed(40);
        metrics.add_failed(2);
        let snap = metrics.snapshot();
        assert_eq!(snap.total_rows, 100);
        assert_eq!(snap.processed_rows, 40);
        assert_eq!(snap.progress_percent(), 40.0);
    }

    #[test]
    fn zero_total_rows_reports_zero_percent() {
        assert_eq!(MetricsSnapshot::default().progress_percent(), 0.0);
    }
}
