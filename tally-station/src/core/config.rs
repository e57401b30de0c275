use std::path::PathBuf;
use std::time::Duration;

use tally_printer::{DEFAULT_WIDTH, TextEncoding, TransportKind};

use crate::printing::{KitchenTicketRenderer, QueuePolicy, ReceiptRenderer};

/// Station configuration
///
/// # Environment
///
/// Every field can be overridden from the environment:
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | WORK_DIR | ./tally-data | working directory (queue db, logs) |
/// | QUEUE_DB_FILE | print_queue.redb | queue file under WORK_DIR |
/// | RESTAURANT_ID | default | restaurant attached to queued jobs |
/// | CURRENCY_SYMBOL | ₹ | symbol for replayed receipts stored without one |
/// | PAPER_WIDTH | 48 | characters per line |
/// | TEXT_ENCODING | utf8 | `utf8` or `gbk` |
/// | PRINTER_TRANSPORT | wired | `wired` or `wireless` |
/// | WRITE_TIMEOUT_MS | 0 | per-print write timeout, 0 disables it |
/// | QUEUE_MAX_PENDING | 500 | pending jobs per restaurant, 0 is unbounded |
/// | QUEUE_MAX_ATTEMPTS | 5 | replay attempts before a job is failed |
/// | LOG_LEVEL | info | log filter |
/// | LOG_DIR | unset | daily rolling log files when set |
///
/// # Example
///
/// ```ignore
/// WORK_DIR=/data/tally PRINTER_TRANSPORT=wireless cargo run -p tally-station
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub work_dir: String,
    pub queue_db_file: String,
    pub restaurant_id: String,
    pub currency_symbol: String,
    pub paper_width: usize,
    pub text_encoding: TextEncoding,
    /// Transport the replay binary connects
    pub printer_transport: TransportKind,
    pub write_timeout_ms: u64,
    pub queue_max_pending: usize,
    pub queue_max_attempts: u32,
    pub log_level: String,
    pub log_dir: Option<String>,
}

impl Config {
    /// Load from the environment, falling back to defaults for unset or
    /// unparsable values
    pub fn from_env() -> Self {
        let defaults = QueuePolicy::default();
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "./tally-data".into()),
            queue_db_file: std::env::var("QUEUE_DB_FILE")
                .unwrap_or_else(|_| "print_queue.redb".into()),
            restaurant_id: std::env::var("RESTAURANT_ID").unwrap_or_else(|_| "default".into()),
            currency_symbol: std::env::var("CURRENCY_SYMBOL").unwrap_or_else(|_| "₹".into()),
            paper_width: std::env::var("PAPER_WIDTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|w| *w > 0)
                .unwrap_or(DEFAULT_WIDTH),
            text_encoding: std::env::var("TEXT_ENCODING")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            printer_transport: std::env::var("PRINTER_TRANSPORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(TransportKind::Wired),
            write_timeout_ms: std::env::var("WRITE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            queue_max_pending: std::env::var("QUEUE_MAX_PENDING")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_pending),
            queue_max_attempts: std::env::var("QUEUE_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_attempts),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").ok().filter(|d| !d.is_empty()),
        }
    }

    pub fn queue_db_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join(&self.queue_db_file)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_ms > 0).then(|| Duration::from_millis(self.write_timeout_ms))
    }

    pub fn queue_policy(&self) -> QueuePolicy {
        QueuePolicy {
            max_pending: self.queue_max_pending,
            max_attempts: self.queue_max_attempts.max(1),
        }
    }

    pub fn receipt_renderer(&self) -> ReceiptRenderer {
        ReceiptRenderer::new(self.paper_width).with_encoding(self.text_encoding)
    }

    pub fn kitchen_renderer(&self) -> KitchenTicketRenderer {
        KitchenTicketRenderer::new(self.paper_width).with_encoding(self.text_encoding)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            work_dir: "/tmp/tally".into(),
            queue_db_file: "q.redb".into(),
            restaurant_id: "r-1".into(),
            currency_symbol: "₹".into(),
            paper_width: 48,
            text_encoding: TextEncoding::Utf8,
            printer_transport: TransportKind::Wired,
            write_timeout_ms: 0,
            queue_max_pending: 10,
            queue_max_attempts: 0,
            log_level: "info".into(),
            log_dir: None,
        }
    }

    #[test]
    fn test_derived_values() {
        let mut config = sample();
        assert_eq!(config.queue_db_path(), PathBuf::from("/tmp/tally/q.redb"));
        assert_eq!(config.write_timeout(), None);
        assert_eq!(
            config.queue_policy(),
            QueuePolicy {
                max_pending: 10,
                max_attempts: 1
            }
        );

        config.write_timeout_ms = 1500;
        assert_eq!(config.write_timeout(), Some(Duration::from_millis(1500)));
    }
}
