//! Append-only cost ledger.
//!
//! The ledger is the one piece of mutable state shared across concurrent
//! workers. Appends are serialized through a single mutex; entries are never
//! mutated after being written, and readers only ever see clones.

use crate::types::CostEntry;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Billing usage reported by a provider for one call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Usage {
    /// Billing units (tokens, credits)
    pub units: u64,
    /// Cost in USD
    pub usd_cost: f64,
}

/// The value of a successful call plus any reported billing usage.
#[derive(Debug)]
pub struct CallOutcome<T> {
    pub value: T,
    pub usage: Option<Usage>,
}

impl<T> CallOutcome<T> {
    /// A call with no reported billing usage (no ledger entry is written).
    pub fn unbilled(value: T) -> Self {
        Self { value, usage: None }
    }

    /// A call with reported billing usage.
    pub fn billed(value: T, units: u64, usd_cost: f64) -> Self {
        Self {
            value,
            usage: Some(Usage { units, usd_cost }),
        }
    }
}

/// Append-only ledger of billable calls for one run.
#[derive(Default)]
pub struct CostLedger {
    entries: Mutex<Vec<CostEntry>>,
}

impl CostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry. Called by the executor only.
    pub fn record(&self, provider: &str, operation: &str, usage: Usage) {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let entry = CostEntry {
            operation: operation.to_string(),
            provider: provider.to_string(),
            units: usage.units,
            usd_cost: usage.usd_cost,
            timestamp_ms,
        };
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }

    /// Snapshot of all entries recorded so far.
    pub fn entries(&self) -> Vec<CostEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Sum of all entry costs in USD.
    pub fn total_usd(&self) -> f64 {
        self.entries().iter().map(|e| e.usd_cost).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_ledger_records_entries() {
        let ledger = CostLedger::new();
        ledger.record("vision", "model-a", Usage { units: 500, usd_cost: 0.004 });
        ledger.record("search", "search", Usage { units: 1, usd_cost: 0.01 });

        let entries = ledger.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].provider, "vision");
        assert_eq!(entries[0].units, 500);
        assert!((ledger.total_usd() - 0.014).abs() < 1e-9);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_ledger_concurrent_appends() {
        let ledger = Arc::new(CostLedger::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.record("vision", "model-a", Usage { units: i, usd_cost: 0.001 });
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(ledger.entries().len(), 32);
        assert!((ledger.total_usd() - 0.032).abs() < 1e-9);
    }
}
