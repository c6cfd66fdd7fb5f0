use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryEntry {
    pub epoch: usize,
    pub dev_f1: f64,
    pub test_f1: Option<f64>,
}

/// Dev F1 of every epoch that improved on the best so far, with the test F1
/// measured at that epoch.
#[derive(Debug, Clone, Default)]
pub struct F1History {
    entries: Vec<HistoryEntry>,
}

impl F1History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn best_dev(&self) -> Option<f64> {
        self.entries.last().map(|e| e.dev_f1)
    }

    pub fn best(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// Returns `true` when `dev_f1` beats every previous epoch.
    pub fn update_dev(&mut self, epoch: usize, dev_f1: f64) -> bool {
        if self.best_dev().is_some_and(|best| dev_f1 <= best) {
            return false;
        }
        self.entries.push(HistoryEntry {
            epoch,
            dev_f1,
            test_f1: None,
        });
        true
    }

    /// Attaches a test F1 to the latest improvement.
    pub fn record_test(&mut self, test_f1: f64) {
        if let Some(last) = self.entries.last_mut() {
            last.test_f1 = Some(test_f1);
        }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn show(&self) {
        info!("\tF1 HISTORY");
        for entry in &self.entries {
            info!("{}", entry);
        }
    }
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\t  EPOCH-{}  \tBEST DEV F:{:.2}", self.epoch, self.dev_f1 * 100.0)?;
        if let Some(test_f1) = self.test_f1 {
            write!(f, "\tBEST TEST F:{:.2}", test_f1 * 100.0)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_improvements_are_recorded() {
        let mut history = F1History::new();
        assert!(history.update_dev(1, 0.40));
        history.record_test(0.38);
        assert!(!history.update_dev(2, 0.40));
        assert!(!history.update_dev(3, 0.35));
        assert!(history.update_dev(4, 0.52));

        let epochs: Vec<usize> = history.entries().iter().map(|e| e.epoch).collect();
        assert_eq!(epochs, vec![1, 4]);
        assert_eq!(history.entries()[0].test_f1, Some(0.38));
        assert_eq!(history.best().and_then(|e| e.test_f1), None);
        assert_eq!(history.best_dev(), Some(0.52));
    }

    #[test]
    fn entries_display_as_percentages() {
        let mut history = F1History::new();
        history.update_dev(3, 0.4567);
        assert_eq!(history.entries()[0].to_string(), "\t  EPOCH-3  \tBEST DEV F:45.67");
        history.record_test(0.5);
        assert_eq!(
            history.entries()[0].to_string(),
            "\t  EPOCH-3  \tBEST DEV F:45.67\tBEST TEST F:50.00"
        );
    }

    #[test]
    fn record_test_without_dev_is_ignored() {
        let mut history = F1History::new();
        history.record_test(0.9);
        assert!(history.entries().is_empty());
    }
}
