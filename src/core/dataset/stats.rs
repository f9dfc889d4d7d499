use serde::{Deserialize, Serialize};

use super::DatasetSplit;

/// Per-class counts across every stage of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassStatistics {
    /// Image files found in the raw class directory
    pub raw_count: usize,
    /// Images that passed the quality gate and were written
    pub valid_count: usize,
    pub invalid_count: usize,
    pub synthesized_count: usize,
    /// Valid originals plus synthesized samples
    pub final_count: usize,
    pub train: usize,
    pub val: usize,
    pub test: usize,
    /// Synthesized samples missing to reach the balancing target
    pub shortfall: usize,
}

impl ClassStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get count for a specific split
    pub fn split_count(&self, split: DatasetSplit) -> usize {
        match split {
            DatasetSplit::Train => self.train,
            DatasetSplit::Val => self.val,
            DatasetSplit::Test => self.test,
        }
    }

    pub fn split_total(&self) -> usize {
        self.train + self.val + self.test
    }

    /// Check the manifest invariants for this class.
    ///
    /// Returns one message per violated invariant.
    pub fn violations(&self, label: &str) -> Vec<String> {
        let mut violations = Vec::new();

        if self.split_total() != self.final_count {
            violations.push(format!(
                "{}: train + val + test = {} but final count is {}",
                label,
                self.split_total(),
                self.final_count
            ));
        }

        if self.valid_count + self.synthesized_count != self.final_count {
            violations.push(format!(
                "{}: valid {} + synthesized {} != final count {}",
                label, self.valid_count, self.synthesized_count, self.final_count
            ));
        }

        violations
    }
}

/// Sum of every class's statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalTotals {
    pub classes: usize,
    pub raw_images: usize,
    pub valid_images: usize,
    pub invalid_images: usize,
    pub synthesized_images: usize,
    pub final_images: usize,
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

impl<'a> FromIterator<&'a ClassStatistics> for GlobalTotals {
    fn from_iter<I: IntoIterator<Item = &'a ClassStatistics>>(iter: I) -> Self {
        let mut totals = GlobalTotals::default();
        for stats in iter {
            totals.classes += 1;
            totals.raw_images += stats.raw_count;
            totals.valid_images += stats.valid_count;
            totals.invalid_images += stats.invalid_count;
            totals.synthesized_images += stats.synthesized_count;
            totals.final_images += stats.final_count;
            totals.train += stats.train;
            totals.val += stats.val;
            totals.test += stats.test;
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consistent_statistics_have_no_violations() {
        let stats = ClassStatistics {
            raw_count: 50,
            valid_count: 40,
            invalid_count: 10,
            synthesized_count: 60,
            final_count: 100,
            train: 70,
            val: 20,
            test: 10,
            shortfall: 0,
        };
        assert!(stats.violations("rust").is_empty());
        assert_eq!(stats.split_count(DatasetSplit::Val), 20);
    }

    #[test]
    fn test_violations_reported() {
        let stats = ClassStatistics {
            valid_count: 40,
            synthesized_count: 50,
            final_count: 100,
            train: 70,
            val: 20,
            test: 5,
            ..Default::default()
        };
        let violations = stats.violations("rust");
        assert_eq!(violations.len(), 2);
        assert!(violations[0].starts_with("rust:"));
    }

    #[test]
    fn test_totals_sum_classes() {
        let a = ClassStatistics {
            raw_count: 3,
            final_count: 5,
            train: 3,
            ..Default::default()
        };
        let b = ClassStatistics {
            raw_count: 2,
            final_count: 5,
            val: 1,
            ..Default::default()
        };
        let totals: GlobalTotals = [a, b].iter().collect();
        assert_eq!(totals.classes, 2);
        assert_eq!(totals.raw_images, 5);
        assert_eq!(totals.final_images, 10);
        assert_eq!(totals.train, 3);
        assert_eq!(totals.val, 1);
    }
}
