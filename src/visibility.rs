//! Cross-chart visibility state and raw-result filter selection

use std::collections::BTreeSet;

use crate::data::{MetricKind, MetricTag, Operation, RawResultEntry};

/// A legend entry the user can toggle
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum VisibilityKey {
    Group(String),
    Operation(Operation),
}

impl VisibilityKey {
    pub fn group(name: impl Into<String>) -> Self {
        VisibilityKey::Group(name.into())
    }
}

/// Which groups and operations are currently shown on every chart
///
/// A line for `(group, operation)` is visible iff both its group and its
/// operation are members.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VisibilitySet {
    groups: BTreeSet<String>,
    operations: BTreeSet<Operation>,
}

impl VisibilitySet {
    /// All given groups visible, with the given operations
    pub fn new<I, S>(groups: I, operations: impl IntoIterator<Item = Operation>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            groups: groups.into_iter().map(Into::into).collect(),
            operations: operations.into_iter().collect(),
        }
    }

    /// Default for combined charts: every group, reads only
    pub fn reads_only<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(groups, [Operation::Read])
    }

    pub fn contains(&self, key: &VisibilityKey) -> bool {
        match key {
            VisibilityKey::Group(g) => self.groups.contains(g),
            VisibilityKey::Operation(op) => self.operations.contains(op),
        }
    }

    pub fn is_visible(&self, group: &str, operation: Operation) -> bool {
        self.groups.contains(group) && self.operations.contains(&operation)
    }

    /// Flip membership of a key, returning whether it is now visible
    pub fn toggle(&mut self, key: &VisibilityKey) -> bool {
        match key {
            VisibilityKey::Group(g) => {
                if !self.groups.remove(g) {
                    self.groups.insert(g.clone());
                    true
                } else {
                    false
                }
            }
            VisibilityKey::Operation(op) => {
                if !self.operations.remove(op) {
                    self.operations.insert(*op);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Add groups that appeared after a reload; existing choices are kept
    pub fn extend_groups<I, S>(&mut self, groups: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
    }

    pub fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    pub fn operations(&self) -> &BTreeSet<Operation> {
        &self.operations
    }
}

/// Conjunctive filter over raw per-commit results
///
/// An empty set means "nothing selected" for that facet, not "everything".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterSelection {
    pub configs: BTreeSet<String>,
    pub branches: BTreeSet<String>,
    /// Metric tags such as `iops_read`
    pub metrics: BTreeSet<String>,
}

impl FilterSelection {
    /// Select every facet value present in the entries
    pub fn all_of(entries: &[RawResultEntry]) -> Self {
        let metrics = [MetricKind::Iops, MetricKind::Latency]
            .into_iter()
            .flat_map(|k| Operation::ALL.into_iter().map(move |op| MetricTag::tag(k, op)))
            .collect();

        Self {
            configs: entries.iter().map(|e| e.config.clone()).collect(),
            branches: entries.iter().map(|e| e.result.branch.clone()).collect(),
            metrics,
        }
    }

    pub fn matches(&self, config: &str, branch: &str, metric: &str) -> bool {
        self.configs.contains(config)
            && self.branches.contains(branch)
            && self.metrics.contains(metric)
    }

    /// Whether any metric of this entry passes the filter
    pub fn matches_entry(&self, entry: &RawResultEntry) -> bool {
        self.metrics
            .iter()
            .any(|m| self.matches(&entry.config, &entry.result.branch, m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RawResult;

    #[test]
    fn test_toggle_is_an_involution() {
        let original = VisibilitySet::reads_only(["A", "B"]);
        let mut set = original.clone();

        for key in [
            VisibilityKey::group("A"),
            VisibilityKey::group("C"),
            VisibilityKey::Operation(Operation::Write),
            VisibilityKey::Operation(Operation::Read),
        ] {
            set.toggle(&key);
            assert_ne!(set, original);
            set.toggle(&key);
            assert_eq!(set, original);
        }
    }

    #[test]
    fn test_visibility_requires_group_and_operation() {
        let mut set = VisibilitySet::reads_only(["A"]);
        assert!(set.is_visible("A", Operation::Read));
        assert!(!set.is_visible("A", Operation::Write));
        assert!(!set.is_visible("B", Operation::Read));

        assert!(set.toggle(&VisibilityKey::Operation(Operation::Write)));
        assert!(set.is_visible("A", Operation::Write));

        assert!(!set.toggle(&VisibilityKey::group("A")));
        assert!(!set.is_visible("A", Operation::Read));
    }

    #[test]
    fn test_filter_selection_is_conjunctive() {
        let entry = RawResultEntry {
            config: "nvme".to_string(),
            commit: "abc".to_string(),
            result: RawResult {
                date: None,
                branch: "main".to_string(),
                read_iops: Some(1.0),
                write_iops: None,
                read_latency_ns: None,
                write_latency_ns: None,
            },
        };

        let mut filter = FilterSelection::all_of(std::slice::from_ref(&entry));
        assert!(filter.matches("nvme", "main", "iops_read"));
        assert!(filter.matches_entry(&entry));

        filter.branches.clear();
        assert!(!filter.matches("nvme", "main", "iops_read"));
        assert!(!filter.matches_entry(&entry));

        filter.branches.insert("main".to_string());
        filter.metrics = BTreeSet::from(["latency_write".to_string()]);
        assert!(filter.matches("nvme", "main", "latency_write"));
        assert!(!filter.matches("nvme", "main", "iops_read"));
    }
}
