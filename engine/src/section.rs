//! Section grouping and row coordinates.

use crate::Snapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A (section, row) coordinate into a live result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexPath {
    pub section: usize,
    pub row: usize,
}

impl IndexPath {
    /// Create an index path.
    pub fn new(section: usize, row: usize) -> Self {
        Self { section, row }
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.section, self.row)
    }
}

/// A read-only, ordered group of snapshots sharing a section-key value.
///
/// Sections are derived, never stored: the controller recomputes them
/// whenever the query spec or the underlying set changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    name: String,
    objects: Vec<Snapshot>,
}

impl Section {
    pub(crate) fn new(name: String, objects: Vec<Snapshot>) -> Self {
        Self { name, objects }
    }

    /// The section-key value shared by every row, rendered as text.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rows in this section.
    pub fn number_of_objects(&self) -> usize {
        self.objects.len()
    }

    /// The rows, in query order.
    pub fn objects(&self) -> &[Snapshot] {
        &self.objects
    }
}
