use std::collections::BTreeMap;

use crate::types::Schema;

/// Classification of every desired attribute against the live schema.
///
/// Attributes that only exist on the live side are never reported: schema
/// evolution through this path is additive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    pub unchanged: BTreeMap<String, String>,
    pub additions: BTreeMap<String, String>,
    pub conflicts: BTreeMap<String, (String, String)>,
}

/// One line of a rendered diff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffEntry<'a> {
    Unchanged { name: &'a str, display: &'a str },
    Addition { name: &'a str, display: &'a str },
    Conflict { name: &'a str, current: &'a str, desired: &'a str },
}

impl DiffEntry<'_> {
    pub fn name(&self) -> &str {
        match self {
            Self::Unchanged { name, .. } | Self::Addition { name, .. } | Self::Conflict { name, .. } => {
                name
            }
        }
    }
}

impl SchemaDiff {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn has_changes(&self) -> bool {
        !self.additions.is_empty() || !self.conflicts.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_changes() && self.unchanged.is_empty()
    }

    /// All classified attributes, sorted by name
    pub fn entries(&self) -> Vec<DiffEntry<'_>> {
        let mut entries: Vec<DiffEntry<'_>> = self
            .unchanged
            .iter()
            .map(|(name, display)| DiffEntry::Unchanged { name, display })
            .chain(
                self.additions
                    .iter()
                    .map(|(name, display)| DiffEntry::Addition { name, display }),
            )
            .chain(
                self.conflicts
                    .iter()
                    .map(|(name, (current, desired))| DiffEntry::Conflict {
                        name,
                        current,
                        desired,
                    }),
            )
            .collect();
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        entries
    }
}

/// Compare a desired declaration with the live schema (absent = empty)
pub fn diff(current: Option<&Schema>, desired: &Schema) -> SchemaDiff {
    let mut result = SchemaDiff::default();

    for (name, wanted) in desired.iter() {
        let display = wanted.display_form();
        match current.and_then(|schema| schema.get(name)) {
            None => {
                result.additions.insert(name.to_string(), display);
            }
            Some(live) if live.normalized() == wanted.normalized() => {
                result.unchanged.insert(name.to_string(), display);
            }
            Some(live) => {
                result
                    .conflicts
                    .insert(name.to_string(), (live.display_form(), display));
            }
        }
    }

    result
}
