// fillpdf-service/src/reconcile.rs

//! Merging keyed field sets.
//!
//! Used both when an export is imported onto a form and when a template is
//! swapped: values from one set flow onto the matching keys of the other,
//! restricted to each type's exportable properties. Keys without a
//! counterpart are reported back, never dropped silently.

use std::collections::BTreeMap;

/// A record with an allow-list of properties that may travel between copies.
pub trait Exportable {
    type Property: Copy + 'static;

    fn exportable_properties() -> &'static [Self::Property];

    fn copy_property(&mut self, from: &Self, property: Self::Property);

    /// Copies every allow-listed property from `from`. Anything else on
    /// `self` is left untouched.
    fn copy_exportable(&mut self, from: &Self) {
        for property in Self::exportable_properties() {
            self.copy_property(from, *property);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation<T> {
    /// The existing set with incoming values applied.
    pub updated: BTreeMap<String, T>,
    /// Keys whose existing entry received incoming values.
    pub affected: Vec<String>,
    /// Incoming keys with no existing entry, in key order.
    pub unmatched: Vec<String>,
}

impl<T> Reconciliation<T> {
    /// Entries that changed and need persisting.
    pub fn affected_entries(&self) -> impl Iterator<Item = &T> {
        self.affected.iter().filter_map(|key| self.updated.get(key))
    }
}

/// Applies `incoming` onto `existing` by exact key match.
pub fn reconcile<T>(incoming: &BTreeMap<String, T>, existing: &BTreeMap<String, T>) -> Reconciliation<T>
where
    T: Exportable + Clone,
{
    let mut updated = existing.clone();
    let mut affected = Vec::new();
    let mut unmatched = Vec::new();

    for (key, incoming_entry) in incoming {
        match updated.get_mut(key) {
            Some(existing_entry) => {
                existing_entry.copy_exportable(incoming_entry);
                affected.push(key.clone());
            }
            None => unmatched.push(key.clone()),
        }
    }

    Reconciliation {
        updated,
        affected,
        unmatched,
    }
}
