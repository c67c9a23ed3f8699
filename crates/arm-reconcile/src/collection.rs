//! # Collection Merger
//!
//! Name-keyed find / insert / update / remove over an in-memory copy of a
//! remote list field (security rules inside a security group, routes inside a
//! route table, ...).
//!
//! Names are compared case-insensitively, as the remote API compares them.
//!
//! The remote API has no per-element patch. Every mutation produces the whole
//! new collection, which the caller writes back as a full replacement inside a
//! [`NamedLock`](crate::locks::NamedLock) critical section on the parent.

use crate::error::{ReconcileError, ReconcileResult};

/// An element of a remote list field, keyed by its name.
pub trait NamedEntry {
    fn name(&self) -> &str;
}

/// Case-insensitive name equality.
pub fn names_match(a: &str, b: &str) -> bool {
    if a.is_ascii() && b.is_ascii() {
        return a.eq_ignore_ascii_case(b);
    }
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

/// Linear scan for `name`; returns its position and the entry.
pub fn find<'a, T: NamedEntry>(collection: &'a [T], name: &str) -> Option<(usize, &'a T)> {
    collection
        .iter()
        .enumerate()
        .find(|(_, entry)| names_match(entry.name(), name))
}

/// Appends `entry`, failing with `DuplicateEntry` if its name is taken.
pub fn insert<T: NamedEntry>(mut collection: Vec<T>, entry: T) -> ReconcileResult<Vec<T>> {
    if let Some((_, existing)) = find(&collection, entry.name()) {
        return Err(ReconcileError::DuplicateEntry {
            name: existing.name().to_string(),
        });
    }
    collection.push(entry);
    Ok(collection)
}

/// Replaces the entry called `name` in place; all other entries are untouched.
///
/// Fails with `EntryNotFound` if no such entry exists, or `DuplicateEntry` if
/// `entry` is renamed onto another existing entry.
pub fn update<T: NamedEntry>(mut collection: Vec<T>, name: &str, entry: T) -> ReconcileResult<Vec<T>> {
    let (index, _) = find(&collection, name).ok_or_else(|| ReconcileError::EntryNotFound {
        name: name.to_string(),
    })?;

    if !names_match(entry.name(), name) {
        if let Some((_, clash)) = find(&collection, entry.name()) {
            return Err(ReconcileError::DuplicateEntry {
                name: clash.name().to_string(),
            });
        }
    }

    collection[index] = entry;
    Ok(collection)
}

/// Removes the entry called `name`. Absent entries are a no-op.
pub fn remove<T: NamedEntry>(mut collection: Vec<T>, name: &str) -> (Vec<T>, Option<T>) {
    let removed = find(&collection, name)
        .map(|(index, _)| index)
        .map(|index| collection.remove(index));
    (collection, removed)
}

/// A single mutation to apply to a collection.
#[derive(Debug, Clone)]
pub enum Merge<T> {
    Insert(T),
    Update { name: String, entry: T },
    Remove { name: String },
}

impl<T: NamedEntry> Merge<T> {
    /// The entry name this mutation targets.
    pub fn target(&self) -> &str {
        match self {
            Merge::Insert(entry) => entry.name(),
            Merge::Update { name, .. } | Merge::Remove { name } => name,
        }
    }

    /// Applies the mutation.
    ///
    /// Returns `Ok(None)` when the collection is unchanged (removing an absent
    /// entry), so the caller can skip the remote write.
    pub fn apply(self, collection: Vec<T>) -> ReconcileResult<Option<Vec<T>>> {
        match self {
            Merge::Insert(entry) => insert(collection, entry).map(Some),
            Merge::Update { name, entry } => update(collection, &name, entry).map(Some),
            Merge::Remove { name } => match remove(collection, &name) {
                (collection, Some(_)) => Ok(Some(collection)),
                (_, None) => Ok(None),
            },
        }
    }
}
