//! Per-file change detection between two hash sets

use std::collections::BTreeMap;

use crate::content::hash::FileHashes;

/// Filename to "content changed" flag, scoped to an incoming file set
pub type ConfigDiff = BTreeMap<String, bool>;

/// Compare `incoming` against `previous`.
///
/// Only filenames present in `incoming` appear in the result. A filename that
/// `previous` has never seen compares against `None`, so a new file with
/// content is always reported as changed.
pub fn diff(previous: &FileHashes, incoming: &FileHashes) -> ConfigDiff {
    incoming
        .iter()
        .map(|(name, digest)| {
            let before = previous.get(name).cloned().flatten();
            (name.clone(), before != *digest)
        })
        .collect()
}

/// Overlay `incoming` on `previous`; incoming digests win, untouched
/// filenames keep their previous digest.
pub fn merge(previous: &FileHashes, incoming: &FileHashes) -> FileHashes {
    let mut merged = previous.clone();
    for (name, digest) in incoming {
        merged.insert(name.clone(), digest.clone());
    }
    merged
}
