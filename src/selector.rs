//! Label selection: want/exclude filtering and deterministic ordering.

use std::collections::BTreeSet;

use crate::PrefixSource;

/// Normalize a label: trim and uppercase.
///
/// Returns `None` for labels that are empty after trimming.
pub fn normalize_label(label: &str) -> Option<String> {
    let label = label.trim();
    if label.is_empty() {
        None
    } else {
        Some(label.to_uppercase())
    }
}

/// Compute the ordered list of labels to compile.
///
/// With a non-empty want-list the result is `want - exclude`; otherwise it is
/// every label of `source` minus `exclude`. The result is deduplicated and
/// sorted ascending. Wanted labels unknown to `source` are kept: deciding
/// whether that is fatal belongs to the output mode.
pub fn select<S, T>(want: &[S], exclude: &[T], source: &dyn PrefixSource) -> Vec<String>
where
    S: AsRef<str>,
    T: AsRef<str>,
{
    let exclude: BTreeSet<String> = exclude
        .iter()
        .filter_map(|e| normalize_label(e.as_ref()))
        .collect();

    let wanted: BTreeSet<String> = want
        .iter()
        .filter_map(|w| normalize_label(w.as_ref()))
        .collect();

    let candidates = if wanted.is_empty() {
        source.labels().into_iter().collect()
    } else {
        wanted
    };

    candidates
        .into_iter()
        .filter(|label| !exclude.contains(label))
        .collect()
}
