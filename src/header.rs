//! Flattening of the two-row subject/metric header.
//!
//! Exports merge the subject cell horizontally over its metric columns, so only the first
//! column of each subject carries a label. A single left-to-right scan carries the last seen
//! subject forward into the blank cells.

use crate::grid::Cell;
use std::collections::{HashMap, HashSet};

/// Header text is absent when blank, `nan`, or a decoder's `Unnamed: N_level_M` placeholder.
pub fn header_label(cell: Option<&Cell>) -> Option<String> {
    let text = cell?.as_text()?;
    if text.eq_ignore_ascii_case("nan") || text.starts_with("Unnamed") {
        return None;
    }
    Some(text)
}

/// Returns one flat name per column, `width` long.
pub fn flatten_header(subjects: &[Cell], metrics: &[Cell], width: usize) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(width);
    let mut last_subject: Option<String> = None;

    for i in 0..width {
        let subject = match header_label(subjects.get(i)) {
            Some(s) => {
                last_subject = Some(s.clone());
                Some(s)
            }
            None => last_subject.clone(),
        };
        let metric = header_label(metrics.get(i)).unwrap_or_default();

        let name = match subject {
            Some(s) if !metric.is_empty() => format!("{}_{}", s, metric),
            Some(s) => s,
            None if !metric.is_empty() => metric,
            None => format!("Unknown_{}", i),
        };
        names.push(name);
    }

    dedupe_names(names)
}

/// Repeated names get `.1`, `.2`, ... in reading order.
fn dedupe_names(names: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut next_suffix: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        if seen.insert(name.clone()) {
            out.push(name);
            continue;
        }
        let n = next_suffix.entry(name.clone()).or_insert(1);
        let mut candidate = format!("{}.{}", name, n);
        while seen.contains(&candidate) {
            *n += 1;
            candidate = format!("{}.{}", name, n);
        }
        *n += 1;
        seen.insert(candidate.clone());
        out.push(candidate);
    }
    out
}
