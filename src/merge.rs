//! Concatenates per-source snapshots into one exposition document.

use crate::exposition::{write_families, MetricFamily};

/// Serializes every snapshot in the given order.
///
/// An empty snapshot (failed source) contributes nothing, so the document
/// never carries error markers.
pub fn merge<'a, I>(snapshots: I) -> String
where
    I: IntoIterator<Item = &'a [MetricFamily]>,
{
    let mut document = String::new();
    for families in snapshots {
        write_families(&mut document, families);
    }
    document
}
