//! Static label injection.

use crate::exposition::{Label, MetricFamily};

/// Prepends `static_labels` to the label list of every sample.
///
/// Original labels keep their order and are never removed, even when a
/// static label uses the same name.
pub fn relabel(mut families: Vec<MetricFamily>, static_labels: &[Label]) -> Vec<MetricFamily> {
    if static_labels.is_empty() {
        return families;
    }

    for family in &mut families {
        for sample in &mut family.samples {
            let original = std::mem::take(&mut sample.labels);
            let mut labels = Vec::with_capacity(static_labels.len() + original.len());
            labels.extend_from_slice(static_labels);
            labels.extend(original);
            sample.labels = labels;
        }
    }
    families
}
