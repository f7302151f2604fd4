//! Serializes metric families back into exposition text.

use std::fmt::Write as FmtWrite;

use super::{Label, MetricFamily};

/// Appends every family to `out`, in order.
pub fn write_families(out: &mut String, families: &[MetricFamily]) {
    for family in families {
        write_family(out, family);
    }
}

/// Appends one family: `# HELP` (when present), `# TYPE`, then its samples.
///
/// Families without samples are skipped entirely.
pub fn write_family(out: &mut String, family: &MetricFamily) {
    if family.samples.is_empty() {
        return;
    }

    if let Some(help) = &family.help {
        out.push_str("# HELP ");
        out.push_str(&family.name);
        out.push(' ');
        escape_into(out, help, false);
        out.push('\n');
    }
    out.push_str("# TYPE ");
    out.push_str(&family.name);
    out.push(' ');
    out.push_str(family.metric_type.as_str());
    out.push('\n');

    for sample in &family.samples {
        out.push_str(&sample.name);
        write_labels(out, &sample.labels);
        out.push(' ');
        out.push_str(&format_value(sample.value));
        if let Some(ts) = sample.timestamp_ms {
            let _ = write!(out, " {ts}");
        }
        out.push('\n');
    }
}

fn write_labels(out: &mut String, labels: &[Label]) {
    if labels.is_empty() {
        return;
    }
    out.push('{');
    for (i, label) in labels.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&label.name);
        out.push_str("=\"");
        escape_into(out, &label.value, true);
        out.push('"');
    }
    out.push('}');
}

fn escape_into(out: &mut String, text: &str, quote: bool) {
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '"' if quote => out.push_str("\\\""),
            other => out.push(other),
        }
    }
}

/// Formats a sample value the way scrapers expect it: shortest round-trip
/// digits, exponent notation when the decimal exponent is < -4 or >= 6.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }

    let sci = format!("{value:e}");
    let (mantissa, exponent) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => return sci,
    };

    if value != 0.0 && !(-4..6).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    } else {
        format!("{value}")
    }
}
