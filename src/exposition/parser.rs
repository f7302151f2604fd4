//! Line-oriented parser for the text exposition format.
//!
//! Parsing is all-or-nothing: the first malformed line fails the whole
//! document and no partial family list is returned.

use ahash::AHashMap as HashMap;

use super::{is_valid_label_name, is_valid_metric_name, Label, MetricFamily, MetricType, Sample};
use crate::error::{ParseError, ParseErrorKind};

/// Parses a raw response body. Bodies must be UTF-8.
pub fn parse_bytes(body: &[u8]) -> Result<Vec<MetricFamily>, ParseError> {
    let text =
        std::str::from_utf8(body).map_err(|_| ParseError::new(0, ParseErrorKind::InvalidUtf8))?;
    parse(text)
}

/// Parses exposition text into families, in order of first appearance.
pub fn parse(text: &str) -> Result<Vec<MetricFamily>, ParseError> {
    let mut builder = FamilyBuilder::default();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim_start();
        if line.is_empty() {
            continue;
        }

        let result = if let Some(comment) = line.strip_prefix('#') {
            builder.comment(comment)
        } else {
            parse_sample(line).and_then(|sample| builder.sample(sample))
        };
        result.map_err(|kind| ParseError::new(line_no, kind))?;
    }

    Ok(builder.families)
}

#[derive(Default)]
struct FamilyBuilder {
    families: Vec<MetricFamily>,
    by_name: HashMap<String, usize>,
    /// Whether a TYPE line was seen for the family at the same index.
    typed: Vec<bool>,
}

impl FamilyBuilder {
    fn family_index(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.by_name.get(name) {
            return idx;
        }
        let idx = self.families.len();
        self.families
            .push(MetricFamily::new(name, MetricType::Untyped));
        self.typed.push(false);
        self.by_name.insert(name.to_string(), idx);
        idx
    }

    fn comment(&mut self, comment: &str) -> Result<(), ParseErrorKind> {
        let comment = comment.trim_start();
        let (keyword, rest) = split_token(comment);
        if keyword != "HELP" && keyword != "TYPE" {
            return Ok(());
        }
        let rest = rest.trim_start();
        if rest.is_empty() {
            // A bare "# HELP" is just a comment.
            return Ok(());
        }

        let (name, rest) = split_token(rest);
        if !is_valid_metric_name(name) {
            return Err(ParseErrorKind::InvalidMetricName(name.to_string()));
        }
        let rest = rest.trim_start();

        if keyword == "HELP" {
            let idx = self.family_index(name);
            let family = &mut self.families[idx];
            if family.help.is_some() {
                return Err(ParseErrorKind::DuplicateHelp(name.to_string()));
            }
            family.help = Some(unescape_help(rest));
            return Ok(());
        }

        let type_name = rest.trim_end();
        if type_name.is_empty() {
            return Err(ParseErrorKind::IncompleteComment("TYPE"));
        }
        let metric_type = MetricType::from_name(type_name)
            .ok_or_else(|| ParseErrorKind::UnknownType(type_name.to_string()))?;

        let idx = self.family_index(name);
        if self.typed[idx] || !self.families[idx].samples.is_empty() {
            return Err(ParseErrorKind::DuplicateType(name.to_string()));
        }
        self.typed[idx] = true;
        self.families[idx].metric_type = metric_type;
        Ok(())
    }

    fn sample(&mut self, sample: Sample) -> Result<(), ParseErrorKind> {
        let idx = match self.suffixed_family(&sample.name) {
            Some(idx) => idx,
            None => self.family_index(&sample.name),
        };
        let family = &mut self.families[idx];

        match family.metric_type {
            MetricType::Histogram if sample.name.ends_with("_bucket") => {
                if sample.label("le").is_none() {
                    return Err(ParseErrorKind::MissingLabel {
                        sample: sample.name,
                        label: "le",
                    });
                }
            }
            MetricType::Summary if sample.name == family.name => {
                if sample.label("quantile").is_none() {
                    return Err(ParseErrorKind::MissingLabel {
                        sample: sample.name,
                        label: "quantile",
                    });
                }
            }
            _ => {}
        }

        family.samples.push(sample);
        Ok(())
    }

    /// Finds the histogram/summary family a suffixed sample belongs to.
    fn suffixed_family(&self, sample_name: &str) -> Option<usize> {
        for suffix in ["_bucket", "_sum", "_count"] {
            let Some(base) = sample_name.strip_suffix(suffix) else {
                continue;
            };
            if let Some(&idx) = self.by_name.get(base) {
                if self.families[idx].metric_type.suffixes().contains(&suffix) {
                    return Some(idx);
                }
            }
        }
        None
    }
}

/// Splits off the first whitespace-delimited token.
fn split_token(s: &str) -> (&str, &str) {
    match s.find([' ', '\t']) {
        Some(pos) => (&s[..pos], &s[pos..]),
        None => (s, ""),
    }
}

fn unescape_help(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn parse_sample(line: &str) -> Result<Sample, ParseErrorKind> {
    let name_end = line
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == ':'))
        .unwrap_or(line.len());
    let name = &line[..name_end];
    if !is_valid_metric_name(name) {
        let (token, _) = split_token(line);
        return Err(ParseErrorKind::InvalidMetricName(token.to_string()));
    }

    let mut rest = &line[name_end..];
    // Blanks may separate the name from its label set.
    let before_labels = rest.trim_start_matches([' ', '\t']);
    let mut labels = Vec::new();
    if let Some(after_brace) = before_labels.strip_prefix('{') {
        let (parsed, remainder) = parse_labels(after_brace)?;
        labels = parsed;
        rest = remainder;
    } else if before_labels.len() == rest.len() {
        let (token, _) = split_token(line);
        return Err(ParseErrorKind::InvalidMetricName(token.to_string()));
    }

    let mut fields = rest.split_whitespace();
    let value_text = fields
        .next()
        .ok_or_else(|| ParseErrorKind::InvalidValue(String::new()))?;
    let value = parse_value(value_text)?;

    let timestamp_ms = match fields.next() {
        Some(ts) => Some(
            ts.parse::<i64>()
                .map_err(|_| ParseErrorKind::InvalidTimestamp(ts.to_string()))?,
        ),
        None => None,
    };

    if let Some(extra) = fields.next() {
        return Err(ParseErrorKind::TrailingText(extra.to_string()));
    }

    Ok(Sample {
        name: name.to_string(),
        labels,
        value,
        timestamp_ms,
    })
}

/// Parses `name="value",...}` and returns the labels plus the text after `}`.
fn parse_labels(mut s: &str) -> Result<(Vec<Label>, &str), ParseErrorKind> {
    let mut labels = Vec::new();

    loop {
        s = s.trim_start();
        if let Some(rest) = s.strip_prefix('}') {
            return Ok((labels, rest));
        }

        let name_end = s
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .ok_or(ParseErrorKind::MalformedLabels("unterminated label set"))?;
        let name = &s[..name_end];
        if !is_valid_label_name(name) {
            let shown: String = s.chars().take_while(|c| !matches!(c, '=' | '}')).collect();
            return Err(ParseErrorKind::InvalidLabelName(shown.trim().to_string()));
        }

        s = s[name_end..].trim_start();
        s = s
            .strip_prefix('=')
            .ok_or(ParseErrorKind::MalformedLabels("expected '=' after label name"))?
            .trim_start();
        s = s
            .strip_prefix('"')
            .ok_or(ParseErrorKind::MalformedLabels("label value must be quoted"))?;

        let (value, rest) = read_quoted(s)?;
        labels.push(Label::new(name, value));

        s = rest.trim_start();
        if let Some(rest) = s.strip_prefix(',') {
            s = rest;
        } else if !s.starts_with('}') {
            return Err(ParseErrorKind::MalformedLabels(
                "expected ',' or '}' after label value",
            ));
        }
    }
}

/// Reads an escaped label value up to the closing quote.
fn read_quoted(s: &str) -> Result<(String, &str), ParseErrorKind> {
    let mut value = String::new();
    let mut chars = s.char_indices();
    while let Some((pos, c)) = chars.next() {
        match c {
            '"' => return Ok((value, &s[pos + 1..])),
            '\\' => match chars.next() {
                Some((_, '\\')) => value.push('\\'),
                Some((_, '"')) => value.push('"'),
                Some((_, 'n')) => value.push('\n'),
                _ => return Err(ParseErrorKind::MalformedLabels("invalid escape sequence")),
            },
            other => value.push(other),
        }
    }
    Err(ParseErrorKind::MalformedLabels("unterminated label value"))
}

fn parse_value(text: &str) -> Result<f64, ParseErrorKind> {
    match text {
        "+Inf" | "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        "NaN" => Ok(f64::NAN),
        _ => text
            .parse::<f64>()
            .map_err(|_| ParseErrorKind::InvalidValue(text.to_string())),
    }
}
