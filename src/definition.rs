//! Chain definitions: the serial-number-range to face-value table a chain is issued under.
//!
//! Two input forms are accepted. The textual form is one `<start>-<end> <value>`
//! range per line (an optional trailing description is kept), with blank lines
//! and `#` comments ignored. The structured form is JSON:
//! `{"description": "...", "ranges": [{"start": 1, "end": 100, "value": 1}]}`.
//!
//! Either way the ranges are sorted by `start`, checked for overlap, and bound
//! to a SHA-256 `definitionHash` over `{description, ranges: [{end, start, value}]}`.

use crate::crypto;
use crate::error::{ChainError, DefinitionError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub start: u64,
    pub end: u64,
    pub value: f64,
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ValueRange {
    pub fn contains(&self, serial: u64) -> bool {
        self.start <= serial && serial <= self.end
    }
}

/// Structured form as it arrives from outside; nothing validated yet.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDefinition {
    #[serde(default)]
    pub description: Option<String>,
    pub ranges: Vec<RawRange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRange {
    pub start: i64,
    pub end: i64,
    pub value: f64,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawDefinition")]
pub struct ChainDefinition {
    description: String,
    ranges: Vec<ValueRange>,
    definition_hash: String,
}

// Field order is the hashed key order.
#[derive(Serialize)]
struct CanonicalDefinition<'a> {
    description: &'a str,
    ranges: Vec<CanonicalRange>,
}

#[derive(Serialize)]
struct CanonicalRange {
    end: u64,
    start: u64,
    value: f64,
}

impl TryFrom<RawDefinition> for ChainDefinition {
    type Error = DefinitionError;

    fn try_from(raw: RawDefinition) -> Result<Self, Self::Error> {
        let ranges = raw
            .ranges
            .into_iter()
            .map(|r| checked_range(r.start, r.end, r.value, r.description))
            .collect::<Result<Vec<_>, _>>()?;
        ChainDefinition::new(raw.description.unwrap_or_default(), ranges)
    }
}

fn checked_range(
    start: i64,
    end: i64,
    value: f64,
    description: Option<String>,
) -> Result<ValueRange, DefinitionError> {
    if start < 0 || end < start {
        return Err(DefinitionError::InvalidRange {
            start: start.into(),
            end: end.into(),
        });
    }
    let (start, end) = (start as u64, end as u64);
    if !value.is_finite() || value <= 0.0 {
        return Err(DefinitionError::NonPositiveValue { start, end, value });
    }
    Ok(ValueRange {
        start,
        end,
        value,
        count: end - start + 1,
        description,
    })
}

impl ChainDefinition {
    /// Normalizes `ranges` (sorted by start, non-overlapping) and computes the hash.
    pub fn new(description: impl Into<String>, mut ranges: Vec<ValueRange>) -> Result<Self, DefinitionError> {
        if ranges.is_empty() {
            return Err(DefinitionError::Empty);
        }
        for range in &mut ranges {
            range.count = range
                .end
                .checked_sub(range.start)
                .and_then(|span| span.checked_add(1))
                .ok_or(DefinitionError::InvalidRange {
                    start: range.start.into(),
                    end: range.end.into(),
                })?;
            if !range.value.is_finite() || range.value <= 0.0 {
                return Err(DefinitionError::NonPositiveValue {
                    start: range.start,
                    end: range.end,
                    value: range.value,
                });
            }
        }
        ranges.sort_by_key(|r| r.start);
        for pair in ranges.windows(2) {
            if pair[1].start <= pair[0].end {
                return Err(DefinitionError::Overlap {
                    previous_end: pair[0].end,
                    start: pair[1].start,
                });
            }
        }

        let description = description.into();
        let definition_hash = Self::compute_hash(&description, &ranges)?;
        Ok(Self {
            description,
            ranges,
            definition_hash,
        })
    }

    /// Parses the textual `<start>-<end> <value>` form.
    pub fn parse_text(input: &str) -> Result<Self, DefinitionError> {
        let mut ranges = Vec::new();
        for (index, raw_line) in input.lines().enumerate() {
            let line_no = index + 1;
            let line = match raw_line.split_once('#') {
                Some((before, _)) => before.trim(),
                None => raw_line.trim(),
            };
            if line.is_empty() {
                continue;
            }

            let syntax = |reason: &str| DefinitionError::Syntax {
                line: line_no,
                reason: reason.to_string(),
            };

            let mut tokens = line.split_whitespace();
            let span = tokens.next().ok_or_else(|| syntax("missing range"))?;
            let value = tokens.next().ok_or_else(|| syntax("missing value"))?;
            let rest: Vec<&str> = tokens.collect();
            let description = (!rest.is_empty()).then(|| rest.join(" "));

            let (start, end) = span
                .split_once('-')
                .ok_or_else(|| syntax("expected <start>-<end>"))?;
            let start: i64 = start
                .trim()
                .parse()
                .map_err(|_| syntax("range start is not an integer"))?;
            let end: i64 = end
                .trim()
                .parse()
                .map_err(|_| syntax("range end is not an integer"))?;
            let value: f64 = value.parse().map_err(|_| syntax("value is not a number"))?;

            ranges.push(checked_range(start, end, value, description)?);
        }
        Self::new(String::new(), ranges)
    }

    /// Parses the structured JSON form.
    pub fn from_json(input: &str) -> Result<Self, DefinitionError> {
        let raw: RawDefinition =
            serde_json::from_str(input).map_err(|e| DefinitionError::Json(e.to_string()))?;
        Self::try_from(raw)
    }

    /// Accepts either form, picking JSON when the input starts with `{`.
    pub fn parse_auto(input: &str) -> Result<Self, DefinitionError> {
        if input.trim_start().starts_with('{') {
            Self::from_json(input)
        } else {
            Self::parse_text(input)
        }
    }

    pub fn to_json(&self) -> Result<String, ChainError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Canonical textual form; parsing it yields the same ranges.
    pub fn to_text(&self) -> String {
        self.ranges
            .iter()
            .map(|r| match &r.description {
                Some(d) => format!("{}-{} {} {}\n", r.start, r.end, r.value, d),
                None => format!("{}-{} {}\n", r.start, r.end, r.value),
            })
            .collect()
    }

    fn compute_hash(description: &str, ranges: &[ValueRange]) -> Result<String, DefinitionError> {
        let canonical = CanonicalDefinition {
            description,
            ranges: ranges
                .iter()
                .map(|r| CanonicalRange {
                    end: r.end,
                    start: r.start,
                    value: r.value,
                })
                .collect(),
        };
        let encoded =
            serde_json::to_string(&canonical).map_err(|e| DefinitionError::Json(e.to_string()))?;
        Ok(crypto::hash(&encoded))
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn ranges(&self) -> &[ValueRange] {
        &self.ranges
    }

    pub fn definition_hash(&self) -> &str {
        &self.definition_hash
    }

    /// Face value of `serial`, or `None` when no range covers it.
    pub fn lookup(&self, serial: u64) -> Option<f64> {
        let idx = self.ranges.partition_point(|r| r.start <= serial);
        if idx == 0 {
            return None;
        }
        let range = &self.ranges[idx - 1];
        range.contains(serial).then_some(range.value)
    }

    /// Looks up a serial given as a string, the way chains carry it.
    pub fn value_of(&self, serial: &str) -> Result<f64, ChainError> {
        let number: u64 = serial
            .trim()
            .parse()
            .map_err(|_| ChainError::InvalidSerial(serial.to_string()))?;
        self.lookup(number)
            .ok_or_else(|| ChainError::SerialOutOfRange(serial.to_string()))
    }

    pub fn total_count(&self) -> u64 {
        self.ranges
            .iter()
            .fold(0u64, |total, r| total.saturating_add(r.count))
    }

    pub fn total_value(&self) -> f64 {
        self.ranges.iter().map(|r| r.count as f64 * r.value).sum()
    }
}
