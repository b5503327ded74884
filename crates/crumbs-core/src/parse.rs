//! Best-effort extraction of JSON payloads from model-authored text.
//!
//! Model responses may wrap the payload in prose or markdown fences, cut it
//! off mid-array, or mix garbage into an otherwise valid array. Extraction
//! keeps every element it can decode and reports the rest as
//! [`ParseIssue`]s; it never fails a batch.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde_json::{Deserializer, Map, Value};

use crate::batch::AnalysisBatch;
use crate::domain::{Commit, ParseIssue};

/// Object keys under which a wrapped record array is unwrapped.
const WRAPPER_KEYS: [&str; 5] = ["results", "commits", "items", "entries", "analysis"];

/// Records decoded from one successful response, plus what was discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBatch<R> {
    pub records: Vec<R>,
    pub issues: Vec<ParseIssue>,
}

impl<R> Default for ParsedBatch<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            issues: Vec::new(),
        }
    }
}

impl<R> ParsedBatch<R> {
    pub fn from_issues(issues: Vec<ParseIssue>) -> Self {
        Self {
            records: Vec::new(),
            issues,
        }
    }
}

/// The first well-formed JSON value located in a response.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonPayload {
    Array(Vec<Value>),
    Object(Map<String, Value>),
}

impl JsonPayload {
    /// Flatten into record candidates, unwrapping `{"results": [...]}` style objects.
    pub fn into_items(self) -> Vec<Value> {
        match self {
            Self::Array(items) => items,
            Self::Object(mut map) => {
                for key in WRAPPER_KEYS {
                    if matches!(map.get(key), Some(Value::Array(_))) {
                        if let Some(Value::Array(items)) = map.remove(key) {
                            return items;
                        }
                    }
                }
                vec![Value::Object(map)]
            }
        }
    }
}

/// Result of scanning a response for a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub payload: Option<JsonPayload>,
    pub issues: Vec<ParseIssue>,
}

/// Locate the first well-formed JSON array or object in `raw`.
///
/// Candidates are tried in order of their opening bracket. An array is
/// accepted when it yields at least one object element or closes without
/// malformed elements; an object must parse completely. A clean array with
/// no object elements (such as `[1, 2]` in prose) is only used when no later
/// candidate is accepted. Trailing prose is ignored.
pub fn extract_payload(raw: &str) -> Extracted {
    let mut fallback: Option<ArrayScan> = None;
    for (pos, ch) in raw.char_indices() {
        match ch {
            '[' => {
                let scan = scan_array(&raw[pos..]);
                if scan.has_objects() {
                    return scan.into_extracted();
                }
                if fallback.is_none() && scan.accepted() {
                    fallback = Some(scan);
                }
            }
            '{' => {
                let mut stream = Deserializer::from_str(&raw[pos..]).into_iter::<Value>();
                if let Some(Ok(Value::Object(map))) = stream.next() {
                    return Extracted {
                        payload: Some(JsonPayload::Object(map)),
                        issues: Vec::new(),
                    };
                }
            }
            _ => {}
        }
    }

    if let Some(scan) = fallback {
        return scan.into_extracted();
    }
    Extracted {
        payload: None,
        issues: vec![ParseIssue::malformed(
            "no JSON array or object found in response",
        )],
    }
}

#[derive(Debug, Default)]
struct ArrayScan {
    items: Vec<Value>,
    malformed: Vec<usize>,
    closed: bool,
}

impl ArrayScan {
    fn has_objects(&self) -> bool {
        self.items.iter().any(Value::is_object)
    }

    fn accepted(&self) -> bool {
        self.has_objects() || (self.closed && self.malformed.is_empty())
    }

    fn into_extracted(self) -> Extracted {
        let issues = self.issues();
        Extracted {
            payload: Some(JsonPayload::Array(self.items)),
            issues,
        }
    }

    fn issues(&self) -> Vec<ParseIssue> {
        let mut issues: Vec<ParseIssue> = self
            .malformed
            .iter()
            .map(|offset| {
                ParseIssue::malformed(format!("unparseable array element at byte {offset}"))
            })
            .collect();
        if !self.closed {
            issues.push(ParseIssue::malformed(format!(
                "array truncated after {} element(s)",
                self.items.len()
            )));
        }
        issues
    }
}

/// Decode array elements one by one from `text`, which starts with `[`.
fn scan_array(text: &str) -> ArrayScan {
    let bytes = text.as_bytes();
    let mut scan = ArrayScan::default();
    let mut pos = 1;

    loop {
        while pos < bytes.len() && (bytes[pos].is_ascii_whitespace() || bytes[pos] == b',') {
            pos += 1;
        }
        if pos >= bytes.len() {
            break;
        }
        if bytes[pos] == b']' {
            scan.closed = true;
            break;
        }

        let mut stream = Deserializer::from_str(&text[pos..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => {
                scan.items.push(value);
                pos += stream.byte_offset();
            }
            Some(Err(err)) if err.is_eof() => break,
            Some(Err(_)) => {
                scan.malformed.push(pos);
                match skip_element(bytes, pos) {
                    Some(next) => pos = next,
                    None => break,
                }
            }
            None => break,
        }
    }

    scan
}

/// Position just past the malformed element starting at `start`: after the
/// next top-level `,`, or at the closing `]`. `None` if the text runs out.
fn skip_element(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        let idx = start + offset;
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => depth += 1,
            b']' if depth == 0 => return Some(idx),
            b']' | b'}' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => return Some(idx + 1),
            _ => {}
        }
    }
    None
}

/// A decoded record that names the commit it belongs to.
pub trait CommitKeyed {
    fn commit_id(&self) -> &str;
}

/// Decode every per-commit record in `raw` and key it back to `batch`.
///
/// Each candidate is deserialized as `T`, resolved against the batch, then
/// handed to `build` with its commit. Shape errors, unknown commits,
/// duplicates and `build` rejections are recorded as issues and skipped.
pub fn parse_commit_records<T, R, F>(
    raw: &str,
    batch: &AnalysisBatch<'_>,
    mut build: F,
) -> ParsedBatch<R>
where
    T: DeserializeOwned + CommitKeyed,
    F: FnMut(T, &Commit) -> Result<R, String>,
{
    let Extracted { payload, issues } = extract_payload(raw);
    let mut parsed = ParsedBatch::from_issues(issues);
    let Some(payload) = payload else {
        return parsed;
    };

    let mut seen: HashSet<&str> = HashSet::new();
    for item in payload.into_items() {
        let decoded: T = match serde_json::from_value(item) {
            Ok(decoded) => decoded,
            Err(err) => {
                parsed.issues.push(ParseIssue::invalid(err.to_string()));
                continue;
            }
        };

        let Some(commit) = batch.resolve(decoded.commit_id()) else {
            parsed.issues.push(ParseIssue::UnknownCommit {
                sha: decoded.commit_id().to_string(),
            });
            continue;
        };

        if !seen.insert(commit.sha.as_str()) {
            parsed.issues.push(ParseIssue::DuplicateRecord {
                sha: commit.sha.clone(),
            });
            continue;
        }

        match build(decoded, commit) {
            Ok(record) => parsed.records.push(record),
            Err(detail) => parsed
                .issues
                .push(ParseIssue::invalid(format!("{}: {detail}", commit.short_sha()))),
        }
    }

    parsed
}

/// Lenient field deserializers for model-authored values.
pub mod lenient {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// A number, or a string holding one. `null` and absence map to `None`.
    pub fn f64_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| D::Error::custom("number out of range"))?,
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| D::Error::custom(format!("expected a number, found \"{s}\"")))?,
            Some(other) => {
                return Err(D::Error::custom(format!(
                    "expected a number, found {other}"
                )))
            }
        };
        if value.is_finite() {
            Ok(Some(value))
        } else {
            Err(D::Error::custom("number must be finite"))
        }
    }

    /// A list of strings, or a single string. Non-string elements are dropped.
    pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let items = match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(s)) => vec![s],
            Some(Value::Array(values)) => values
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            Some(other) => {
                return Err(D::Error::custom(format!(
                    "expected a list of strings, found {other}"
                )))
            }
        };
        Ok(items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }

    /// A boolean, or the strings `"true"`/`"false"`/`"yes"`/`"no"`.
    pub fn bool_opt<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(b)),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Ok(Some(true)),
                "false" | "no" => Ok(Some(false)),
                _ => Err(D::Error::custom(format!("expected a boolean, found \"{s}\""))),
            },
            Some(other) => Err(D::Error::custom(format!(
                "expected a boolean, found {other}"
            ))),
        }
    }
}

/// Trimmed, non-empty text or `None`.
pub(crate) fn non_empty(text: Option<String>) -> Option<String> {
    text.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
