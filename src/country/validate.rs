//! Schema validation for countrylayer payloads.
//!
//! The upstream answers with either one country object or an array of them.
//! A payload is accepted only when every candidate passes every field check;
//! otherwise all failures are collected into [`ValidationErrors`] and no
//! record is returned.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use super::CountryRecord;

/// Field name used for errors that do not belong to a single field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

const REQUIRED: &str = "This field is required.";
const NOT_NULL: &str = "This field may not be null.";
const NOT_A_STRING: &str = "Not a valid string.";
const NOT_BLANK: &str = "This field may not be blank.";

#[derive(Debug, Clone, Copy)]
enum Length {
    Max(usize),
    Exact(usize),
}

#[derive(Debug, Clone, Copy)]
struct StringRule {
    length: Length,
    allow_blank: bool,
}

impl StringRule {
    const fn max(len: usize) -> Self {
        Self {
            length: Length::Max(len),
            allow_blank: false,
        }
    }

    const fn exact(len: usize) -> Self {
        Self {
            length: Length::Exact(len),
            allow_blank: false,
        }
    }

    const fn blank_allowed(self) -> Self {
        Self {
            allow_blank: true,
            ..self
        }
    }

    fn check(&self, value: &Value) -> Result<String, String> {
        let text = match value {
            Value::Null => return Err(NOT_NULL.to_string()),
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return Err(NOT_A_STRING.to_string()),
        };

        if !self.allow_blank && text.trim().is_empty() {
            return Err(NOT_BLANK.to_string());
        }

        let len = text.chars().count();
        match self.length {
            Length::Max(max) if len > max => Err(format!(
                "Ensure this field has no more than {} characters.",
                max
            )),
            Length::Exact(exact) if len != exact => Err(format!(
                "Ensure this field has exactly {} characters.",
                exact
            )),
            _ => Ok(text),
        }
    }
}

const NAME: StringRule = StringRule::max(255);
const TOP_LEVEL_DOMAIN: StringRule = StringRule::max(10);
const ALPHA2_CODE: StringRule = StringRule::exact(2);
const ALPHA3_CODE: StringRule = StringRule::exact(3);
const CALLING_CODE: StringRule = StringRule::max(5);
const CAPITAL: StringRule = StringRule::max(255).blank_allowed();
const ALT_SPELLING: StringRule = StringRule::max(255);
const REGION: StringRule = StringRule::max(255);

/// Location of a validation failure inside the payload.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath {
    /// Candidate position, `None` for failures about the whole payload.
    pub index: Option<usize>,
    /// Field name as sent by the upstream, or [`NON_FIELD_ERRORS`].
    pub field: String,
    /// Entry position inside a list field.
    pub item: Option<usize>,
}

impl FieldPath {
    fn payload() -> Self {
        Self {
            index: None,
            field: NON_FIELD_ERRORS.to_string(),
            item: None,
        }
    }

    fn field(index: usize, field: &str) -> Self {
        Self {
            index: Some(index),
            field: field.to_string(),
            item: None,
        }
    }

    fn item(index: usize, field: &str, item: usize) -> Self {
        Self {
            item: Some(item),
            ..Self::field(index, field)
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(index) = self.index {
            write!(f, "[{}].", index)?;
        }
        write!(f, "{}", self.field)?;
        if let Some(item) = self.item {
            write!(f, "[{}]", item)?;
        }
        Ok(())
    }
}

/// Every field-level failure of a rejected payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{}", summarize(.errors))]
pub struct ValidationErrors {
    errors: BTreeMap<FieldPath, Vec<String>>,
}

fn summarize(errors: &BTreeMap<FieldPath, Vec<String>>) -> String {
    errors
        .iter()
        .map(|(path, reasons)| format!("{}: {}", path, reasons.join(" ")))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    fn add(&mut self, path: FieldPath, reason: impl Into<String>) {
        self.errors.entry(path).or_default().push(reason.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of distinct failing paths.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldPath, &[String])> {
        self.errors
            .iter()
            .map(|(path, reasons)| (path, reasons.as_slice()))
    }

    /// Reasons recorded for `field` of candidate `index` (list entries excluded).
    pub fn reasons(&self, index: usize, field: &str) -> &[String] {
        self.errors
            .get(&FieldPath::field(index, field))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether any candidate failed on `field`, including its list entries.
    pub fn mentions(&self, field: &str) -> bool {
        self.errors.keys().any(|path| path.field == field)
    }
}

/// Python-style type name, matching the wording the upstream ecosystem uses.
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

struct CandidateValidator<'a> {
    index: usize,
    object: &'a Map<String, Value>,
    errors: &'a mut ValidationErrors,
}

impl CandidateValidator<'_> {
    fn string(&mut self, field: &str, rule: &StringRule) -> Option<String> {
        let Some(value) = self.object.get(field) else {
            self.errors.add(FieldPath::field(self.index, field), REQUIRED);
            return None;
        };

        match rule.check(value) {
            Ok(text) => Some(text),
            Err(reason) => {
                self.errors.add(FieldPath::field(self.index, field), reason);
                None
            }
        }
    }

    fn list(&mut self, field: &str, rule: &StringRule) -> Option<Vec<String>> {
        let items = match self.object.get(field) {
            None => {
                self.errors.add(FieldPath::field(self.index, field), REQUIRED);
                return None;
            }
            Some(Value::Null) => {
                self.errors.add(FieldPath::field(self.index, field), NOT_NULL);
                return None;
            }
            Some(Value::Array(items)) => items,
            Some(other) => {
                self.errors.add(
                    FieldPath::field(self.index, field),
                    format!(
                        "Expected a list of items but got type \"{}\".",
                        type_name(other)
                    ),
                );
                return None;
            }
        };

        let mut values = Vec::with_capacity(items.len());
        let mut valid = true;
        for (item, value) in items.iter().enumerate() {
            match rule.check(value) {
                Ok(text) => values.push(text),
                Err(reason) => {
                    self.errors
                        .add(FieldPath::item(self.index, field, item), reason);
                    valid = false;
                }
            }
        }

        valid.then_some(values)
    }
}

fn validate_candidate(
    index: usize,
    candidate: &Value,
    errors: &mut ValidationErrors,
) -> Option<CountryRecord> {
    let Some(object) = candidate.as_object() else {
        errors.add(
            FieldPath::field(index, NON_FIELD_ERRORS),
            format!(
                "Invalid data. Expected a dictionary, but got {}.",
                type_name(candidate)
            ),
        );
        return None;
    };

    let mut fields = CandidateValidator {
        index,
        object,
        errors,
    };

    // Every field is checked before any missing one short-circuits the record.
    let name = fields.string("name", &NAME);
    let top_level_domain = fields.list("topLevelDomain", &TOP_LEVEL_DOMAIN);
    let alpha2_code = fields.string("alpha2Code", &ALPHA2_CODE);
    let alpha3_code = fields.string("alpha3Code", &ALPHA3_CODE);
    let calling_codes = fields.list("callingCodes", &CALLING_CODE);
    let capital = fields.string("capital", &CAPITAL);
    let alt_spellings = fields.list("altSpellings", &ALT_SPELLING);
    let region = fields.string("region", &REGION);

    Some(CountryRecord {
        name: name?,
        top_level_domain: top_level_domain?,
        alpha2_code: alpha2_code?,
        alpha3_code: alpha3_code?,
        calling_codes: calling_codes?,
        capital: capital?,
        alt_spellings: alt_spellings?,
        region: region?,
    })
}

/// Validates a raw upstream payload.
///
/// A single object is treated as a one-element list. Numbers are accepted
/// for string fields and converted; unknown fields are dropped.
pub fn validate(raw: &Value) -> Result<Vec<CountryRecord>, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let candidates: Vec<&Value> = match raw {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![raw],
        other => {
            errors.add(
                FieldPath::payload(),
                format!(
                    "Expected a list of items but got type \"{}\".",
                    type_name(other)
                ),
            );
            return Err(errors);
        }
    };

    let records: Vec<CountryRecord> = candidates
        .into_iter()
        .enumerate()
        .filter_map(|(index, candidate)| validate_candidate(index, candidate, &mut errors))
        .collect();

    if errors.is_empty() {
        Ok(records)
    } else {
        Err(errors)
    }
}
