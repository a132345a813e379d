//! Detection of "missing field" indications in API responses.
//!
//! APIs report missing input in many shapes, so detection sits behind
//! [`MissingFieldDetector`]. [`DetailMarker`] understands list-of-errors
//! payloads such as FastAPI/pydantic validation errors and is configurable
//! for other APIs using the same layout with different keys.

use serde_json::Value;
use tracing::{debug, warn};

use crate::dispatch::ApiResponse;
use crate::llm::LanguageModel;
use crate::spec::Location;

/// A field the server reported missing, with where it said the field goes
/// when the report carries that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingField {
    pub name: String,
    pub location: Option<Location>,
}

impl MissingField {
    pub fn new(name: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            name: name.into(),
            location,
        }
    }
}

/// Finds required fields a response says were missing.
pub trait MissingFieldDetector {
    /// Newly-required fields, in the order the response lists them.
    /// Empty when the response carries no missing-field indication.
    fn detect(&self, response: &ApiResponse) -> Vec<MissingField>;
}

/// Marker-based detector for error lists like
/// `{"detail": [{"type": "missing", "loc": ["body", "item_id"]}]}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailMarker {
    /// Key of the error list in the response body
    pub list_key: String,
    /// Key of each entry's error kind
    pub kind_key: String,
    /// Substring of the kind that means "missing"
    pub kind_marker: String,
    /// Key of each entry's location: either the name itself, or a list whose
    /// last element is the name and whose first element, when the list has
    /// more than one, says where it goes (`"query"`, `"header"`, ...)
    pub location_key: String,
}

impl Default for DetailMarker {
    fn default() -> Self {
        Self {
            list_key: "detail".to_string(),
            kind_key: "type".to_string(),
            kind_marker: "missing".to_string(),
            location_key: "loc".to_string(),
        }
    }
}

impl DetailMarker {
    fn missing_field(&self, entry: &Value) -> Option<MissingField> {
        match entry.get(&self.location_key)? {
            Value::String(name) => Some(MissingField::new(name.as_str(), None)),
            Value::Array(loc) => {
                let name = loc.last()?.as_str()?;
                let location = match loc.as_slice() {
                    [first, _, ..] => first.as_str().and_then(Location::parse),
                    _ => None,
                };
                Some(MissingField::new(name, location))
            }
            _ => None,
        }
    }
}

impl MissingFieldDetector for DetailMarker {
    fn detect(&self, response: &ApiResponse) -> Vec<MissingField> {
        let Some(entries) = response
            .json()
            .and_then(|body| body.get(&self.list_key))
            .and_then(|list| list.as_array())
        else {
            return Vec::new();
        };

        let mut fields: Vec<MissingField> = Vec::new();
        for entry in entries {
            let is_missing = entry
                .get(&self.kind_key)
                .and_then(|k| k.as_str())
                .is_some_and(|k| k.contains(self.kind_marker.as_str()));
            if !is_missing {
                continue;
            }
            let Some(field) = self.missing_field(entry).filter(|f| !f.name.is_empty()) else {
                continue;
            };
            if !fields.iter().any(|f| f.name == field.name) {
                fields.push(field);
            }
        }
        fields
    }
}

/// Marker-gated detector that asks a language model to name the missing
/// fields, falling back to the marker's own findings. Names the marker also
/// found keep the marker's location.
pub struct LlmAssisted<'a> {
    llm: &'a dyn LanguageModel,
    marker: DetailMarker,
}

impl<'a> LlmAssisted<'a> {
    pub fn new(llm: &'a dyn LanguageModel, marker: DetailMarker) -> Self {
        Self { llm, marker }
    }
}

impl MissingFieldDetector for LlmAssisted<'_> {
    fn detect(&self, response: &ApiResponse) -> Vec<MissingField> {
        let fallback = self.marker.detect(response);
        if fallback.is_empty() {
            return fallback;
        }

        let prompt = format!(
            "Given the following API response:\n\n{}\n\n\
             Extract the list of missing fields that are required by the API. \
             Return only the list of field names as a JSON array of strings, \
             formatted exactly like this: [\"field1\", \"field2\"]. \
             Do not include any additional text or explanations.",
            response.body
        );
        match self.llm.generate(&prompt) {
            Ok(answer) => match parse_name_list(&answer) {
                Some(names) if !names.is_empty() => names
                    .into_iter()
                    .map(|name| {
                        let location = fallback
                            .iter()
                            .find(|f| f.name == name)
                            .and_then(|f| f.location);
                        MissingField::new(name, location)
                    })
                    .collect(),
                _ => {
                    debug!(%answer, "model answer was not a field list, using marker names");
                    fallback
                }
            },
            Err(e) => {
                warn!(error = %e, "missing-field extraction fell back to marker");
                fallback
            }
        }
    }
}

/// Parse the first `[...]` span of `text` as a list of strings.
fn parse_name_list(text: &str) -> Option<Vec<String>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    let names: Vec<String> = serde_json::from_str(&text[start..=end]).ok()?;
    let mut unique: Vec<String> = Vec::new();
    for name in names.into_iter().filter(|n| !n.trim().is_empty()) {
        if !unique.contains(&name) {
            unique.push(name);
        }
    }
    Some(unique)
}
