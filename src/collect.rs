//! Interactive collection of the values an endpoint needs.
//!
//! The collector owns the text interface: it writes prompts and run output to
//! one writer and reads answers, one line each, from one reader. Blank answers
//! are kept as literal empty values.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use crate::audit::MissingField;
use crate::error::{AssistError, Result};
use crate::spec::{EndpointDescriptor, Field, Location};

/// Values supplied by the user, keyed by field/header/parameter name.
///
/// Entries are only ever inserted or overwritten, never removed. Names the
/// endpoint does not declare may carry a placement reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInputSet {
    values: BTreeMap<String, String>,
    placements: BTreeMap<String, Location>,
}

impl UserInputSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Insert an undeclared value that must be sent in `location`.
    pub fn insert_at(&mut self, name: impl Into<String>, value: impl Into<String>, location: Location) {
        let name = name.into();
        self.placements.insert(name.clone(), location);
        self.values.insert(name, value.into());
    }

    pub fn placement(&self, name: &str) -> Option<Location> {
        self.placements.get(name).copied()
    }

    /// Undeclared values placed in `location`, by name.
    pub fn placed(&self, location: Location) -> impl Iterator<Item = (&str, &str)> {
        self.placements
            .iter()
            .filter(move |(_, l)| **l == location)
            .filter_map(move |(name, _)| Some((name.as_str(), self.get(name)?)))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Line-oriented prompt/answer interface.
pub struct Collector<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Collector<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Write one line of run output.
    pub fn say(&mut self, line: impl std::fmt::Display) -> Result<()> {
        writeln!(self.output, "{line}").map_err(AssistError::Input)
    }

    /// Prompt for a single value: `name (type): `.
    ///
    /// End of input yields an empty value.
    pub fn prompt(&mut self, field: &Field) -> Result<String> {
        write!(self.output, "{} ({}): ", field.name, field.kind).map_err(AssistError::Input)?;
        self.output.flush().map_err(AssistError::Input)?;

        let mut line = String::new();
        self.input.read_line(&mut line).map_err(AssistError::Input)?;
        let value = line.trim_end_matches(['\n', '\r']);
        Ok(value.to_string())
    }

    /// Prompt for every input `descriptor` requires: path parameters, query
    /// parameters, body fields, then headers.
    ///
    /// With `has_token`, an `Authorization` header is left for the request
    /// executor to fill from the session instead of being asked for.
    pub fn collect(
        &mut self,
        descriptor: &EndpointDescriptor,
        has_token: bool,
    ) -> Result<UserInputSet> {
        let mut inputs = UserInputSet::new();

        let skip_authorization = has_token && descriptor.requires_bearer;

        for field in descriptor.inputs() {
            if skip_authorization
                && descriptor.is_header(&field.name)
                && field.name.eq_ignore_ascii_case("authorization")
            {
                continue;
            }
            if inputs.contains(&field.name) {
                continue;
            }
            let value = self.prompt(field)?;
            inputs.insert(field.name.clone(), value);
        }
        Ok(inputs)
    }

    /// Re-prompt for `missing` only, overwriting whatever `inputs` held.
    ///
    /// Declared inputs keep their declared name and place (headers match
    /// case-insensitively). Anything else goes where the server said, or in
    /// the body when it did not say.
    pub fn collect_missing(
        &mut self,
        descriptor: &EndpointDescriptor,
        missing: &[MissingField],
        inputs: &mut UserInputSet,
    ) -> Result<()> {
        for reported in missing {
            match descriptor.find_input(&reported.name) {
                Some((field, _)) => {
                    let field = field.clone();
                    let value = self.prompt(&field)?;
                    inputs.insert(field.name, value);
                }
                None => {
                    let field = Field::new(reported.name.as_str(), "string");
                    let value = self.prompt(&field)?;
                    let location = reported.location.unwrap_or(Location::Body);
                    inputs.insert_at(field.name, value, location);
                }
            }
        }
        Ok(())
    }

    pub fn into_parts(self) -> (R, W) {
        (self.input, self.output)
    }
}
