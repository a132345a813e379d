//! The end-to-end run.
//!
//! `Loading → Extracting → Collecting → Requesting → Auditing →
//! (Collecting → Requesting, once) → Propagating → Explaining`, then the same
//! again for each follow-up endpoint with the session carried along.

use std::io::{BufRead, Write};

use reqwest::blocking::Client;
use tracing::{info, warn};

use crate::audit::{MissingField, MissingFieldDetector};
use crate::collect::{Collector, UserInputSet};
use crate::config::Config;
use crate::dispatch::{dispatch, ApiResponse};
use crate::error::Result;
use crate::explain::{explain, introduce_fields};
use crate::llm::LanguageModel;
use crate::loader::fetch_spec;
use crate::session::{is_login_endpoint, propagate_token, Session};
use crate::spec::{extract_endpoint, EndpointDescriptor, Field};

/// Result of the audit step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audit {
    Complete,
    Missing(Vec<MissingField>),
}

/// What happened for one endpoint.
#[derive(Debug, Clone)]
pub struct EndpointOutcome {
    pub label: String,
    /// The final response: the corrective one when a resend happened
    pub response: ApiResponse,
    /// Whether a corrective resend was made
    pub resent: bool,
    pub token_captured: bool,
    /// `None` when explanations are disabled or the model was unavailable
    pub explanation: Option<String>,
}

/// Drives one run against a target API.
pub struct Assistant<'a, R, W> {
    client: Client,
    config: &'a Config,
    llm: &'a dyn LanguageModel,
    detector: &'a dyn MissingFieldDetector,
    collector: Collector<R, W>,
}

impl<'a, R: BufRead, W: Write> Assistant<'a, R, W> {
    pub fn new(
        client: Client,
        config: &'a Config,
        llm: &'a dyn LanguageModel,
        detector: &'a dyn MissingFieldDetector,
        collector: Collector<R, W>,
    ) -> Self {
        Self {
            client,
            config,
            llm,
            detector,
            collector,
        }
    }

    /// Load the document, then run the target endpoint and every follow-up.
    ///
    /// All endpoints are resolved before the first prompt, so an unknown
    /// endpoint fails before the user has typed anything.
    pub fn run(&mut self, session: &mut Session) -> Result<Vec<EndpointOutcome>> {
        let spec = fetch_spec(&self.client, &self.config.base_url, &self.config.spec_path)?;

        let descriptors = std::iter::once(&self.config.target)
            .chain(&self.config.follow_ups)
            .map(|t| extract_endpoint(&spec, &t.path, &t.method))
            .collect::<Result<Vec<_>>>()?;

        let mut outcomes = Vec::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            outcomes.push(self.run_endpoint(descriptor, session)?);
        }
        Ok(outcomes)
    }

    /// Collect, request, audit (with at most one corrective resend),
    /// propagate the token, explain.
    pub fn run_endpoint(
        &mut self,
        descriptor: &EndpointDescriptor,
        session: &mut Session,
    ) -> Result<EndpointOutcome> {
        info!(endpoint = %descriptor.label(), "running endpoint");
        self.print_summary(descriptor)?;
        if self.config.guided {
            self.introduce(descriptor)?;
        }

        let mut inputs = self.collector.collect(descriptor, session.has_token())?;
        let first = self.send(descriptor, &inputs, session)?;

        let (response, resent) = match self.audit(&first) {
            Audit::Complete => (first, false),
            Audit::Missing(missing) => {
                let names: Vec<&str> = missing.iter().map(|f| f.name.as_str()).collect();
                self.collector.say(format!(
                    "API response indicates missing fields: {}",
                    names.join(", ")
                ))?;
                self.collector
                    .collect_missing(descriptor, &missing, &mut inputs)?;
                // The corrective response is final, whatever it says.
                (self.send(descriptor, &inputs, session)?, true)
            }
        };

        let token_captured = is_login_endpoint(descriptor, &self.config.login_hints)
            && propagate_token(&response, session);
        if token_captured {
            self.collector.say(
                "Bearer token captured; it will be sent to endpoints that require authentication.",
            )?;
        }

        let explanation = if self.config.explain {
            self.explain_response(descriptor, &response)?
        } else {
            None
        };

        Ok(EndpointOutcome {
            label: descriptor.label(),
            response,
            resent,
            token_captured,
            explanation,
        })
    }

    pub fn audit(&self, response: &ApiResponse) -> Audit {
        let missing = self.detector.detect(response);
        if missing.is_empty() {
            Audit::Complete
        } else {
            info!(?missing, "response reports missing fields");
            Audit::Missing(missing)
        }
    }

    pub fn into_collector(self) -> Collector<R, W> {
        self.collector
    }

    fn send(
        &mut self,
        descriptor: &EndpointDescriptor,
        inputs: &UserInputSet,
        session: &Session,
    ) -> Result<ApiResponse> {
        let response = dispatch(&self.client, &self.config.base_url, descriptor, inputs, session)?;
        self.collector
            .say(format!("Response: HTTP {}", response.status))?;
        self.collector.say(&response.body)?;
        Ok(response)
    }

    fn print_summary(&mut self, descriptor: &EndpointDescriptor) -> Result<()> {
        let heading = if descriptor.summary.is_empty() {
            format!("== {}", descriptor.label())
        } else {
            format!("== {}: {}", descriptor.label(), descriptor.summary)
        };
        self.collector.say(heading)?;
        if !descriptor.path_params.is_empty() {
            self.collector
                .say(format!("Path Parameters: {}", list_fields(&descriptor.path_params)))?;
        }
        if !descriptor.query_params.is_empty() {
            self.collector
                .say(format!("Query Parameters: {}", list_fields(&descriptor.query_params)))?;
        }
        self.collector
            .say(format!("Required Fields: {}", list_fields(&descriptor.body_fields)))?;
        self.collector
            .say(format!("Content Type: {}", descriptor.content_type))?;
        self.collector
            .say(format!("Required Headers: {}", list_fields(&descriptor.header_params)))
    }

    fn introduce(&mut self, descriptor: &EndpointDescriptor) -> Result<()> {
        match introduce_fields(self.llm, descriptor) {
            Ok(Some(intro)) => self.collector.say(intro),
            Ok(None) => Ok(()),
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "skipping guided introduction");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn explain_response(
        &mut self,
        descriptor: &EndpointDescriptor,
        response: &ApiResponse,
    ) -> Result<Option<String>> {
        let label = descriptor.label();
        match explain(self.llm, Some(&label), response) {
            Ok(text) => {
                self.collector.say(format!("Explanation:\n{text}"))?;
                Ok(Some(text))
            }
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "explanation unavailable");
                self.collector.say(format!(
                    "Explanation unavailable ({e}); the raw response above is final."
                ))?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

fn list_fields(fields: &[Field]) -> String {
    if fields.is_empty() {
        return "(none)".to_string();
    }
    fields
        .iter()
        .map(|f| format!("{} ({})", f.name, f.kind))
        .collect::<Vec<_>>()
        .join(", ")
}
