//! Prompts sent to the language model: response explanations and the
//! optional guided introduction to the fields being collected.

use tracing::debug;

use crate::dispatch::ApiResponse;
use crate::error::Result;
use crate::llm::LanguageModel;
use crate::spec::EndpointDescriptor;

/// Response bodies longer than this are cut before being sent to the model.
const MAX_BODY_CHARS: usize = 8_000;

pub fn explanation_prompt(endpoint: Option<&str>, response: &ApiResponse) -> String {
    let body = truncate(&response.body.to_string(), MAX_BODY_CHARS);
    let mut prompt = String::from("Explain this API response in simple terms.\n\n");
    if let Some(endpoint) = endpoint {
        prompt.push_str(&format!("Endpoint: {endpoint}\n"));
    }
    prompt.push_str(&format!("Status: {}\n", response.status));
    if let Some(content_type) = response.header("content-type") {
        prompt.push_str(&format!("Content-Type: {content_type}\n"));
    }
    prompt.push_str(&format!("Body:\n{body}\n"));
    prompt
}

/// Ask `llm` to explain `response`.
///
/// Errors are [`crate::AssistError::LlmUnavailable`]; callers are expected to
/// degrade to showing the raw response.
pub fn explain(
    llm: &dyn LanguageModel,
    endpoint: Option<&str>,
    response: &ApiResponse,
) -> Result<String> {
    let prompt = explanation_prompt(endpoint, response);
    debug!(endpoint = endpoint.unwrap_or("-"), status = response.status, "requesting explanation");
    llm.generate(&prompt)
}

pub fn introduction_prompt(descriptor: &EndpointDescriptor) -> String {
    let fields: Vec<String> = descriptor
        .inputs()
        .map(|f| format!("- {} ({})", f.name, f.kind))
        .collect();
    format!(
        "Given the following API request inputs for {}:\n\n{}\n\n\
         Act as an interactive API assistant. Briefly explain, in a conversational \
         way, what the user will be asked for and what each input means. \
         Mention the expected type where it is not plain text.",
        descriptor.label(),
        fields.join("\n")
    )
}

/// Ask `llm` for a short introduction to the inputs `descriptor` needs.
/// Returns `Ok(None)` when there is nothing to collect.
pub fn introduce_fields(
    llm: &dyn LanguageModel,
    descriptor: &EndpointDescriptor,
) -> Result<Option<String>> {
    if descriptor.inputs().next().is_none() {
        return Ok(None);
    }
    llm.generate(&introduction_prompt(descriptor)).map(Some)
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}\n... (truncated)", &s[..idx]),
        None => s.to_string(),
    }
}
