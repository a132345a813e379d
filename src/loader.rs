//! Fetch and parse the OpenAPI document.

use reqwest::blocking::Client;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{AssistError, Result};

/// Join a base URL and a path without doubling or dropping the slash.
pub fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Fetch the OpenAPI document at `base_url` + `spec_path` and parse it.
///
/// Issues exactly one request. Transport failures and non-success statuses
/// are [`AssistError::SpecFetch`]/[`AssistError::SpecStatus`]; a body that is
/// not a JSON object is [`AssistError::SpecParse`]/[`AssistError::SpecShape`].
pub fn fetch_spec(client: &Client, base_url: &str, spec_path: &str) -> Result<Value> {
    let url = join_url(base_url, spec_path);
    debug!(%url, "fetching OpenAPI document");

    let fetch_err = |source: reqwest::Error| AssistError::SpecFetch {
        url: url.clone(),
        source,
    };
    let resp = client.get(&url).send().map_err(fetch_err)?;
    let status = resp.status();
    if !status.is_success() {
        return Err(AssistError::SpecStatus {
            url: url.clone(),
            status,
        });
    }
    let text = resp.text().map_err(fetch_err)?;

    let spec = parse_spec(&text)?;
    info!(
        %url,
        paths = spec.get("paths").and_then(|p| p.as_object()).map_or(0, |p| p.len()),
        "loaded OpenAPI document"
    );
    Ok(spec)
}

/// Parse a JSON OpenAPI document. The root must be an object.
pub fn parse_spec(text: &str) -> Result<Value> {
    let spec: Value = serde_json::from_str(text).map_err(AssistError::SpecParse)?;
    if !spec.is_object() {
        return Err(AssistError::SpecShape);
    }
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(join_url("http://h:8000", "/openapi.json"), "http://h:8000/openapi.json");
        assert_eq!(join_url("http://h:8000/", "/openapi.json"), "http://h:8000/openapi.json");
        assert_eq!(join_url("http://h:8000", "openapi.json"), "http://h:8000/openapi.json");
    }

    #[test]
    fn parse_spec_rejects_malformed_json() {
        let err = parse_spec("{not json").unwrap_err();
        assert!(matches!(err, AssistError::SpecParse(_)), "got: {err:?}");
    }

    #[test]
    fn parse_spec_rejects_non_object_root() {
        let err = parse_spec("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, AssistError::SpecShape), "got: {err:?}");
    }

    #[test]
    fn fetch_spec_parses_document() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/openapi.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"openapi":"3.0.0","paths":{"/login":{}}}"#)
            .expect(1)
            .create();

        let spec = fetch_spec(&Client::new(), &server.url(), "/openapi.json").unwrap();
        assert_eq!(spec["openapi"], "3.0.0");
        assert!(spec["paths"].get("/login").is_some());
        mock.assert();
    }

    #[test]
    fn fetch_spec_reports_non_success_status() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/openapi.json")
            .with_status(404)
            .with_body("not found")
            .create();

        let err = fetch_spec(&Client::new(), &server.url(), "/openapi.json").unwrap_err();
        let err_msg = err.to_string();
        assert!(err_msg.contains("404"), "error should contain status, got: {err_msg}");
    }

    #[test]
    fn fetch_spec_reports_malformed_body_as_parse_error() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/openapi.json")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create();

        let err = fetch_spec(&Client::new(), &server.url(), "/openapi.json").unwrap_err();
        assert!(matches!(err, AssistError::SpecParse(_)), "got: {err:?}");
    }

    #[test]
    fn fetch_spec_reports_unreachable_host_as_fetch_error() {
        // port 1 is reserved and never listening
        let err = fetch_spec(&Client::new(), "http://127.0.0.1:1", "/openapi.json").unwrap_err();
        assert!(matches!(err, AssistError::SpecFetch { .. }), "got: {err:?}");
    }
}
