//! Collected inputs → HTTP request dispatch
//!
//! Takes an endpoint descriptor and the values the user supplied, constructs
//! one HTTP request, and returns the response whatever its status.

use std::fmt;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::collect::UserInputSet;
use crate::error::{AssistError, Result};
use crate::loader::join_url;
use crate::session::Session;
use crate::spec::{EndpointDescriptor, Location};

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Response body, parsed as JSON when possible.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

/// One completed HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body as JSON, if it parsed as JSON.
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Json(v) => Some(v),
            ResponseBody::Text(_) => None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(v) => match serde_json::to_string_pretty(v) {
                Ok(s) => f.write_str(&s),
                Err(_) => write!(f, "{v}"),
            },
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Send one request for `descriptor` built from `inputs`.
///
/// Path parameters are substituted into the template, query parameters go
/// into the query string, header parameters go into headers, everything else
/// is the body. Undeclared inputs go where their placement says. The session token is sent as
/// `Authorization: Bearer` when the endpoint requires one. Only transport
/// failures are errors; 4xx/5xx come back as an [`ApiResponse`].
pub fn dispatch(
    client: &Client,
    base_url: &str,
    descriptor: &EndpointDescriptor,
    inputs: &UserInputSet,
    session: &Session,
) -> Result<ApiResponse> {
    let url = build_url(base_url, descriptor, inputs);
    let query_pairs = build_query_pairs(descriptor, inputs);
    let body = build_body(descriptor, inputs);
    let inject_token = descriptor.requires_bearer && session.has_token();
    let headers = collect_headers(descriptor, inputs, inject_token);

    let method: Method =
        descriptor
            .method
            .parse()
            .map_err(|_| AssistError::UnsupportedMethod {
                method: descriptor.method.clone(),
            })?;

    let mut req = client.request(method, &url);

    if let Some(token) = session.token().filter(|_| inject_token) {
        req = req.bearer_auth(token);
    }
    if !query_pairs.is_empty() {
        req = req.query(&query_pairs);
    }
    for (name, val) in &headers {
        req = req.header(name, val);
    }
    if let Some(body) = body {
        req = if is_form(&descriptor.content_type) {
            let pairs: Vec<(&str, &str)> = body
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str().unwrap_or_default()))
                .collect();
            req.form(&pairs)
        } else {
            req.header(CONTENT_TYPE, &descriptor.content_type)
                .json(&Value::Object(body))
        };
    }

    info!(endpoint = %descriptor.label(), %url, bearer = inject_token, "sending request");
    send_request(req, &url)
}

fn is_form(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|ct| ct.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
}

fn build_url(base_url: &str, descriptor: &EndpointDescriptor, inputs: &UserInputSet) -> String {
    let mut url = join_url(base_url, &descriptor.path);
    let declared = descriptor
        .path_params
        .iter()
        .filter_map(|p| Some((p.name.as_str(), inputs.get(&p.name)?)));
    for (name, val) in declared.chain(inputs.placed(Location::Path)) {
        url = url.replace(&format!("{{{name}}}"), &urlencoding::encode(val));
    }
    url
}

fn build_query_pairs(descriptor: &EndpointDescriptor, inputs: &UserInputSet) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for param in &descriptor.query_params {
        if let Some(val) = inputs.get(&param.name) {
            pairs.push((param.name.clone(), val.to_string()));
        }
    }
    for (name, val) in inputs.placed(Location::Query) {
        pairs.push((name.to_string(), val.to_string()));
    }
    pairs
}

/// Body fields in declaration order, then any extra inputs (e.g. fields the
/// server reported missing) that are not declared or placed elsewhere.
fn build_body(descriptor: &EndpointDescriptor, inputs: &UserInputSet) -> Option<Map<String, Value>> {
    let mut obj = Map::new();
    for field in &descriptor.body_fields {
        if let Some(val) = inputs.get(&field.name) {
            obj.insert(field.name.clone(), Value::String(val.to_string()));
        }
    }
    for (name, val) in inputs.iter() {
        let elsewhere = descriptor.is_header(name)
            || descriptor.is_path_param(name)
            || descriptor.is_query_param(name)
            || inputs.placement(name).is_some_and(|l| l != Location::Body);
        if !obj.contains_key(name) && !elsewhere {
            obj.insert(name.to_string(), Value::String(val.to_string()));
        }
    }

    if obj.is_empty() && !descriptor.has_body {
        return None;
    }
    Some(obj)
}

fn collect_headers(
    descriptor: &EndpointDescriptor,
    inputs: &UserInputSet,
    inject_token: bool,
) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    for param in &descriptor.header_params {
        if inject_token && param.name.eq_ignore_ascii_case(AUTHORIZATION.as_str()) {
            continue;
        }
        if let Some(val) = inputs.get(&param.name) {
            headers.push((param.name.clone(), val.to_string()));
        }
    }
    for (name, val) in inputs.placed(Location::Header) {
        if inject_token && name.eq_ignore_ascii_case(AUTHORIZATION.as_str()) {
            continue;
        }
        headers.push((name.to_string(), val.to_string()));
    }
    headers
}

fn send_request(req: reqwest::blocking::RequestBuilder, url: &str) -> Result<ApiResponse> {
    let network_err = |source: reqwest::Error| AssistError::Network {
        url: url.to_string(),
        source,
    };
    let resp = req.send().map_err(network_err)?;
    let status = resp.status();
    let headers = resp
        .headers()
        .iter()
        .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
        .collect();
    let text = resp.text().map_err(network_err)?;
    debug!(status = status.as_u16(), bytes = text.len(), "received response");

    let body = match serde_json::from_str(&text) {
        Ok(value) => ResponseBody::Json(value),
        Err(_) => ResponseBody::Text(text),
    };
    Ok(ApiResponse {
        status: status.as_u16(),
        headers,
        body,
    })
}
