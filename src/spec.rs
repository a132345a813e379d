//! OpenAPI document → endpoint descriptor
//!
//! Walks a parsed OpenAPI JSON tree to find what one operation needs from the
//! user: required path parameters, required body fields, required headers and
//! the request content type. Everything here is a pure function over the
//! immutable document.

use serde_json::Value;

use crate::error::{AssistError, Result};

/// Content type used when an operation declares no request body media type.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Maximum number of `$ref` hops / composition levels followed while walking
/// a schema. Cyclic documents stop here instead of recursing forever.
const MAX_SCHEMA_DEPTH: usize = 16;

/// A named input together with its declared schema type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    /// JSON schema `type` (e.g. "string", "integer"); "string" when undeclared
    pub kind: String,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
        }
    }
}

/// Where a parameter travels in the request (the OpenAPI `in` value, with
/// the request body as its own place).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Path,
    Query,
    Header,
    Body,
}

impl Location {
    /// Parse an OpenAPI `in` value or a validation-error location prefix.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "body" => Some(Self::Body),
            _ => None,
        }
    }
}

/// Everything the assistant needs to know about one (path, method) pair.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct EndpointDescriptor {
    /// HTTP method, uppercase
    pub method: String,
    /// URL path template (e.g. "/orders/{orderId}")
    pub path: String,
    /// Summary text, empty when the operation has none
    pub summary: String,
    /// Path parameters in template order
    pub path_params: Vec<Field>,
    /// Required query parameters in declaration order
    pub query_params: Vec<Field>,
    /// Required request body fields in declaration order
    pub body_fields: Vec<Field>,
    /// Required header parameters in declaration order
    pub header_params: Vec<Field>,
    /// First declared request media type, or [`DEFAULT_CONTENT_TYPE`]
    pub content_type: String,
    /// Whether the operation declares a request body at all
    pub has_body: bool,
    /// Whether the operation expects an `Authorization: Bearer` credential
    pub requires_bearer: bool,
}

impl EndpointDescriptor {
    /// `METHOD /path`, used in prompts and log lines.
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    /// Whether `name` is one of the declared header parameters.
    /// Header names compare case-insensitively.
    pub fn is_header(&self, name: &str) -> bool {
        self.header_params
            .iter()
            .any(|h| h.name.eq_ignore_ascii_case(name))
    }

    pub fn is_path_param(&self, name: &str) -> bool {
        self.path_params.iter().any(|p| p.name == name)
    }

    pub fn is_query_param(&self, name: &str) -> bool {
        self.query_params.iter().any(|p| p.name == name)
    }

    /// The declared input called `name` and where it is sent, if any.
    /// Header names compare case-insensitively, everything else exactly.
    pub fn find_input(&self, name: &str) -> Option<(&Field, Location)> {
        find_exact(&self.path_params, name, Location::Path)
            .or_else(|| find_exact(&self.query_params, name, Location::Query))
            .or_else(|| find_exact(&self.body_fields, name, Location::Body))
            .or_else(|| {
                self.header_params
                    .iter()
                    .find(|h| h.name.eq_ignore_ascii_case(name))
                    .map(|h| (h, Location::Header))
            })
    }

    /// Every input to prompt for: path, query, body, then header.
    pub fn inputs(&self) -> impl Iterator<Item = &Field> {
        self.path_params
            .iter()
            .chain(&self.query_params)
            .chain(&self.body_fields)
            .chain(&self.header_params)
    }
}

fn find_exact<'a>(fields: &'a [Field], name: &str, location: Location) -> Option<(&'a Field, Location)> {
    fields.iter().find(|f| f.name == name).map(|f| (f, location))
}

/// A single operation parameter as declared in the document.
#[derive(Debug, Clone)]
struct Param {
    name: String,
    location: String,
    required: bool,
    kind: String,
}

/// Find `method path` in `spec` and derive its [`EndpointDescriptor`].
///
/// Fails with [`AssistError::EndpointNotFound`] when the path or the method
/// is not declared.
pub fn extract_endpoint(spec: &Value, path: &str, method: &str) -> Result<EndpointDescriptor> {
    let not_found = || AssistError::EndpointNotFound {
        method: method.to_uppercase(),
        path: path.to_string(),
    };

    let path_item = spec
        .get("paths")
        .and_then(|p| p.get(path))
        .and_then(|item| resolve(spec, item))
        .ok_or_else(not_found)?;
    let operation = path_item
        .get(method.to_lowercase())
        .filter(|op| op.is_object())
        .ok_or_else(not_found)?;

    let summary = operation
        .get("summary")
        .or_else(|| operation.get("description"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let params = collect_params(spec, path_item.get("parameters"), operation.get("parameters"));

    let mut path_params: Vec<Field> = params
        .iter()
        .filter(|p| p.location == "path")
        .map(|p| Field::new(&p.name, &p.kind))
        .collect();
    // Sort path params by position in path template
    path_params.sort_by_cached_key(|p| path.find(&format!("{{{}}}", p.name)).unwrap_or(usize::MAX));

    let query_params: Vec<Field> = params
        .iter()
        .filter(|p| p.location == "query" && p.required)
        .map(|p| Field::new(&p.name, &p.kind))
        .collect();

    let header_params: Vec<Field> = params
        .iter()
        .filter(|p| p.location == "header" && p.required)
        .map(|p| Field::new(&p.name, &p.kind))
        .collect();

    let (content_type, body_schema) = extract_body(spec, operation);
    let has_body = content_type.is_some();
    let content_type = content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
    let body_fields = body_schema
        .map(|schema| required_fields(spec, schema, 0))
        .unwrap_or_default();

    let requires_bearer = declares_bearer(spec, operation)
        || params
            .iter()
            .any(|p| p.location == "header" && p.name.eq_ignore_ascii_case("authorization"));

    Ok(EndpointDescriptor {
        method: method.to_uppercase(),
        path: path.to_string(),
        summary,
        path_params,
        query_params,
        body_fields,
        header_params,
        content_type,
        has_body,
        requires_bearer,
    })
}

/// Follow local `$ref` pointers (`#/components/...`) until a concrete node is
/// reached. External or dangling references resolve to `None`.
fn resolve<'a>(spec: &'a Value, mut node: &'a Value) -> Option<&'a Value> {
    for _ in 0..MAX_SCHEMA_DEPTH {
        match node.get("$ref").and_then(|r| r.as_str()) {
            None => return Some(node),
            Some(reference) => node = spec.pointer(reference.strip_prefix('#')?)?,
        }
    }
    None
}

/// Merge path-level + operation-level parameters, keeping declaration order.
/// Operation-level overrides path-level per OpenAPI spec. Header names are
/// case-insensitive, so `X-Id` and `x-id` are the same header.
fn collect_params(
    spec: &Value,
    path_level: Option<&Value>,
    operation_level: Option<&Value>,
) -> Vec<Param> {
    let mut params: Vec<Param> = Vec::new();

    for source in [path_level, operation_level].iter().flatten() {
        let Some(entries) = source.as_array() else {
            continue;
        };
        for entry in entries {
            let Some(param) = resolve(spec, entry).and_then(|p| parse_param(spec, p)) else {
                continue;
            };
            match params.iter_mut().find(|p| p.same_as(&param)) {
                Some(existing) => *existing = param,
                None => params.push(param),
            }
        }
    }

    params
}

impl Param {
    fn same_as(&self, other: &Param) -> bool {
        if self.location != other.location {
            return false;
        }
        if self.location == "header" {
            self.name.eq_ignore_ascii_case(&other.name)
        } else {
            self.name == other.name
        }
    }
}

/// Parse a single parameter from its JSON representation.
fn parse_param(spec: &Value, param: &Value) -> Option<Param> {
    let name = param.get("name")?.as_str()?.to_string();
    let location = param.get("in")?.as_str()?.to_string();
    // Path parameters are always required, whatever the document says
    let required = location == "path"
        || param
            .get("required")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
    let kind = param
        .get("schema")
        .map(|s| schema_type(spec, s))
        .unwrap_or_else(|| "string".to_string());

    Some(Param {
        name,
        location,
        required,
        kind,
    })
}

/// Returns the first declared media type and its schema.
fn extract_body<'a>(spec: &'a Value, operation: &'a Value) -> (Option<String>, Option<&'a Value>) {
    let first = operation
        .get("requestBody")
        .and_then(|rb| resolve(spec, rb))
        .and_then(|rb| rb.get("content"))
        .and_then(|c| c.as_object())
        .and_then(|c| c.iter().next());

    match first {
        Some((media_type, entry)) => (Some(media_type.clone()), entry.get("schema")),
        None => (None, None),
    }
}

/// Required property names of `schema`, with `allOf`/`oneOf`/`anyOf` branches
/// flattened by ordered union.
fn required_fields(spec: &Value, schema: &Value, depth: usize) -> Vec<Field> {
    if depth > MAX_SCHEMA_DEPTH {
        return Vec::new();
    }
    let Some(schema) = resolve(spec, schema) else {
        return Vec::new();
    };

    let properties = schema.get("properties");
    let mut fields: Vec<Field> = Vec::new();

    let own = schema
        .get("required")
        .and_then(|r| r.as_array())
        .into_iter()
        .flatten()
        .filter_map(|n| n.as_str())
        .map(|name| {
            let kind = properties
                .and_then(|p| p.get(name))
                .map(|s| schema_type(spec, s))
                .unwrap_or_else(|| "string".to_string());
            Field::new(name, kind)
        });

    let branches = ["allOf", "oneOf", "anyOf"]
        .iter()
        .filter_map(|key| schema.get(*key).and_then(|b| b.as_array()))
        .flatten()
        .flat_map(|branch| required_fields(spec, branch, depth + 1));

    for field in own.chain(branches) {
        if !fields.iter().any(|f| f.name == field.name) {
            fields.push(field);
        }
    }
    fields
}

/// Declared `type` of a schema. `anyOf`/`oneOf` (e.g. `Optional[int]`) use the
/// first non-null branch.
fn schema_type(spec: &Value, schema: &Value) -> String {
    let Some(schema) = resolve(spec, schema) else {
        return "string".to_string();
    };
    if let Some(kind) = schema.get("type").and_then(|t| t.as_str()) {
        return kind.to_string();
    }
    ["anyOf", "oneOf", "allOf"]
        .iter()
        .filter_map(|key| schema.get(*key).and_then(|b| b.as_array()))
        .flatten()
        .filter_map(|branch| resolve(spec, branch))
        .filter_map(|branch| branch.get("type").and_then(|t| t.as_str()))
        .find(|kind| *kind != "null")
        .unwrap_or("string")
        .to_string()
}

/// Whether the effective security requirement of `operation` calls for a
/// bearer credential. An explicit empty `security: []` opts out.
fn declares_bearer(spec: &Value, operation: &Value) -> bool {
    let Some(requirements) = operation
        .get("security")
        .or_else(|| spec.get("security"))
        .and_then(|s| s.as_array())
    else {
        return false;
    };

    requirements
        .iter()
        .filter_map(|r| r.as_object())
        .flat_map(|r| r.keys())
        .any(|scheme| is_bearer_scheme(spec, scheme))
}

/// Schemes not declared under `components.securitySchemes` are assumed to be
/// bearer schemes.
fn is_bearer_scheme(spec: &Value, name: &str) -> bool {
    let Some(scheme) = spec
        .get("components")
        .and_then(|c| c.get("securitySchemes"))
        .and_then(|s| s.get(name))
        .and_then(|s| resolve(spec, s))
    else {
        return true;
    };

    match scheme.get("type").and_then(|t| t.as_str()) {
        Some("http") => scheme
            .get("scheme")
            .and_then(|s| s.as_str())
            .is_some_and(|s| s.eq_ignore_ascii_case("bearer")),
        Some("oauth2") | Some("openIdConnect") => true,
        _ => false,
    }
}
