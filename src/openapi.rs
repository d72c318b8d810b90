//! OpenAPI document loading and route-to-tool mapping.
//!
//! Schemas are kept as raw JSON so both OpenAPI 3.0 and 3.1 documents load;
//! only the structure needed to turn routes into callable operations is
//! interpreted here. Execution lives in [`crate::generated`].

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use reqwest::Method;
use serde_json::{json, Map, Value};

use crate::error::{Error, Result};

/// Depth at which nested `$ref` inlining stops.
const MAX_REF_DEPTH: usize = 8;

/// Longest tool name MCP clients accept.
const MAX_TOOL_NAME_LEN: usize = 64;

/// HTTP methods an OpenAPI path item may declare, in document order.
const PATH_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

// ============================================================================
// Document
// ============================================================================

/// A parsed OpenAPI document.
#[derive(Debug, Clone)]
pub struct OpenApiDocument {
    raw: Value,
}

impl OpenApiDocument {
    /// Wrap an already-decoded document.
    pub fn from_value(raw: Value, location: &str) -> Result<Self> {
        let parse_err = |message: &str| Error::SpecParse {
            location: location.to_string(),
            message: message.to_string(),
        };

        let obj = raw
            .as_object()
            .ok_or_else(|| parse_err("document is not an object"))?;
        if !obj.contains_key("openapi") && !obj.contains_key("swagger") {
            return Err(parse_err("missing 'openapi' version field"));
        }
        if !obj.get("paths").is_some_and(Value::is_object) {
            return Err(parse_err("missing 'paths' object"));
        }
        Ok(Self { raw })
    }

    /// Parse JSON or YAML text.
    pub fn parse(text: &str, location: &str) -> Result<Self> {
        let raw: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(json_err) => serde_yaml::from_str(text).map_err(|yaml_err| Error::SpecParse {
                location: location.to_string(),
                message: format!("not JSON ({json_err}) nor YAML ({yaml_err})"),
            })?,
        };
        Self::from_value(raw, location)
    }

    /// `info.title`, if present.
    pub fn title(&self) -> Option<&str> {
        self.raw.pointer("/info/title").and_then(Value::as_str)
    }

    /// Follow a chain of local `$ref`s. Unresolvable refs yield `None`.
    pub fn resolve<'a>(&'a self, mut value: &'a Value) -> Option<&'a Value> {
        for _ in 0..MAX_REF_DEPTH {
            match value.get("$ref").and_then(Value::as_str) {
                Some(reference) => value = self.lookup(reference)?,
                None => return Some(value),
            }
        }
        None
    }

    fn lookup(&self, reference: &str) -> Option<&Value> {
        let pointer = reference.strip_prefix('#')?;
        let pointer = pointer
            .split('/')
            .map(|token| token.replace("~1", "/").replace("~0", "~"))
            .collect::<Vec<_>>()
            .join("/");
        self.raw.pointer(&pointer)
    }

    /// Copy `schema` with local `$ref`s inlined.
    ///
    /// Cyclic, external or too-deep references become an unconstrained `{}`.
    pub fn inline_schema(&self, schema: &Value) -> Value {
        self.inline_at(schema, 0, &mut Vec::new())
    }

    fn inline_at(&self, schema: &Value, depth: usize, stack: &mut Vec<String>) -> Value {
        match schema {
            Value::Object(map) => {
                if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                    if depth >= MAX_REF_DEPTH || stack.iter().any(|r| r == reference) {
                        return json!({});
                    }
                    let Some(target) = self.lookup(reference) else {
                        return json!({});
                    };
                    stack.push(reference.to_string());
                    let mut inlined = self.inline_at(target, depth + 1, stack);
                    stack.pop();

                    // Sibling keywords (3.1) override the referenced schema.
                    if let Value::Object(target_map) = &mut inlined {
                        for (key, value) in map.iter().filter(|(k, _)| *k != "$ref") {
                            target_map.insert(key.clone(), self.inline_at(value, depth, stack));
                        }
                    }
                    return inlined;
                }
                Value::Object(
                    map.iter()
                        .map(|(k, v)| (k.clone(), self.inline_at(v, depth, stack)))
                        .collect(),
                )
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.inline_at(v, depth, stack))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Every operation in the document, in path then method order.
    pub fn operations(&self) -> Vec<OperationSpec> {
        let mut out = Vec::new();
        let Some(paths) = self.raw.get("paths").and_then(Value::as_object) else {
            return out;
        };

        for (path, item) in paths {
            let Some(item) = self.resolve(item).and_then(Value::as_object) else {
                tracing::warn!("Skipping path '{}': unresolvable path item", path);
                continue;
            };
            let shared = self.parameters(item.get("parameters"));

            for method in PATH_METHODS {
                let Some(op) = item.get(method).and_then(Value::as_object) else {
                    continue;
                };
                let Ok(http_method) = method.to_uppercase().parse::<Method>() else {
                    continue;
                };

                // Operation-level parameters override path-level ones.
                let own = self.parameters(op.get("parameters"));
                let mut parameters: Vec<ParamSpec> = shared
                    .iter()
                    .filter(|p| {
                        !own.iter()
                            .any(|o| o.name == p.name && o.location == p.location)
                    })
                    .cloned()
                    .collect();
                parameters.extend(own);

                out.push(OperationSpec {
                    method: http_method,
                    path: path.clone(),
                    operation_id: str_field(op, "operationId"),
                    summary: str_field(op, "summary"),
                    description: str_field(op, "description"),
                    parameters,
                    body: self.request_body(op.get("requestBody")),
                });
            }
        }
        out
    }

    fn parameters(&self, list: Option<&Value>) -> Vec<ParamSpec> {
        let Some(list) = list.and_then(Value::as_array) else {
            return Vec::new();
        };
        list.iter()
            .filter_map(|p| self.resolve(p))
            .filter_map(|p| {
                let name = p.get("name")?.as_str()?.to_string();
                let location = ParamLocation::parse(p.get("in")?.as_str()?)?;
                let schema = p
                    .get("schema")
                    .map(|s| self.inline_schema(s))
                    .unwrap_or_else(|| json!({"type": "string"}));
                Some(ParamSpec {
                    required: location == ParamLocation::Path
                        || p.get("required").and_then(Value::as_bool).unwrap_or(false),
                    description: p
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    name,
                    location,
                    schema,
                })
            })
            .collect()
    }

    fn request_body(&self, body: Option<&Value>) -> Option<BodySpec> {
        let body = self.resolve(body?)?;
        let content = body.get("content")?.as_object()?;
        let (content_type, media) = content
            .iter()
            .find(|(ct, _)| ct.starts_with("application/json") || ct.ends_with("+json"))
            .or_else(|| content.iter().next())?;
        let schema = media
            .get("schema")
            .map(|s| self.inline_schema(s))
            .unwrap_or_else(|| json!({}));
        Some(BodySpec {
            required: body.get("required").and_then(Value::as_bool).unwrap_or(false),
            description: body
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            content_type: content_type.clone(),
            schema,
        })
    }
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// Where a parameter travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamLocation {
    /// Substituted into the path template.
    Path,
    /// Appended to the query string.
    Query,
    /// Sent as a request header.
    Header,
    /// Sent as a cookie (not forwarded).
    Cookie,
}

impl ParamLocation {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
        }
    }
}

/// A declared parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    /// Wire name.
    pub name: String,
    /// Location.
    pub location: ParamLocation,
    /// Whether the caller must supply it.
    pub required: bool,
    /// Inlined JSON schema.
    pub schema: Value,
    /// Description.
    pub description: Option<String>,
}

/// A declared request body.
#[derive(Debug, Clone)]
pub struct BodySpec {
    /// Whether the body is required.
    pub required: bool,
    /// Media type the schema came from.
    pub content_type: String,
    /// Inlined JSON schema.
    pub schema: Value,
    /// Description.
    pub description: Option<String>,
}

/// One (path, method) pair of the document.
#[derive(Debug, Clone)]
pub struct OperationSpec {
    /// HTTP method.
    pub method: Method,
    /// Path template, e.g. `/v1/runs/{run_id}`.
    pub path: String,
    /// `operationId`.
    pub operation_id: Option<String>,
    /// `summary`.
    pub summary: Option<String>,
    /// `description`.
    pub description: Option<String>,
    /// Merged parameters.
    pub parameters: Vec<ParamSpec>,
    /// Request body.
    pub body: Option<BodySpec>,
}

impl OperationSpec {
    /// Tool name before de-duplication.
    pub fn base_name(&self) -> String {
        match &self.operation_id {
            Some(id) => sanitize_name(id),
            None => canonical_name(self.method.as_str(), &self.path),
        }
    }

    /// Summary, else description, else a generated line.
    pub fn tool_description(&self) -> String {
        self.summary
            .clone()
            .or_else(|| self.description.clone())
            .unwrap_or_else(|| format!("Calls {} {}", self.method, self.path))
    }

    /// Names of path parameters in template order.
    pub fn path_params(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut rest = self.path.as_str();
        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}') else { break };
            names.push(rest[open + 1..open + close].to_string());
            rest = &rest[open + close + 1..];
        }
        names
    }

    /// Build the tool input schema and the argument bindings that go with it.
    pub fn shape(&self) -> ToolShape {
        let mut properties = Map::new();
        let mut required: Vec<String> = Vec::new();
        let mut bindings = Vec::new();

        let body_fields: Option<(&Map<String, Value>, HashSet<String>)> =
            self.body.as_ref().and_then(|body| {
                let props = body.schema.get("properties")?.as_object()?;
                let req = body
                    .schema
                    .get("required")
                    .and_then(Value::as_array)
                    .map(|r| r.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_default();
                Some((props, req))
            });
        let body_names: HashSet<&str> = body_fields
            .as_ref()
            .map(|(props, _)| props.keys().map(String::as_str).collect())
            .unwrap_or_default();

        for param in &self.parameters {
            if param.location == ParamLocation::Cookie {
                tracing::debug!(
                    "Not exposing cookie parameter '{}' of {} {}",
                    param.name,
                    self.method,
                    self.path
                );
                continue;
            }
            let arg = if body_names.contains(param.name.as_str())
                || (body_fields.is_none() && self.body.is_some() && param.name == "body")
            {
                format!("{}__{}", param.name, param.location.as_str())
            } else {
                param.name.clone()
            };

            let mut schema = param.schema.clone();
            if let (Some(desc), Value::Object(map)) = (&param.description, &mut schema) {
                map.entry("description").or_insert_with(|| json!(desc));
            }
            properties.insert(arg.clone(), schema);
            if param.required {
                required.push(arg.clone());
            }
            bindings.push(ArgBinding {
                arg,
                target: match param.location {
                    ParamLocation::Path => ArgTarget::Path(param.name.clone()),
                    ParamLocation::Query => ArgTarget::Query(param.name.clone()),
                    _ => ArgTarget::Header(param.name.clone()),
                },
                required: param.required,
            });
        }

        match (&self.body, body_fields) {
            (Some(body), Some((props, body_required))) => {
                for (name, schema) in props {
                    properties.insert(name.clone(), schema.clone());
                    let is_required = body.required && body_required.contains(name);
                    if is_required {
                        required.push(name.clone());
                    }
                    bindings.push(ArgBinding {
                        arg: name.clone(),
                        target: ArgTarget::BodyField(name.clone()),
                        required: is_required,
                    });
                }
            }
            (Some(body), None) => {
                let mut schema = body.schema.clone();
                if let (Some(desc), Value::Object(map)) = (&body.description, &mut schema) {
                    map.entry("description").or_insert_with(|| json!(desc));
                }
                properties.insert("body".into(), schema);
                if body.required {
                    required.push("body".into());
                }
                bindings.push(ArgBinding {
                    arg: "body".into(),
                    target: ArgTarget::Body,
                    required: body.required,
                });
            }
            (None, _) => {}
        }

        let mut input_schema = json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            input_schema["required"] = json!(required);
        }

        ToolShape {
            input_schema,
            bindings,
        }
    }
}

/// Input schema plus argument routing for one operation.
#[derive(Debug, Clone)]
pub struct ToolShape {
    /// JSON schema advertised to clients.
    pub input_schema: Value,
    /// How each argument reaches the request.
    pub bindings: Vec<ArgBinding>,
}

/// Maps one tool argument onto the outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgBinding {
    /// Argument name in the tool schema.
    pub arg: String,
    /// Destination.
    pub target: ArgTarget,
    /// Whether the argument must be present.
    pub required: bool,
}

/// Destination of a tool argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgTarget {
    /// Path template variable.
    Path(String),
    /// Query parameter.
    Query(String),
    /// Request header.
    Header(String),
    /// Top-level field of a JSON object body.
    BodyField(String),
    /// The entire body.
    Body,
}

/// Tool name from method and path, e.g. `get_v1_runs_run_id`.
pub fn canonical_name(method: &str, path: &str) -> String {
    sanitize_name(&format!("{}_{}", method.to_lowercase(), path))
}

/// Restrict a name to `[A-Za-z0-9_-]`, collapse `_` runs and cap the length.
pub fn sanitize_name(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' };
        if c == '_' && name.ends_with('_') {
            continue;
        }
        name.push(c);
    }
    let mut name = name.trim_matches('_').to_string();
    name.truncate(MAX_TOOL_NAME_LEN);
    if name.is_empty() {
        name.push_str("operation");
    }
    name
}

/// Reserve `base`, or `base_1`, `base_2`, … if taken. Suffixed names are
/// shortened to stay within the tool name limit; `base` must be ASCII.
pub fn reserve_unique_name(taken: &mut HashSet<String>, base: &str) -> String {
    if taken.insert(base.to_string()) {
        return base.to_string();
    }
    let mut counter = 1;
    loop {
        let suffix = format!("_{counter}");
        let keep = base.len().min(MAX_TOOL_NAME_LEN.saturating_sub(suffix.len()));
        let candidate = format!("{}{suffix}", &base[..keep]);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

// ============================================================================
// Route maps
// ============================================================================

/// What a route becomes on the MCP surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteType {
    /// A callable tool.
    Tool,
    /// A readable resource with a fixed URI.
    Resource,
    /// A resource addressed through path variables.
    ResourceTemplate,
    /// Not published.
    Exclude,
}

/// Which methods a [`RouteMap`] applies to.
#[derive(Debug, Clone)]
pub enum MethodFilter {
    /// Every method.
    Any,
    /// Only these methods.
    Only(Vec<Method>),
}

/// A single route mapping rule.
#[derive(Debug, Clone)]
pub struct RouteMap {
    methods: MethodFilter,
    // `None` matches every path.
    pattern: Option<Regex>,
    route_type: RouteType,
}

impl RouteMap {
    /// Create a rule. `pattern` is searched (not anchored) in the path.
    pub fn new(methods: MethodFilter, pattern: &str, route_type: RouteType) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::Config(format!("invalid route pattern '{pattern}': {e}")))?;
        Ok(Self {
            methods,
            pattern: Some(pattern),
            route_type,
        })
    }

    /// The blanket rule: every method, every path, as a tool.
    pub fn all_tools() -> Self {
        Self {
            methods: MethodFilter::Any,
            pattern: None,
            route_type: RouteType::Tool,
        }
    }

    /// Whether this rule applies.
    pub fn matches(&self, method: &Method, path: &str) -> bool {
        let method_ok = match &self.methods {
            MethodFilter::Any => true,
            MethodFilter::Only(list) => list.contains(method),
        };
        method_ok && self.pattern.as_ref().map_or(true, |p| p.is_match(path))
    }

    /// Route type assigned on match.
    pub fn route_type(&self) -> RouteType {
        self.route_type
    }
}

/// First matching rule wins; unmatched routes become tools.
pub fn classify(maps: &[RouteMap], method: &Method, path: &str) -> RouteType {
    maps.iter()
        .find(|m| m.matches(method, path))
        .map_or(RouteType::Tool, RouteMap::route_type)
}

// ============================================================================
// Spec sources
// ============================================================================

/// Something that can produce an OpenAPI document.
#[async_trait::async_trait]
pub trait SpecSource: Send + Sync {
    /// Human-readable location, for logs and errors.
    fn location(&self) -> &str;

    /// Load and parse the document.
    async fn load(&self) -> Result<OpenApiDocument>;
}

/// Fetches the document over HTTP(S).
pub struct RemoteSpec {
    url: String,
    http: reqwest::Client,
}

impl RemoteSpec {
    /// Create a source for `url`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            http: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait::async_trait]
impl SpecSource for RemoteSpec {
    fn location(&self) -> &str {
        &self.url
    }

    async fn load(&self) -> Result<OpenApiDocument> {
        tracing::info!("Fetching OpenAPI spec from {}", self.url);
        let fetch_err = |message: String| Error::SpecFetch {
            location: self.url.clone(),
            message,
        };

        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fetch_err(format!("HTTP {status}")));
        }
        let text = response.text().await.map_err(|e| fetch_err(e.to_string()))?;
        OpenApiDocument::parse(&text, &self.url)
    }
}

/// Reads the document from disk.
pub struct FileSpec {
    path: PathBuf,
    display: String,
}

impl FileSpec {
    /// Create a source for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display = path.display().to_string();
        Self { path, display }
    }
}

#[async_trait::async_trait]
impl SpecSource for FileSpec {
    fn location(&self) -> &str {
        &self.display
    }

    async fn load(&self) -> Result<OpenApiDocument> {
        tracing::info!("Loading OpenAPI spec from {}", self.display);
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::SpecFetch {
                location: self.display.clone(),
                message: e.to_string(),
            })?;
        OpenApiDocument::parse(&text, &self.display)
    }
}

/// An in-memory document.
pub struct StaticSpec {
    document: OpenApiDocument,
}

impl StaticSpec {
    /// Wrap a decoded document.
    pub fn new(document: OpenApiDocument) -> Self {
        Self { document }
    }
}

#[async_trait::async_trait]
impl SpecSource for StaticSpec {
    fn location(&self) -> &str {
        "<static>"
    }

    async fn load(&self) -> Result<OpenApiDocument> {
        Ok(self.document.clone())
    }
}

/// Pick a source for a configured location: URLs are fetched, anything else
/// is read as a file path.
pub fn spec_source(location: &str, timeout: Duration) -> Result<Box<dyn SpecSource>> {
    if location.starts_with("http://") || location.starts_with("https://") {
        Ok(Box::new(RemoteSpec::new(location, timeout)?))
    } else {
        Ok(Box::new(FileSpec::new(location)))
    }
}
