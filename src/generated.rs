//! Tools and resources generated from the Skyvern OpenAPI document.
//!
//! Every route selected by the route maps becomes a tool, a resource or a
//! resource template. All of them share one HTTP client that carries the
//! API key as a default header.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde_json::{Map, Value};
use url::Url;

use crate::client::{API_KEY_HEADER, CLIENT_USER_AGENT};
use crate::config::SkyvernConfig;
use crate::envelope::ApiFailure;
use crate::error::{codes, Error, Result};
use crate::openapi::{
    classify, reserve_unique_name, ArgTarget, OperationSpec, RouteMap, RouteType, SpecSource,
    ToolShape,
};
use crate::protocol::{
    ContentItem, ReadResourceResult, ResourceContents, ResourceDefinition,
    ResourceTemplateDefinition, ToolCallResult, ToolDefinition,
};
use crate::resources::{Resource, ResourceRegistry, ResourceTemplate};
use crate::tools::{Tool, ToolRegistry};

/// MCP server name advertised by the generated adapter.
pub const SERVER_NAME: &str = "Skyvern";

/// Scheme prefix of generated resource URIs.
const RESOURCE_SCHEME: &str = "resource://";

/// The route maps the server is launched with: everything is a tool.
pub fn default_route_maps() -> Vec<RouteMap> {
    vec![RouteMap::all_tools()]
}

/// Everything the generated adapter publishes.
pub struct GeneratedApi {
    /// Generated tools.
    pub tools: ToolRegistry,
    /// Generated resources and templates.
    pub resources: ResourceRegistry,
    /// `info.title` of the document, if any.
    pub title: Option<String>,
}

/// Load the document and turn its routes into tools and resources.
pub async fn build(
    config: &SkyvernConfig,
    source: &dyn SpecSource,
    route_maps: &[RouteMap],
) -> Result<GeneratedApi> {
    let document = source.load().await?;
    let caller = Arc::new(HttpCaller::new(config)?);

    let mut tools = ToolRegistry::new();
    let mut resources = ResourceRegistry::new();
    let mut taken = HashSet::new();

    for op in document.operations() {
        let route_type = classify(route_maps, &op.method, &op.path);
        if route_type == RouteType::Exclude {
            tracing::debug!("Excluding {} {}", op.method, op.path);
            continue;
        }

        let name = reserve_unique_name(&mut taken, &op.base_name());
        let route = Route::new(name, &op);
        let caller = Arc::clone(&caller);
        let has_vars = !route.path_params.is_empty();

        match route_type {
            RouteType::Tool => {
                tracing::debug!("Tool '{}' -> {} {}", route.name, route.method, route.path);
                tools.register(Arc::new(GeneratedTool { route, caller }));
            }
            RouteType::Resource | RouteType::ResourceTemplate if has_vars => {
                tracing::debug!("Resource template '{}' -> {}", route.name, route.path);
                resources.register_template(Arc::new(GeneratedTemplate { route, caller }));
            }
            RouteType::Resource | RouteType::ResourceTemplate => {
                tracing::debug!("Resource '{}' -> {}", route.name, route.path);
                resources.register_resource(Arc::new(GeneratedResource { route, caller }));
            }
            RouteType::Exclude => {}
        }
    }

    Ok(GeneratedApi {
        tools,
        resources,
        title: document.title().map(str::to_string),
    })
}

/// One published route.
#[derive(Debug, Clone)]
struct Route {
    name: String,
    description: String,
    method: Method,
    path: String,
    path_params: Vec<String>,
    shape: ToolShape,
}

impl Route {
    fn new(name: String, op: &OperationSpec) -> Self {
        Self {
            name,
            description: op.tool_description(),
            method: op.method.clone(),
            path: op.path.clone(),
            path_params: op.path_params(),
            shape: op.shape(),
        }
    }

    fn internal_message(&self) -> String {
        format!(
            "An unexpected error occurred while calling the Skyvern API operation '{}'.",
            self.name
        )
    }

    fn resource_uri(&self) -> String {
        format!("{RESOURCE_SCHEME}{}", self.name)
    }

    fn template_uri(&self) -> String {
        let vars: String = self
            .path_params
            .iter()
            .map(|p| format!("/{{{p}}}"))
            .collect();
        format!("{RESOURCE_SCHEME}{}{vars}", self.name)
    }
}

/// A successful upstream reply.
struct Reply {
    body: String,
    content_type: Option<String>,
}

/// Shared HTTP client bound to the configured deployment.
struct HttpCaller {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpCaller {
    fn new(config: &SkyvernConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| Error::Config(format!("invalid SKYVERN_URL '{}': {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "SKYVERN_URL '{}' cannot carry a path",
                config.base_url
            )));
        }

        let mut api_key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| Error::Config(format!("invalid SKYVERN_API_KEY: {e}")))?;
        api_key.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, api_key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(CLIENT_USER_AGENT)
            .timeout(config.timeout)
            .build()?;

        Ok(Self { http, base_url })
    }

    /// Issue the route's request. `Err` is reserved for bad arguments; upstream
    /// trouble comes back as the inner `ApiFailure`.
    async fn call(
        &self,
        route: &Route,
        args: &Map<String, Value>,
    ) -> Result<std::result::Result<Reply, ApiFailure>> {
        for binding in route.shape.bindings.iter().filter(|b| b.required) {
            if args.get(&binding.arg).map_or(true, Value::is_null) {
                return Err(Error::InvalidParams(format!(
                    "missing required argument '{}'",
                    binding.arg
                )));
            }
        }

        let mut path_values = HashMap::new();
        let mut query: Vec<(String, String)> = Vec::new();
        let mut headers = HeaderMap::new();
        let mut body_fields = Map::new();
        let mut whole_body = None;

        for binding in &route.shape.bindings {
            let Some(value) = args.get(&binding.arg).filter(|v| !v.is_null()) else {
                continue;
            };
            match &binding.target {
                ArgTarget::Path(name) => {
                    path_values.insert(name.clone(), scalar_string(value));
                }
                ArgTarget::Query(name) => match value {
                    Value::Array(items) => {
                        query.extend(items.iter().map(|v| (name.clone(), scalar_string(v))));
                    }
                    other => query.push((name.clone(), scalar_string(other))),
                },
                ArgTarget::Header(name) => {
                    let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                        Error::InvalidParams(format!("invalid header name '{name}': {e}"))
                    })?;
                    let header_value = HeaderValue::from_str(&scalar_string(value)).map_err(|e| {
                        Error::InvalidParams(format!("invalid value for header '{name}': {e}"))
                    })?;
                    headers.insert(header, header_value);
                }
                ArgTarget::BodyField(name) => {
                    body_fields.insert(name.clone(), value.clone());
                }
                ArgTarget::Body => whole_body = Some(value.clone()),
            }
        }

        let url = self.route_url(&route.path, &path_values)?;
        let mut request = self.http.request(route.method.clone(), url).headers(headers);
        if !query.is_empty() {
            request = request.query(&query);
        }

        let expects_body = route
            .shape
            .bindings
            .iter()
            .any(|b| matches!(b.target, ArgTarget::BodyField(_)));
        if let Some(body) = whole_body {
            request = request.json(&body);
        } else if expects_body && !body_fields.is_empty() {
            request = request.json(&Value::Object(body_fields));
        }

        Ok(fetch(request).await)
    }

    /// Base URL joined with the path template, variables encoded per segment.
    fn route_url(&self, template: &str, values: &HashMap<String, String>) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| Error::Internal("base URL cannot carry a path".into()))?;
            segments.pop_if_empty();
            for segment in template.trim_start_matches('/').split('/') {
                segments.push(&substitute(segment, values)?);
            }
        }
        Ok(url)
    }
}

/// Replace every `{name}` in one path segment.
fn substitute(segment: &str, values: &HashMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|c| c + open) else {
            break;
        };
        let name = &rest[open + 1..close];
        let value = values
            .get(name)
            .ok_or_else(|| Error::InvalidParams(format!("missing path parameter '{name}'")))?;
        out.push_str(&rest[..open]);
        out.push_str(value);
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

async fn fetch(request: reqwest::RequestBuilder) -> std::result::Result<Reply, ApiFailure> {
    let response = request
        .send()
        .await
        .map_err(|e| ApiFailure::from_transport(&e))?;
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response
        .text()
        .await
        .map_err(|e| ApiFailure::from_transport(&e))?;

    if status.is_success() {
        Ok(Reply { body, content_type })
    } else {
        Err(ApiFailure::Status {
            status: status.as_u16(),
            body,
        })
    }
}

fn argument_map(arguments: Value) -> Result<Map<String, Value>> {
    match arguments {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidParams(format!(
            "arguments must be an object, got {other}"
        ))),
    }
}

struct GeneratedTool {
    route: Route,
    caller: Arc<HttpCaller>,
}

#[async_trait::async_trait]
impl Tool for GeneratedTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.route.name.clone(),
            description: self.route.description.clone(),
            input_schema: self.route.shape.input_schema.clone(),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<ToolCallResult> {
        let args = argument_map(arguments)?;
        match self.caller.call(&self.route, &args).await? {
            // JSON bodies (including bare strings) are re-rendered as JSON;
            // anything else is passed through as text.
            Ok(reply) => match serde_json::from_str::<Value>(&reply.body) {
                Ok(value) => ToolCallResult::json(&value, false),
                Err(_) => Ok(ToolCallResult {
                    content: vec![ContentItem::text(reply.body)],
                    is_error: false,
                }),
            },
            Err(failure) => {
                failure.log(&self.route.name);
                ToolCallResult::json(
                    &failure.to_envelope(&self.route.internal_message()),
                    true,
                )
            }
        }
    }
}

/// Read through a route, turning upstream failures into a JSON-RPC error that
/// carries the envelope as `data`.
async fn read_route(
    caller: &HttpCaller,
    route: &Route,
    uri: &str,
    args: Map<String, Value>,
) -> Result<ReadResourceResult> {
    match caller.call(route, &args).await? {
        Ok(reply) => Ok(ReadResourceResult {
            contents: vec![ResourceContents {
                uri: uri.to_string(),
                mime_type: Some(
                    reply
                        .content_type
                        .unwrap_or_else(|| "application/json".to_string()),
                ),
                text: reply.body,
            }],
        }),
        Err(failure) => {
            failure.log(&route.name);
            let envelope = failure.to_envelope(&route.internal_message());
            Err(Error::JsonRpc {
                code: codes::INTERNAL_ERROR,
                message: failure.to_string(),
                data: Some(envelope),
            })
        }
    }
}

struct GeneratedResource {
    route: Route,
    caller: Arc<HttpCaller>,
}

#[async_trait::async_trait]
impl Resource for GeneratedResource {
    fn definition(&self) -> ResourceDefinition {
        ResourceDefinition {
            uri: self.route.resource_uri(),
            name: self.route.name.clone(),
            description: Some(self.route.description.clone()),
            mime_type: Some("application/json".into()),
        }
    }

    async fn read(&self) -> Result<ReadResourceResult> {
        read_route(&self.caller, &self.route, &self.route.resource_uri(), Map::new()).await
    }
}

struct GeneratedTemplate {
    route: Route,
    caller: Arc<HttpCaller>,
}

#[async_trait::async_trait]
impl ResourceTemplate for GeneratedTemplate {
    fn definition(&self) -> ResourceTemplateDefinition {
        ResourceTemplateDefinition {
            uri_template: self.route.template_uri(),
            name: self.route.name.clone(),
            description: Some(self.route.description.clone()),
            mime_type: Some("application/json".into()),
        }
    }

    async fn read(
        &self,
        uri: &str,
        variables: HashMap<String, String>,
    ) -> Result<ReadResourceResult> {
        // Template variables are named after path parameters; map them onto
        // the (possibly suffixed) argument names.
        let mut args = Map::new();
        for binding in &self.route.shape.bindings {
            if let ArgTarget::Path(name) = &binding.target {
                if let Some(value) = variables.get(name) {
                    args.insert(binding.arg.clone(), Value::String(value.clone()));
                }
            }
        }
        read_route(&self.caller, &self.route, uri, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openapi::{MethodFilter, OpenApiDocument, StaticSpec};
    use axum::body::Bytes;
    use axum::http::{HeaderMap as AxumHeaders, Method as AxumMethod, StatusCode, Uri};
    use axum::routing::any;
    use axum::Router;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    #[derive(Debug, Clone)]
    struct Captured {
        method: String,
        path: String,
        query: Option<String>,
        headers: AxumHeaders,
        body: Bytes,
    }

    struct Mock {
        base_url: String,
        captured: Arc<Mutex<Vec<Captured>>>,
        shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    }

    impl Mock {
        async fn start(status: StatusCode, content_type: &'static str, reply: &'static str) -> Self {
            let captured: Arc<Mutex<Vec<Captured>>> = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&captured);

            let app = Router::new().route(
                "/{*path}",
                any(
                    move |method: AxumMethod, uri: Uri, headers: AxumHeaders, body: Bytes| {
                        let sink = Arc::clone(&sink);
                        async move {
                            sink.lock().await.push(Captured {
                                method: method.as_str().to_string(),
                                path: uri.path().to_string(),
                                query: uri.query().map(str::to_string),
                                headers,
                                body,
                            });
                            (status, [("content-type", content_type)], reply)
                        }
                    },
                ),
            );

            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            let addr = listener.local_addr().expect("local_addr");
            let (tx, rx) = tokio::sync::oneshot::channel::<()>();
            tokio::spawn(async move {
                let _ = axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = rx.await;
                    })
                    .await;
            });

            Self {
                base_url: format!("http://{addr}"),
                captured,
                shutdown: Some(tx),
            }
        }

        async fn requests(&self) -> Vec<Captured> {
            self.captured.lock().await.clone()
        }
    }

    impl Drop for Mock {
        fn drop(&mut self) {
            if let Some(tx) = self.shutdown.take() {
                let _ = tx.send(());
            }
        }
    }

    fn skyvern_doc() -> OpenApiDocument {
        OpenApiDocument::from_value(
            json!({
                "openapi": "3.1.0",
                "info": {"title": "Skyvern API", "version": "1.0"},
                "paths": {
                    "/v1/run/tasks": {"post": {
                        "operationId": "run_task",
                        "summary": "Run a task",
                        "requestBody": {"required": true, "content": {"application/json": {
                            "schema": {
                                "type": "object",
                                "properties": {
                                    "prompt": {"type": "string"},
                                    "url": {"type": "string"}
                                },
                                "required": ["prompt"]
                            }
                        }}}
                    }},
                    "/v1/runs/{run_id}": {"get": {
                        "operationId": "get_run",
                        "parameters": [
                            {"name": "run_id", "in": "path", "required": true,
                             "schema": {"type": "string"}},
                            {"name": "tags", "in": "query",
                             "schema": {"type": "array", "items": {"type": "string"}}}
                        ]
                    }},
                    "/v1/runs/{run_id}/cancel": {"post": {
                        "operationId": "cancel_run",
                        "parameters": [
                            {"name": "run_id", "in": "path", "required": true,
                             "schema": {"type": "string"}}
                        ]
                    }},
                    "/v1/workflows": {"get": {}}
                }
            }),
            "test",
        )
        .unwrap()
    }

    async fn build_against(base_url: &str, maps: &[RouteMap]) -> GeneratedApi {
        let config = SkyvernConfig::new(base_url, "test-key");
        build(&config, &StaticSpec::new(skyvern_doc()), maps)
            .await
            .unwrap()
    }

    /// Serve an arbitrary router; dropping the sender stops it.
    async fn serve(app: Router) -> (String, tokio::sync::oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local_addr");
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await;
        });
        (format!("http://{addr}"), tx)
    }

    fn text_of(result: &ToolCallResult) -> &str {
        result.content[0].as_text()
    }

    #[tokio::test]
    async fn blanket_map_makes_one_tool_per_route() {
        let api = build_against("http://127.0.0.1:9", &default_route_maps()).await;
        assert_eq!(
            api.tools.names(),
            vec!["run_task", "get_run", "cancel_run", "get_v1_workflows"]
        );
        assert!(api.resources.is_empty());
        assert_eq!(api.title.as_deref(), Some("Skyvern API"));
    }

    #[tokio::test]
    async fn substitutes_path_and_forwards_query_and_key() {
        let mock = Mock::start(StatusCode::OK, "application/json", r#"{"status":"running"}"#).await;
        let api = build_against(&mock.base_url, &default_route_maps()).await;

        let result = api
            .tools
            .execute("get_run", json!({"run_id": "tsk 1/x", "tags": ["a", "b"]}))
            .await
            .unwrap();
        assert!(!result.is_error);
        let body: Value = serde_json::from_str(text_of(&result)).unwrap();
        assert_eq!(body, json!({"status": "running"}));

        let reqs = mock.requests().await;
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].method, "GET");
        assert_eq!(reqs[0].path, "/v1/runs/tsk%201%2Fx");
        assert_eq!(reqs[0].query.as_deref(), Some("tags=a&tags=b"));
        assert_eq!(reqs[0].headers.get("x-api-key").unwrap(), "test-key");
        assert!(reqs[0]
            .headers
            .get("user-agent")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("skyvern-mcp/"));
    }

    #[tokio::test]
    async fn flattened_body_is_sent_as_json() {
        let mock = Mock::start(StatusCode::OK, "application/json", r#"{"run_id":"tsk_1"}"#).await;
        let api = build_against(&mock.base_url, &default_route_maps()).await;

        api.tools
            .execute("run_task", json!({"prompt": "find the price", "url": "https://x"}))
            .await
            .unwrap();

        let reqs = mock.requests().await;
        assert_eq!(reqs[0].method, "POST");
        assert_eq!(reqs[0].path, "/v1/run/tasks");
        let sent: Value = serde_json::from_slice(&reqs[0].body).unwrap();
        assert_eq!(sent, json!({"prompt": "find the price", "url": "https://x"}));
    }

    #[tokio::test]
    async fn non_json_reply_is_returned_as_text() {
        let mock = Mock::start(StatusCode::OK, "text/plain", "cancelled").await;
        let api = build_against(&mock.base_url, &default_route_maps()).await;

        let result = api
            .tools
            .execute("cancel_run", json!({"run_id": "tsk_1"}))
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(text_of(&result), "cancelled");
    }

    #[tokio::test]
    async fn json_string_reply_keeps_its_quotes() {
        let mock = Mock::start(StatusCode::OK, "application/json", r#""ok""#).await;
        let api = build_against(&mock.base_url, &default_route_maps()).await;

        let result = api
            .tools
            .execute("cancel_run", json!({"run_id": "tsk_1"}))
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(text_of(&result), r#""ok""#);
        let decoded: Value = serde_json::from_str(text_of(&result)).unwrap();
        assert_eq!(decoded, json!("ok"));
    }

    #[tokio::test]
    async fn redirect_is_reported_not_followed() {
        let app = Router::new()
            .route(
                "/v1/runs/{run_id}/cancel",
                any(|| async { (StatusCode::FOUND, [("location", "/elsewhere")], "moved") }),
            )
            .route(
                "/elsewhere",
                any(|| async {
                    (
                        StatusCode::OK,
                        [("content-type", "application/json")],
                        r#"{"followed":true}"#,
                    )
                }),
            );
        let (base_url, _stop) = serve(app).await;
        let api = build_against(&base_url, &default_route_maps()).await;

        let result = api
            .tools
            .execute("cancel_run", json!({"run_id": "abc123"}))
            .await
            .unwrap();
        assert!(result.is_error);
        let envelope: Value = serde_json::from_str(text_of(&result)).unwrap();
        assert_eq!(envelope["error"], "SkyvernAPIError");
        assert_eq!(envelope["status_code"], 302);
        assert_eq!(envelope["details"], "moved");
    }

    #[tokio::test]
    async fn error_status_returns_envelope_flagged_as_error() {
        let mock = Mock::start(StatusCode::NOT_FOUND, "text/plain", "no such run").await;
        let api = build_against(&mock.base_url, &default_route_maps()).await;

        let result = api
            .tools
            .execute("get_run", json!({"run_id": "missing"}))
            .await
            .unwrap();
        assert!(result.is_error);
        let envelope: Value = serde_json::from_str(text_of(&result)).unwrap();
        assert_eq!(
            envelope,
            json!({
                "error": "SkyvernAPIError",
                "message": "Skyvern API request failed with status 404",
                "details": "no such run",
                "status_code": 404
            })
        );
    }

    #[tokio::test]
    async fn unreachable_upstream_is_network_error() {
        let api = build_against("http://127.0.0.1:9", &default_route_maps()).await;
        let result = api
            .tools
            .execute("get_run", json!({"run_id": "tsk_1"}))
            .await
            .unwrap();
        assert!(result.is_error);
        let envelope: Value = serde_json::from_str(text_of(&result)).unwrap();
        assert_eq!(envelope["error"], "NetworkError");
    }

    #[tokio::test]
    async fn missing_required_argument_makes_no_request() {
        let mock = Mock::start(StatusCode::OK, "application/json", "{}").await;
        let api = build_against(&mock.base_url, &default_route_maps()).await;

        let err = api.tools.execute("get_run", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::InvalidParams(msg) if msg.contains("run_id")));

        let err = api.tools.execute("run_task", json!({"url": "u"})).await.unwrap_err();
        assert!(matches!(err, Error::InvalidParams(msg) if msg.contains("prompt")));

        let err = api.tools.execute("get_run", json!([1])).await.unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));

        assert!(mock.requests().await.is_empty());
    }

    #[tokio::test]
    async fn route_maps_publish_resources_and_templates() {
        let mock = Mock::start(StatusCode::OK, "application/json", r#"{"id":"tsk_1"}"#).await;
        let maps = vec![
            RouteMap::new(MethodFilter::Any, "cancel", RouteType::Exclude).unwrap(),
            RouteMap::new(
                MethodFilter::Only(vec![Method::GET]),
                ".*",
                RouteType::ResourceTemplate,
            )
            .unwrap(),
        ];
        let api = build_against(&mock.base_url, &maps).await;

        assert_eq!(api.tools.names(), vec!["run_task"]);
        let templates = api.resources.list_templates();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].uri_template, "resource://get_run/{run_id}");
        // No path variables: published as a plain resource.
        let resources = api.resources.list_resources();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].uri, "resource://get_v1_workflows");

        let read = api.resources.read("resource://get_run/tsk_1").await.unwrap();
        assert_eq!(read.contents[0].uri, "resource://get_run/tsk_1");
        assert_eq!(read.contents[0].text, r#"{"id":"tsk_1"}"#);
        assert_eq!(read.contents[0].mime_type.as_deref(), Some("application/json"));
        assert_eq!(mock.requests().await[0].path, "/v1/runs/tsk_1");

        // Encoded template values are decoded once and re-encoded once.
        api.resources.read("resource://get_run/a%20b").await.unwrap();
        assert_eq!(mock.requests().await[1].path, "/v1/runs/a%20b");
    }

    #[tokio::test]
    async fn failed_resource_read_carries_envelope() {
        let mock = Mock::start(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "boom").await;
        let maps = vec![RouteMap::new(
            MethodFilter::Only(vec![Method::GET]),
            ".*",
            RouteType::Resource,
        )
        .unwrap()];
        let api = build_against(&mock.base_url, &maps).await;

        let err = api
            .resources
            .read("resource://get_v1_workflows")
            .await
            .unwrap_err();
        match err {
            Error::JsonRpc { code, data, .. } => {
                assert_eq!(code, codes::INTERNAL_ERROR);
                assert_eq!(data.unwrap()["status_code"], 500);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn base_path_is_preserved() {
        let mock = Mock::start(StatusCode::OK, "application/json", "{}").await;
        let api = build_against(&format!("{}/api", mock.base_url), &default_route_maps()).await;
        api.tools
            .execute("cancel_run", json!({"run_id": "r"}))
            .await
            .unwrap();
        assert_eq!(mock.requests().await[0].path, "/api/v1/runs/r/cancel");
    }

    #[tokio::test]
    async fn invalid_base_url_fails_build() {
        let config = SkyvernConfig::new("not a url", "k");
        let err = build(&config, &StaticSpec::new(skyvern_doc()), &default_route_maps())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn substitutes_mixed_segments() {
        let values = HashMap::from([("ext".to_string(), "json".to_string())]);
        assert_eq!(substitute("file.{ext}", &values).unwrap(), "file.json");
        assert!(substitute("{missing}", &values).is_err());
    }
}
