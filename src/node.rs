use std::collections::HashMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::util::generate_id;
use crate::validate::ValidationOutcome;
use crate::viewport::Point;

pub const DEFAULT_NODE_WIDTH: f64 = 450.0;
pub const DEFAULT_EXPECTED_STATUS: u16 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum HttpMethod {
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "POST")]
    Post,
    #[serde(rename = "PUT")]
    Put,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "PATCH")]
    Patch,
}

impl HttpMethod {
    /// POST/PUT/PATCH carry a request body; GET and DELETE put their
    /// parameters on the query string instead.
    pub fn has_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared data type of a parameter or output socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HeaderEntry {
    pub id: String,
    pub key: String,
    pub value: String,
    pub enabled: bool,
}

impl HeaderEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: generate_id("header"),
            key: key.into(),
            value: value.into(),
            enabled: true,
        }
    }
}

/// An input parameter. `has_connection = true` means its value arrives over
/// a connection; the widget patch path refuses direct edits to it, but the
/// engine overwrites it freely during propagation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Parameter {
    pub id: String,
    pub key: String,
    pub value: Value,
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub enabled: bool,
    pub has_connection: bool,
}

impl Parameter {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            id: generate_id("param"),
            key: key.into(),
            value: Value::String(String::new()),
            data_type: DataType::String,
            enabled: true,
            has_connection: false,
        }
    }

    /// Render the value the way it goes onto a query string: strings as-is,
    /// everything else as compact JSON.
    pub fn value_as_string(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// An output socket exposes a path into the last response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OutputSocket {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub enabled: bool,
}

impl OutputSocket {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: generate_id("output"),
            name: name.into(),
            path: path.into(),
            data_type: DataType::String,
            enabled: true,
        }
    }
}

/// Everything the user configures about the HTTP call a node issues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RequestSpec {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<HeaderEntry>,
    pub parameters: Vec<Parameter>,
    pub output_sockets: Vec<OutputSocket>,
    pub body: String,
    #[serde(default)]
    pub extract_path: String,
    #[serde(default)]
    pub expected_status: Option<u16>,
    /// Validation expression over `status`, `data` and `headers`, evaluated
    /// by the sandboxed evaluator in `validate`.
    #[serde(default)]
    pub validation: String,
}

impl Default for RequestSpec {
    fn default() -> Self {
        Self {
            method: HttpMethod::Get,
            url: String::new(),
            headers: vec![HeaderEntry::new("Content-Type", "application/json")],
            parameters: Vec::new(),
            output_sockets: Vec::new(),
            body: String::new(),
            extract_path: String::new(),
            expected_status: Some(DEFAULT_EXPECTED_STATUS),
            validation: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResponseData {
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub data: Value,
}

impl ResponseData {
    /// A plain `200 OK` around a body, handy for mocks and tests.
    pub fn ok(data: Value) -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            headers: HashMap::new(),
            data,
        }
    }
}

/// A failed HTTP call. When the server answered with an error status the
/// response it carried is kept so its body can still be inspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Error)]
#[error("request failed: {message}")]
pub struct RequestError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseData>,
}

impl RequestError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            response: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_response(mut self, response: ResponseData) -> Self {
        self.response = Some(response);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// Per-node execution state, owned by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RuntimeState {
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RequestError>,
    /// Socket id → value extracted during the last fan-out.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extracted: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationOutcome>,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            status: RequestStatus::Idle,
            response: None,
            error: None,
            extracted: HashMap::new(),
            validation: None,
        }
    }
}

/// Node height is auto until the user grabs the resize handle. Serialized
/// as the string `"auto"` or a bare number of canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, JsonSchema)]
pub enum Dimension {
    Auto,
    Px(f64),
}

impl Serialize for Dimension {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Dimension::Auto => serializer.serialize_str("auto"),
            Dimension::Px(px) => serializer.serialize_f64(*px),
        }
    }
}

impl<'de> Deserialize<'de> for Dimension {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) if s == "auto" => Ok(Dimension::Auto),
            Value::Number(n) => n
                .as_f64()
                .map(Dimension::Px)
                .ok_or_else(|| serde::de::Error::custom("height is not a finite number")),
            other => Err(serde::de::Error::custom(format!(
                "expected \"auto\" or a number, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NodeSize {
    pub width: f64,
    pub height: Dimension,
}

impl Default for NodeSize {
    fn default() -> Self {
        Self {
            width: DEFAULT_NODE_WIDTH,
            height: Dimension::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum NodeKind {
    HttpApi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub position: Point,
    #[serde(default)]
    pub size: NodeSize,
    pub request: RequestSpec,
    #[serde(default)]
    pub runtime: RuntimeState,
}

impl Node {
    pub fn new(id: impl Into<String>, position: Point) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::HttpApi,
            position,
            size: NodeSize::default(),
            request: RequestSpec::default(),
            runtime: RuntimeState::default(),
        }
    }

    pub fn with_request(mut self, request: RequestSpec) -> Self {
        self.request = request;
        self
    }

    pub fn parameter(&self, param_id: &str) -> Option<&Parameter> {
        self.request.parameters.iter().find(|p| p.id == param_id)
    }

    pub fn output_socket(&self, socket_id: &str) -> Option<&OutputSocket> {
        self.request.output_sockets.iter().find(|s| s.id == socket_id)
    }
}

/// A shallow patch against a node. `None` leaves the field untouched; the
/// double-optioned runtime fields distinguish "leave alone" from "clear".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePatch {
    pub position: Option<Point>,
    pub size: Option<NodeSize>,
    pub method: Option<HttpMethod>,
    pub url: Option<String>,
    pub headers: Option<Vec<HeaderEntry>>,
    pub parameters: Option<Vec<Parameter>>,
    pub output_sockets: Option<Vec<OutputSocket>>,
    pub body: Option<String>,
    pub extract_path: Option<String>,
    pub expected_status: Option<Option<u16>>,
    pub validation: Option<String>,
    pub status: Option<RequestStatus>,
    pub response: Option<Option<ResponseData>>,
    pub error: Option<Option<RequestError>>,
    pub extracted: Option<HashMap<String, Value>>,
    pub validation_outcome: Option<Option<ValidationOutcome>>,
}

impl NodePatch {
    pub fn position(position: Point) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    pub fn size(size: NodeSize) -> Self {
        Self {
            size: Some(size),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Node {
    /// Shallow-merge a patch; unspecified fields keep their current value.
    pub fn apply_patch(&mut self, patch: NodePatch) {
        if let Some(position) = patch.position {
            self.position = position;
        }
        if let Some(size) = patch.size {
            self.size = size;
        }
        if let Some(method) = patch.method {
            self.request.method = method;
        }
        if let Some(url) = patch.url {
            self.request.url = url;
        }
        if let Some(headers) = patch.headers {
            self.request.headers = headers;
        }
        if let Some(parameters) = patch.parameters {
            self.request.parameters = parameters;
        }
        if let Some(output_sockets) = patch.output_sockets {
            self.request.output_sockets = output_sockets;
        }
        if let Some(body) = patch.body {
            self.request.body = body;
        }
        if let Some(extract_path) = patch.extract_path {
            self.request.extract_path = extract_path;
        }
        if let Some(expected_status) = patch.expected_status {
            self.request.expected_status = expected_status;
        }
        if let Some(validation) = patch.validation {
            self.request.validation = validation;
        }
        if let Some(status) = patch.status {
            self.runtime.status = status;
        }
        if let Some(response) = patch.response {
            self.runtime.response = response;
        }
        if let Some(error) = patch.error {
            self.runtime.error = error;
        }
        if let Some(extracted) = patch.extracted {
            self.runtime.extracted = extracted;
        }
        if let Some(validation_outcome) = patch.validation_outcome {
            self.runtime.validation = validation_outcome;
        }
    }
}
