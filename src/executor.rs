use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use crate::node::{HttpMethod, RequestError, ResponseData};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// The final request handed to the transport after parameter merging.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

/// The transport boundary. The engine hands a descriptor over and gets back
/// a response or a captured failure; timeouts are this collaborator's job.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn execute(&self, request: RequestDescriptor) -> Result<ResponseData, RequestError>;
}

/// Production executor backed by reqwest.
pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new(timeout: Duration) -> Result<Self, RequestError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RequestError::new(format!("failed to build http client: {e}")))?;
        Ok(Self { client })
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Patch => reqwest::Method::PATCH,
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, request: RequestDescriptor) -> Result<ResponseData, RequestError> {
        debug!(method = %request.method, url = %request.url, "executing request");

        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            let mut err = RequestError::new(e.to_string());
            if e.is_timeout() {
                err = err.with_code("TIMEOUT");
            } else if e.is_connect() {
                err = err.with_code("CONNECTION");
            }
            err
        })?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|value| (k.to_string(), value.to_string()))
            })
            .collect();
        let text = response
            .text()
            .await
            .map_err(|e| RequestError::new(format!("failed to read body: {e}")))?;
        let data = serde_json::from_str(&text).unwrap_or(Value::String(text));

        let response_data = ResponseData {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            data,
        };

        if status.is_success() {
            Ok(response_data)
        } else {
            // The server answered; keep the response so its body can still
            // feed the node's error display.
            Err(
                RequestError::new(format!("request failed with status {}", status.as_u16()))
                    .with_code(status.as_u16().to_string())
                    .with_response(response_data),
            )
        }
    }
}

/// Scripted executor for tests and offline demos: responses are registered
/// per URL (query strings are matched by prefix) and every received request
/// is recorded for later assertions.
#[derive(Default)]
pub struct MockExecutor {
    responses: DashMap<String, Result<ResponseData, RequestError>>,
    requests: Mutex<Vec<RequestDescriptor>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, url: impl Into<String>, response: ResponseData) -> Self {
        self.responses.insert(url.into(), Ok(response));
        self
    }

    pub fn on_error(self, url: impl Into<String>, error: RequestError) -> Self {
        self.responses.insert(url.into(), Err(error));
        self
    }

    pub fn requests(&self) -> Vec<RequestDescriptor> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpExecutor for MockExecutor {
    async fn execute(&self, request: RequestDescriptor) -> Result<ResponseData, RequestError> {
        self.requests.lock().unwrap().push(request.clone());
        let base_url = request.url.split('?').next().unwrap_or(&request.url);
        match self.responses.get(base_url) {
            Some(scripted) => scripted.clone(),
            None => Err(RequestError::new(format!(
                "no scripted response for `{base_url}`"
            ))
            .with_code("UNMATCHED")),
        }
    }
}
