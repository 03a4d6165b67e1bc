use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::executor::{HttpExecutor, RequestDescriptor};
use crate::extract::extract;
use crate::graph::GraphStore;
use crate::node::{NodePatch, RequestError, RequestSpec, RequestStatus, ResponseData};
use crate::validate::validate_response;

/// One record per executed node, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: String,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub result: Result<ResponseData, RequestError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub records: Vec<NodeRecord>,
    /// First node failure, if any. Failed nodes trigger no dependents, but
    /// branches already queued by earlier successes keep running.
    pub error: Option<(String, RequestError)>,
    /// Total elapsed wall time.
    pub total: Duration,
}

/// Runs a start node and propagates extracted response values into its
/// dependents. Scheduling is an explicit FIFO queue: a
/// target's parameters are written before it is enqueued, so its own
/// execution always sees them. No cycle detection is performed; a
/// connection cycle re-executes until aborted.
pub struct ExecutionEngine {
    store: Arc<GraphStore>,
    http: Arc<dyn HttpExecutor>,
}

impl ExecutionEngine {
    pub fn new(store: Arc<GraphStore>, http: Arc<dyn HttpExecutor>) -> Self {
        Self { store, http }
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    #[tracing::instrument(skip(self))]
    pub async fn run(&self, start_node_id: &str) -> ExecutionReport {
        let run_start = Utc::now();
        let mut records = Vec::new();
        let mut first_error: Option<(String, RequestError)> = None;

        let mut queue: VecDeque<String> = VecDeque::from([start_node_id.to_string()]);
        while let Some(node_id) = queue.pop_front() {
            let Some(node) = self.store.get_node(&node_id) else {
                debug!(node_id = %node_id, "skipping deleted node");
                continue;
            };

            // Entering loading clears everything from the previous attempt.
            let _ = self.store.update_node(
                &node_id,
                NodePatch {
                    status: Some(RequestStatus::Loading),
                    response: Some(None),
                    error: Some(None),
                    extracted: Some(HashMap::new()),
                    validation_outcome: Some(None),
                    ..NodePatch::default()
                },
            );

            let request = build_request(&node.request);
            let started = Utc::now();
            let result = self.http.execute(request).await;
            let finished = Utc::now();
            records.push(NodeRecord {
                node_id: node_id.clone(),
                started,
                finished,
                result: result.clone(),
            });

            match result {
                Ok(response) => {
                    let outcome = validate_response(
                        node.request.expected_status,
                        &node.request.validation,
                        &node.request.extract_path,
                        &response,
                    );
                    let _ = self.store.update_node(
                        &node_id,
                        NodePatch {
                            status: Some(RequestStatus::Success),
                            response: Some(Some(response.clone())),
                            error: Some(None),
                            validation_outcome: Some(Some(outcome)),
                            ..NodePatch::default()
                        },
                    );
                    for target in self.fan_out(&node_id, &response) {
                        queue.push_back(target);
                    }
                }
                Err(err) => {
                    info!(node_id = %node_id, error = %err, "node execution failed");
                    let _ = self.store.update_node(
                        &node_id,
                        NodePatch {
                            status: Some(RequestStatus::Error),
                            response: Some(err.response.clone()),
                            error: Some(Some(err.clone())),
                            ..NodePatch::default()
                        },
                    );
                    if first_error.is_none() {
                        first_error = Some((node_id.clone(), err));
                    }
                    // Fail fast: nothing downstream of this node fires.
                }
            }
        }

        let total = (Utc::now() - run_start).to_std().unwrap_or_default();
        ExecutionReport {
            records,
            error: first_error,
            total,
        }
    }

    /// Move extracted values into connected downstream parameters and return
    /// the node ids to enqueue, in stored connection order.
    fn fan_out(&self, node_id: &str, response: &ResponseData) -> Vec<String> {
        // Sockets are re-read from the store so edits made while the request
        // was in flight are honored.
        let Some(node) = self.store.get_node(node_id) else {
            return Vec::new();
        };

        let mut extracted_cache: HashMap<String, Value> = HashMap::new();
        let mut targets = Vec::new();

        for conn in self.store.connections_from(node_id) {
            let Some(socket) = node.output_socket(&conn.from_socket) else {
                debug!(conn_id = %conn.id, "output socket gone, skipping");
                continue;
            };
            if !socket.enabled {
                continue;
            }
            let Some(value) = extract(&response.data, &socket.path) else {
                debug!(conn_id = %conn.id, path = %socket.path, "extraction miss, skipping");
                continue;
            };
            let value = value.clone();
            extracted_cache.insert(socket.id.clone(), value.clone());

            let Some(target) = self.store.get_node(&conn.to_node) else {
                debug!(conn_id = %conn.id, "target node gone, skipping");
                continue;
            };
            let mut parameters = target.request.parameters;
            let Some(param) = parameters.iter_mut().find(|p| p.id == conn.to_socket) else {
                debug!(conn_id = %conn.id, "target parameter gone, skipping");
                continue;
            };
            param.value = value;

            let _ = self.store.update_node(
                &conn.to_node,
                NodePatch {
                    parameters: Some(parameters),
                    ..NodePatch::default()
                },
            );
            debug!(from = %node_id, to = %conn.to_node, socket = %socket.name, "propagated value");
            targets.push(conn.to_node);
        }

        if !extracted_cache.is_empty() {
            let _ = self.store.update_node(
                node_id,
                NodePatch {
                    extracted: Some(extracted_cache),
                    ..NodePatch::default()
                },
            );
        }
        targets
    }
}

/// Assemble the final request descriptor from a node's spec: enabled+keyed
/// parameters go onto the query string for GET/DELETE and are merged as
/// top-level keys into the JSON body for POST/PUT/PATCH. A body that fails
/// to parse as JSON passes through as an opaque string without merging.
pub fn build_request(spec: &RequestSpec) -> RequestDescriptor {
    let headers: HashMap<String, String> = spec
        .headers
        .iter()
        .filter(|h| h.enabled && !h.key.is_empty() && !h.value.is_empty())
        .map(|h| (h.key.clone(), h.value.clone()))
        .collect();

    let enabled_params: Vec<_> = spec
        .parameters
        .iter()
        .filter(|p| p.enabled && !p.key.is_empty())
        .collect();

    if !spec.method.has_body() {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        let mut any = false;
        for param in &enabled_params {
            let value = param.value_as_string();
            if !value.is_empty() {
                serializer.append_pair(&param.key, &value);
                any = true;
            }
        }
        let url = if any {
            format!("{}?{}", spec.url, serializer.finish())
        } else {
            spec.url.clone()
        };
        return RequestDescriptor {
            method: spec.method,
            url,
            headers,
            body: None,
        };
    }

    let body = if spec.body.is_empty() {
        Some(Value::Object(serde_json::Map::new()))
    } else {
        match serde_json::from_str::<Value>(&spec.body) {
            Ok(Value::Object(map)) => Some(Value::Object(map)),
            Ok(other) => {
                // A non-object body (array, scalar) has no top-level keys to
                // merge into; send it as configured.
                debug!("body is not a JSON object, sending unmerged");
                Some(other)
            }
            Err(e) => {
                warn!(error = %e, "body is not valid JSON, passing through as a string");
                None
            }
        }
    };

    let body = match body {
        Some(Value::Object(mut map)) => {
            for param in &enabled_params {
                if !param.value.is_null() {
                    map.insert(param.key.clone(), param.value.clone());
                }
            }
            serde_json::to_string(&Value::Object(map)).unwrap_or_default()
        }
        Some(other) => other.to_string(),
        None => spec.body.clone(),
    };

    RequestDescriptor {
        method: spec.method,
        url: spec.url.clone(),
        headers,
        body: Some(body),
    }
}
