use std::sync::RwLock;

use dashmap::DashMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::node::{HeaderEntry, Node, NodePatch, OutputSocket, Parameter};

/// A directed edge from an output socket to a downstream parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Connection {
    pub id: String,
    pub from_node: String,
    pub from_socket: String,
    pub to_node: String,
    pub to_socket: String,
}

impl Connection {
    pub fn new(
        id: impl Into<String>,
        from_node: impl Into<String>,
        from_socket: impl Into<String>,
        to_node: impl Into<String>,
        to_socket: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            from_node: from_node.into(),
            from_socket: from_socket.into(),
            to_node: to_node.into(),
            to_socket: to_socket.into(),
        }
    }

    fn same_tuple(&self, other: &Connection) -> bool {
        self.from_node == other.from_node
            && self.from_socket == other.from_socket
            && self.to_node == other.to_node
            && self.to_socket == other.to_socket
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("node `{0}` not found")]
    NotFound(String),
    #[error("an identical connection already exists")]
    DuplicateConnection,
    #[error("parameter `{parameter}` of node `{node}` already has an incoming connection")]
    ParameterOccupied { node: String, parameter: String },
    #[error("connection endpoint does not exist: {0}")]
    DanglingEndpoint(String),
    #[error("parameter `{parameter}` is connected; its value cannot be edited directly")]
    ConnectedParameter { parameter: String },
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("bad value for field `{field}`: {reason}")]
    BadValue { field: String, reason: String },
}

/// Owns the node set, connection set and per-node request/runtime state.
/// Pure data: every mutation is synchronous and total — a missing id is a
/// reported `NotFound`, never a panic. Interior mutability lets in-flight
/// execution chains and interaction writes interleave without a global lock.
#[derive(Debug, Default)]
pub struct GraphStore {
    nodes: DashMap<String, Node>,
    /// Insertion order of node ids, for stable listing and serialization.
    order: RwLock<Vec<String>>,
    /// Stored order doubles as fan-out order.
    connections: RwLock<Vec<Connection>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&self, node: Node) {
        info!(node_id = %node.id, "node added");
        let id = node.id.clone();
        if self.nodes.insert(id.clone(), node).is_none() {
            self.order.write().unwrap().push(id);
        }
    }

    pub fn get_node(&self, id: &str) -> Option<Node> {
        self.nodes.get(id).map(|n| n.clone())
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> Vec<Node> {
        let order = self.order.read().unwrap();
        order
            .iter()
            .filter_map(|id| self.nodes.get(id).map(|n| n.clone()))
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.connections.read().unwrap().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().unwrap().len()
    }

    /// Outgoing connections of one node, in stored order.
    pub fn connections_from(&self, node_id: &str) -> Vec<Connection> {
        self.connections
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.from_node == node_id)
            .cloned()
            .collect()
    }

    /// The single write path for node mutations. Shallow-merges the patch;
    /// unspecified fields are left as they are.
    pub fn update_node(&self, id: &str, patch: NodePatch) -> Result<(), StoreError> {
        match self.nodes.get_mut(id) {
            Some(mut node) => {
                node.apply_patch(patch);
                Ok(())
            }
            None => {
                debug!(node_id = %id, "update_node on missing node");
                Err(StoreError::NotFound(id.to_string()))
            }
        }
    }

    /// Widget patch interface (`on_data_change`): form widgets propose a
    /// keyed value instead of mutating the store themselves. Direct edits to
    /// the value of a connected parameter are refused.
    pub fn update_field(&self, id: &str, key: &str, value: Value) -> Result<(), StoreError> {
        let bad = |reason: serde_json::Error| StoreError::BadValue {
            field: key.to_string(),
            reason: reason.to_string(),
        };
        let patch = match key {
            "method" => NodePatch {
                method: Some(serde_json::from_value(value).map_err(bad)?),
                ..NodePatch::default()
            },
            "url" => NodePatch {
                url: Some(serde_json::from_value(value).map_err(bad)?),
                ..NodePatch::default()
            },
            "body" => NodePatch {
                body: Some(serde_json::from_value(value).map_err(bad)?),
                ..NodePatch::default()
            },
            "extract_path" => NodePatch {
                extract_path: Some(serde_json::from_value(value).map_err(bad)?),
                ..NodePatch::default()
            },
            "expected_status" => NodePatch {
                expected_status: Some(serde_json::from_value(value).map_err(bad)?),
                ..NodePatch::default()
            },
            "validation" => NodePatch {
                validation: Some(serde_json::from_value(value).map_err(bad)?),
                ..NodePatch::default()
            },
            "headers" => {
                let headers: Vec<HeaderEntry> = serde_json::from_value(value).map_err(bad)?;
                NodePatch {
                    headers: Some(headers),
                    ..NodePatch::default()
                }
            }
            "output_sockets" => {
                let sockets: Vec<OutputSocket> = serde_json::from_value(value).map_err(bad)?;
                NodePatch {
                    output_sockets: Some(sockets),
                    ..NodePatch::default()
                }
            }
            "parameters" => {
                let parameters: Vec<Parameter> = serde_json::from_value(value).map_err(bad)?;
                let current = self
                    .get_node(id)
                    .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
                for param in &parameters {
                    if let Some(existing) = current.parameter(&param.id) {
                        if existing.has_connection && existing.value != param.value {
                            return Err(StoreError::ConnectedParameter {
                                parameter: existing.key.clone(),
                            });
                        }
                    }
                }
                NodePatch {
                    parameters: Some(parameters),
                    ..NodePatch::default()
                }
            }
            other => return Err(StoreError::UnknownField(other.to_string())),
        };
        self.update_node(id, patch)
    }

    /// Add a connection. Duplicates of an existing
    /// (from, from_socket, to, to_socket) tuple and second connections into
    /// an already-connected parameter are rejected without mutation, as are
    /// endpoints that do not resolve to a live node/socket.
    pub fn add_connection(&self, conn: Connection) -> Result<(), StoreError> {
        let from = self
            .get_node(&conn.from_node)
            .ok_or_else(|| StoreError::DanglingEndpoint(conn.from_node.clone()))?;
        if from.output_socket(&conn.from_socket).is_none() {
            return Err(StoreError::DanglingEndpoint(format!(
                "{}/{}",
                conn.from_node, conn.from_socket
            )));
        }
        let to = self
            .get_node(&conn.to_node)
            .ok_or_else(|| StoreError::DanglingEndpoint(conn.to_node.clone()))?;
        let target_key = match to.parameter(&conn.to_socket) {
            Some(param) => param.key.clone(),
            None => {
                return Err(StoreError::DanglingEndpoint(format!(
                    "{}/{}",
                    conn.to_node, conn.to_socket
                )));
            }
        };

        {
            let mut connections = self.connections.write().unwrap();
            if connections.iter().any(|c| c.same_tuple(&conn)) {
                debug!(conn_id = %conn.id, "duplicate connection rejected");
                return Err(StoreError::DuplicateConnection);
            }
            if connections
                .iter()
                .any(|c| c.to_node == conn.to_node && c.to_socket == conn.to_socket)
            {
                return Err(StoreError::ParameterOccupied {
                    node: conn.to_node.clone(),
                    parameter: target_key,
                });
            }
            info!(conn_id = %conn.id, from = %conn.from_node, to = %conn.to_node, "connection added");
            connections.push(conn.clone());
        }

        self.set_parameter_connected(&conn.to_node, &conn.to_socket, true);
        Ok(())
    }

    pub fn remove_connection(&self, id: &str) -> Result<(), StoreError> {
        let removed = {
            let mut connections = self.connections.write().unwrap();
            match connections.iter().position(|c| c.id == id) {
                Some(pos) => connections.remove(pos),
                None => return Err(StoreError::NotFound(id.to_string())),
            }
        };
        info!(conn_id = %id, "connection removed");
        self.refresh_parameter_flag(&removed.to_node, &removed.to_socket);
        Ok(())
    }

    /// Remove a node and every connection touching it.
    pub fn remove_node(&self, id: &str) -> Result<(), StoreError> {
        if self.nodes.remove(id).is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.order.write().unwrap().retain(|n| n != id);

        let dropped: Vec<Connection> = {
            let mut connections = self.connections.write().unwrap();
            let (dropped, kept): (Vec<_>, Vec<_>) = connections
                .drain(..)
                .partition(|c| c.from_node == id || c.to_node == id);
            *connections = kept;
            dropped
        };
        info!(node_id = %id, connections = dropped.len(), "node removed");

        for conn in dropped {
            if conn.to_node != id {
                self.refresh_parameter_flag(&conn.to_node, &conn.to_socket);
            }
        }
        Ok(())
    }

    fn set_parameter_connected(&self, node_id: &str, param_id: &str, connected: bool) {
        if let Some(mut node) = self.nodes.get_mut(node_id) {
            if let Some(param) = node
                .request
                .parameters
                .iter_mut()
                .find(|p| p.id == param_id)
            {
                param.has_connection = connected;
            }
        }
    }

    /// Re-derive `has_connection` from the connection set after removals.
    fn refresh_parameter_flag(&self, node_id: &str, param_id: &str) {
        let still_connected = self
            .connections
            .read()
            .unwrap()
            .iter()
            .any(|c| c.to_node == node_id && c.to_socket == param_id);
        self.set_parameter_connected(node_id, param_id, still_connected);
    }
}
