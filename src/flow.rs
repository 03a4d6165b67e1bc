use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::config::EditorConfig;
use crate::engine::{ExecutionEngine, ExecutionReport};
use crate::executor::HttpExecutor;
use crate::geometry::SocketGeometry;
use crate::graph::{Connection, GraphStore, StoreError};
use crate::interaction::InteractionController;
use crate::node::{
    DataType, Dimension, HeaderEntry, HttpMethod, Node, NodeSize, OutputSocket, Parameter,
    RequestSpec,
};
use crate::util::generate_id;
use crate::validate::check_expression;
use crate::viewport::Point;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("flow file is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// On-disk representation of a flow: the node list plus the connection list,
/// pretty-printed JSON.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FlowFile {
    #[serde(default)]
    pub name: String,
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
}

/// A problem found while linting a flow file. None of these stop loading;
/// the `validate` subcommand reports them all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowIssue {
    /// Offending node id, when the problem is attributable to one.
    pub node: Option<String>,
    pub message: String,
}

impl std::fmt::Display for FlowIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.node {
            Some(node) => write!(f, "[{node}] {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl FlowFile {
    pub fn load(path: &Path) -> Result<Self, FlowError> {
        let raw = fs::read_to_string(path)?;
        let flow: Self = serde_json::from_str(&raw)?;
        info!(path = %path.display(), nodes = flow.nodes.len(), "flow loaded");
        Ok(flow)
    }

    pub fn save(&self, path: &Path) -> Result<(), FlowError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!(path = %path.display(), nodes = self.nodes.len(), "flow saved");
        Ok(())
    }

    /// Structural checks over the file as written, before anything is loaded
    /// into a store.
    pub fn lint(&self) -> Vec<FlowIssue> {
        let mut issues = Vec::new();
        let issue = |node: Option<&str>, message: String| FlowIssue {
            node: node.map(str::to_string),
            message,
        };

        let mut seen_ids = HashSet::new();
        for node in &self.nodes {
            if !seen_ids.insert(node.id.as_str()) {
                issues.push(issue(Some(node.id.as_str()), "duplicate node id".to_string()));
            }
            if node.request.url.trim().is_empty() {
                issues.push(issue(Some(node.id.as_str()), "request url is empty".to_string()));
            }
            if let Err(e) = check_expression(&node.request.validation) {
                issues.push(issue(
                    Some(node.id.as_str()),
                    format!("broken validation expression: {e}"),
                ));
            }
        }

        let node = |id: &str| self.nodes.iter().find(|n| n.id == id);
        let mut seen_tuples = HashSet::new();
        let mut occupied = HashSet::new();
        for conn in &self.connections {
            match node(&conn.from_node) {
                None => issues.push(issue(
                    None,
                    format!("connection `{}` starts at unknown node `{}`", conn.id, conn.from_node),
                )),
                Some(n) if n.output_socket(&conn.from_socket).is_none() => issues.push(issue(
                    Some(conn.from_node.as_str()),
                    format!("connection `{}` starts at unknown socket `{}`", conn.id, conn.from_socket),
                )),
                Some(_) => {}
            }
            match node(&conn.to_node) {
                None => issues.push(issue(
                    None,
                    format!("connection `{}` ends at unknown node `{}`", conn.id, conn.to_node),
                )),
                Some(n) if n.parameter(&conn.to_socket).is_none() => issues.push(issue(
                    Some(conn.to_node.as_str()),
                    format!("connection `{}` ends at unknown parameter `{}`", conn.id, conn.to_socket),
                )),
                Some(_) => {}
            }
            if !seen_tuples.insert((
                conn.from_node.as_str(),
                conn.from_socket.as_str(),
                conn.to_node.as_str(),
                conn.to_socket.as_str(),
            )) {
                issues.push(issue(None, format!("connection `{}` duplicates another", conn.id)));
            }
            if !occupied.insert((conn.to_node.as_str(), conn.to_socket.as_str())) {
                issues.push(issue(
                    Some(conn.to_node.as_str()),
                    format!("parameter `{}` has more than one incoming connection", conn.to_socket),
                ));
            }
        }

        issues
    }
}

/// The assembled editor: graph store, socket geometry, canvas interaction
/// and the execution engine, all sharing one store.
pub struct FlowEditor {
    config: EditorConfig,
    store: Arc<GraphStore>,
    geometry: Arc<SocketGeometry>,
    interaction: InteractionController,
    engine: ExecutionEngine,
}

impl FlowEditor {
    pub fn new(config: EditorConfig, http: Arc<dyn HttpExecutor>) -> Self {
        let store = Arc::new(GraphStore::new());
        let geometry = Arc::new(SocketGeometry::new(store.clone(), &config));
        let interaction = InteractionController::new(store.clone(), geometry.clone(), &config);
        let engine = ExecutionEngine::new(store.clone(), http);
        Self {
            config,
            store,
            geometry,
            interaction,
            engine,
        }
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn geometry(&self) -> &Arc<SocketGeometry> {
        &self.geometry
    }

    pub fn interaction(&self) -> &InteractionController {
        &self.interaction
    }

    pub fn interaction_mut(&mut self) -> &mut InteractionController {
        &mut self.interaction
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Add a blank GET node at `position` and return its id.
    pub fn add_http_node(&self, position: Point) -> String {
        let id = generate_id("api");
        let spec = RequestSpec {
            url: "https://jsonplaceholder.typicode.com/users".to_string(),
            headers: Vec::new(),
            ..RequestSpec::default()
        };
        let mut node = Node::new(id.clone(), position).with_request(spec);
        node.size = NodeSize {
            width: self.config.default_node_width,
            height: Dimension::Auto,
        };
        self.store.add_node(node);
        id
    }

    /// Remove a node, its connections and its cached socket rectangles.
    pub fn remove_node(&self, id: &str) -> Result<(), StoreError> {
        self.store.remove_node(id)?;
        self.geometry.forget_node(id);
        Ok(())
    }

    pub async fn run(&self, start_node_id: &str) -> ExecutionReport {
        self.engine.run(start_node_id).await
    }

    /// Replace the current graph with the file's contents. Connections go
    /// through the same checked path as interactive ones, so a file that
    /// wires two sources into one parameter is rejected. The file is staged
    /// into a scratch store first; a rejected file leaves the current graph
    /// untouched.
    pub fn install(&self, flow: FlowFile) -> Result<(), FlowError> {
        let staged = GraphStore::new();
        for node in &flow.nodes {
            staged.add_node(node.clone());
        }
        for conn in &flow.connections {
            staged.add_connection(conn.clone())?;
        }

        let existing: Vec<String> = self.store.nodes().into_iter().map(|n| n.id).collect();
        for id in existing {
            let _ = self.store.remove_node(&id);
            self.geometry.forget_node(&id);
        }
        for node in staged.nodes() {
            self.store.add_node(node);
        }
        for conn in staged.connections() {
            self.store.add_connection(conn)?;
        }
        Ok(())
    }

    pub fn load_file(&self, path: &Path) -> Result<(), FlowError> {
        self.install(FlowFile::load(path)?)
    }

    /// Serialize the current graph under `name`.
    pub fn snapshot(&self, name: impl Into<String>) -> FlowFile {
        FlowFile {
            name: name.into(),
            nodes: self.store.nodes(),
            connections: self.store.connections(),
        }
    }

    pub fn save_file(&self, path: &Path, name: impl Into<String>) -> Result<(), FlowError> {
        self.snapshot(name).save(path)
    }

    /// Load the built-in three-node demo: fetch a UUID, post it to an echo
    /// endpoint, then pass the echoed trace id into a third request.
    pub fn seed_demo(&self) -> Result<(), FlowError> {
        self.install(demo_flow())
    }
}

/// The demo flow shipped with the editor. Socket and parameter ids are fixed
/// so the connections can reference them.
pub fn demo_flow() -> FlowFile {
    let uuid_node = Node::new("get-uuid", Point::new(50.0, 200.0)).with_request(RequestSpec {
        url: "https://httpbin.org/uuid".to_string(),
        headers: Vec::new(),
        output_sockets: vec![OutputSocket {
            id: "output-uuid".to_string(),
            name: "UUID".to_string(),
            path: "uuid".to_string(),
            data_type: DataType::String,
            enabled: true,
        }],
        ..RequestSpec::default()
    });

    let post_node = Node::new("post-data", Point::new(550.0, 200.0)).with_request(RequestSpec {
        method: HttpMethod::Post,
        url: "https://httpbin.org/anything".to_string(),
        headers: vec![HeaderEntry::new("Content-Type", "application/json")],
        body: json!({"message": "Hello from the flow editor!", "session_id": ""}).to_string(),
        parameters: vec![Parameter {
            id: "param-session-id".to_string(),
            key: "session_id".to_string(),
            value: json!(""),
            data_type: DataType::String,
            enabled: true,
            has_connection: false,
        }],
        output_sockets: vec![OutputSocket {
            id: "output-request-id".to_string(),
            name: "Request ID".to_string(),
            path: "headers.X-Amzn-Trace-Id".to_string(),
            data_type: DataType::String,
            enabled: true,
        }],
        ..RequestSpec::default()
    });

    let info_node =
        Node::new("get-request-info", Point::new(1050.0, 200.0)).with_request(RequestSpec {
            url: "https://httpbin.org/headers".to_string(),
            headers: vec![HeaderEntry::new("X-Trace-ID", "")],
            parameters: vec![Parameter {
                id: "param-trace-id".to_string(),
                key: "X-Trace-ID".to_string(),
                value: json!(""),
                data_type: DataType::String,
                enabled: true,
                has_connection: false,
            }],
            ..RequestSpec::default()
        });

    FlowFile {
        name: "demo".to_string(),
        nodes: vec![uuid_node, post_node, info_node],
        connections: vec![
            Connection::new("conn-1", "get-uuid", "output-uuid", "post-data", "param-session-id"),
            Connection::new(
                "conn-2",
                "post-data",
                "output-request-id",
                "get-request-info",
                "param-trace-id",
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockExecutor;
    use tempfile::tempdir;

    fn editor() -> FlowEditor {
        FlowEditor::new(
            EditorConfig::default(),
            Arc::new(MockExecutor::new()),
        )
    }

    #[test]
    fn test_demo_flow_is_clean_and_wired() {
        let flow = demo_flow();
        assert!(flow.lint().is_empty());

        let editor = editor();
        editor.seed_demo().unwrap();
        assert_eq!(editor.store().node_count(), 3);
        assert_eq!(editor.store().connection_count(), 2);

        // The checked connection path re-derives the connected flags.
        let post = editor.store().get_node("post-data").unwrap();
        assert!(post.parameter("param-session-id").unwrap().has_connection);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("demo.flow.json");

        let editor = editor();
        editor.seed_demo().unwrap();
        editor.save_file(&path, "demo").unwrap();

        let other = self::editor();
        other.load_file(&path).unwrap();
        assert_eq!(other.store().node_count(), 3);
        assert_eq!(other.store().connection_count(), 2);
        assert_eq!(
            other.snapshot("demo").nodes[0].id,
            editor.snapshot("demo").nodes[0].id
        );
    }

    #[test]
    fn test_install_replaces_previous_graph() {
        let editor = editor();
        let orphan = editor.add_http_node(Point::ZERO);
        editor.seed_demo().unwrap();

        assert!(!editor.store().contains_node(&orphan));
        assert_eq!(editor.store().node_count(), 3);
    }

    #[test]
    fn test_lint_reports_dangling_and_doubled_connections() {
        let mut flow = demo_flow();
        flow.connections.push(Connection::new(
            "conn-bad",
            "no-such-node",
            "s",
            "post-data",
            "param-session-id",
        ));

        let issues = flow.lint();
        assert!(issues.iter().any(|i| i.message.contains("unknown node")));
        assert!(
            issues
                .iter()
                .any(|i| i.message.contains("more than one incoming connection"))
        );
    }

    #[test]
    fn test_lint_flags_broken_validation_expression() {
        let mut flow = demo_flow();
        flow.nodes[0].request.validation = "status == ".to_string();
        let issues = flow.lint();
        assert!(
            issues
                .iter()
                .any(|i| i.message.contains("broken validation expression"))
        );
    }

    #[test]
    fn test_doubly_wired_parameter_fails_to_install() {
        let mut flow = demo_flow();
        flow.connections.push(Connection::new(
            "conn-3",
            "post-data",
            "output-request-id",
            "post-data",
            "param-session-id",
        ));

        let editor = editor();
        editor.seed_demo().unwrap();
        assert!(matches!(
            editor.install(flow),
            Err(FlowError::Store(StoreError::ParameterOccupied { .. }))
        ));

        // The rejected file left the previous graph in place.
        assert_eq!(editor.store().node_count(), 3);
        assert_eq!(editor.store().connection_count(), 2);
    }

    #[test]
    fn test_add_http_node_uses_configured_width() {
        let editor = editor();
        let id = editor.add_http_node(Point::new(120.0, 80.0));
        let node = editor.store().get_node(&id).unwrap();
        assert_eq!(node.size.width, 450.0);
        assert_eq!(node.request.method, HttpMethod::Get);
        assert!(node.request.headers.is_empty());
    }
}
