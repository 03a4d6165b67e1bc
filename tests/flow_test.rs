use std::sync::Arc;

use serde_json::{Value, json};

use apiflow::config::EditorConfig;
use apiflow::executor::MockExecutor;
use apiflow::flow::{FlowEditor, FlowFile};
use apiflow::graph::Connection;
use apiflow::node::{
    DataType, Node, OutputSocket, Parameter, RequestError, RequestSpec, RequestStatus,
};
use apiflow::{NodePatch, Point, ResponseData};

fn demo_editor(mock: MockExecutor) -> (Arc<MockExecutor>, FlowEditor) {
    let mock = Arc::new(mock);
    let editor = FlowEditor::new(EditorConfig::default(), mock.clone());
    editor.seed_demo().unwrap();
    (mock, editor)
}

fn happy_path_mock() -> MockExecutor {
    MockExecutor::new()
        .on(
            "https://httpbin.org/uuid",
            ResponseData::ok(json!({"uuid": "abc-123"})),
        )
        .on(
            "https://httpbin.org/anything",
            ResponseData::ok(json!({"headers": {"X-Amzn-Trace-Id": "trace-9"}})),
        )
        .on(
            "https://httpbin.org/headers",
            ResponseData::ok(json!({"headers": {"X-Trace-ID": "trace-9"}})),
        )
}

#[tokio::test]
async fn test_demo_chain_propagates_values_end_to_end() {
    let (mock, editor) = demo_editor(happy_path_mock());

    let report = editor.run("get-uuid").await;

    assert!(report.error.is_none());
    let executed: Vec<&str> = report.records.iter().map(|r| r.node_id.as_str()).collect();
    assert_eq!(executed, ["get-uuid", "post-data", "get-request-info"]);

    let requests = mock.requests();
    assert_eq!(requests.len(), 3);

    // The uuid landed in the post body, the configured message survived.
    let body: serde_json::Value =
        serde_json::from_str(requests[1].body.as_deref().unwrap()).unwrap();
    assert_eq!(body["session_id"], json!("abc-123"));
    assert_eq!(body["message"], json!("Hello from the flow editor!"));

    // The echoed trace id went onto the third request's query string.
    assert_eq!(
        requests[2].url,
        "https://httpbin.org/headers?X-Trace-ID=trace-9"
    );

    for id in ["get-uuid", "post-data", "get-request-info"] {
        let node = editor.store().get_node(id).unwrap();
        assert_eq!(node.runtime.status, RequestStatus::Success);
        assert!(node.runtime.validation.as_ref().unwrap().is_valid);
    }

    // Extracted values are cached on the source nodes by socket id.
    let uuid_node = editor.store().get_node("get-uuid").unwrap();
    assert_eq!(uuid_node.runtime.extracted["output-uuid"], json!("abc-123"));
}

#[tokio::test]
async fn test_null_leaf_value_still_propagates() {
    // The field exists with an explicit null; that is a hit, not a miss,
    // so the downstream node fires with the parameter set to null.
    let mock = MockExecutor::new()
        .on(
            "https://httpbin.org/uuid",
            ResponseData::ok(json!({"uuid": null})),
        )
        .on(
            "https://httpbin.org/anything",
            ResponseData::ok(json!({"headers": {"X-Amzn-Trace-Id": "trace-9"}})),
        )
        .on(
            "https://httpbin.org/headers",
            ResponseData::ok(json!({"headers": {}})),
        );
    let (mock, editor) = demo_editor(mock);

    let report = editor.run("get-uuid").await;

    assert!(report.error.is_none());
    let executed: Vec<&str> = report.records.iter().map(|r| r.node_id.as_str()).collect();
    assert_eq!(executed, ["get-uuid", "post-data", "get-request-info"]);
    assert_eq!(mock.requests().len(), 3);

    let post = editor.store().get_node("post-data").unwrap();
    assert_eq!(post.parameter("param-session-id").unwrap().value, Value::Null);
    assert_eq!(
        editor.store().get_node("get-uuid").unwrap().runtime.extracted["output-uuid"],
        Value::Null
    );
}

fn output_socket(id: &str, path: &str) -> OutputSocket {
    OutputSocket {
        id: id.to_string(),
        name: id.to_string(),
        path: path.to_string(),
        data_type: DataType::String,
        enabled: true,
    }
}

fn input_parameter(id: &str, key: &str) -> Parameter {
    Parameter {
        id: id.to_string(),
        key: key.to_string(),
        value: json!(""),
        data_type: DataType::String,
        enabled: true,
        has_connection: false,
    }
}

#[tokio::test]
async fn test_one_socket_fans_out_to_multiple_targets() {
    let source = Node::new("source", Point::ZERO).with_request(RequestSpec {
        url: "https://t.test/source".to_string(),
        output_sockets: vec![output_socket("out", "uuid")],
        ..RequestSpec::default()
    });
    let first = Node::new("first", Point::new(600.0, 0.0)).with_request(RequestSpec {
        url: "https://t.test/first".to_string(),
        parameters: vec![input_parameter("first-token", "token")],
        ..RequestSpec::default()
    });
    let second = Node::new("second", Point::new(600.0, 400.0)).with_request(RequestSpec {
        url: "https://t.test/second".to_string(),
        parameters: vec![input_parameter("second-token", "token")],
        ..RequestSpec::default()
    });
    let flow = FlowFile {
        name: "fan-out".to_string(),
        nodes: vec![source, first, second],
        connections: vec![
            Connection::new("c1", "source", "out", "first", "first-token"),
            Connection::new("c2", "source", "out", "second", "second-token"),
        ],
    };

    let mock = Arc::new(
        MockExecutor::new()
            .on("https://t.test/source", ResponseData::ok(json!({"uuid": "u-1"})))
            .on("https://t.test/first", ResponseData::ok(json!({})))
            .on("https://t.test/second", ResponseData::ok(json!({}))),
    );
    let editor = FlowEditor::new(EditorConfig::default(), mock.clone());
    editor.install(flow).unwrap();

    let report = editor.run("source").await;

    assert!(report.error.is_none());
    // Both targets fire, in stored connection order.
    let executed: Vec<&str> = report.records.iter().map(|r| r.node_id.as_str()).collect();
    assert_eq!(executed, ["source", "first", "second"]);

    // Both parameters received the same extracted value.
    for (node_id, param_id) in [("first", "first-token"), ("second", "second-token")] {
        let node = editor.store().get_node(node_id).unwrap();
        assert_eq!(node.parameter(param_id).unwrap().value, json!("u-1"));
    }
    let requests = mock.requests();
    assert_eq!(requests[1].url, "https://t.test/first?token=u-1");
    assert_eq!(requests[2].url, "https://t.test/second?token=u-1");
}

#[tokio::test]
async fn test_failed_node_stops_its_branch() {
    let mock = MockExecutor::new()
        .on(
            "https://httpbin.org/uuid",
            ResponseData::ok(json!({"uuid": "abc-123"})),
        )
        .on_error(
            "https://httpbin.org/anything",
            RequestError::new("boom").with_code("500"),
        );
    let (mock, editor) = demo_editor(mock);

    let report = editor.run("get-uuid").await;

    let executed: Vec<&str> = report.records.iter().map(|r| r.node_id.as_str()).collect();
    assert_eq!(executed, ["get-uuid", "post-data"]);
    assert_eq!(mock.requests().len(), 2);

    let (failed_id, err) = report.error.as_ref().unwrap();
    assert_eq!(failed_id, "post-data");
    assert_eq!(err.code.as_deref(), Some("500"));

    assert_eq!(
        editor.store().get_node("post-data").unwrap().runtime.status,
        RequestStatus::Error
    );
    // Untouched downstream node stays idle.
    assert_eq!(
        editor
            .store()
            .get_node("get-request-info")
            .unwrap()
            .runtime
            .status,
        RequestStatus::Idle
    );
}

#[tokio::test]
async fn test_extraction_miss_skips_the_target() {
    let (mock, editor) = demo_editor(happy_path_mock());

    // Point the uuid socket at a path the response does not have.
    let node = editor.store().get_node("get-uuid").unwrap();
    let mut sockets = node.request.output_sockets;
    sockets[0].path = "no.such.path".to_string();
    editor
        .store()
        .update_node(
            "get-uuid",
            NodePatch {
                output_sockets: Some(sockets),
                ..NodePatch::default()
            },
        )
        .unwrap();

    let report = editor.run("get-uuid").await;

    assert!(report.error.is_none());
    assert_eq!(report.records.len(), 1);
    assert_eq!(mock.requests().len(), 1);
    assert_eq!(
        editor.store().get_node("post-data").unwrap().runtime.status,
        RequestStatus::Idle
    );
}

#[tokio::test]
async fn test_disabled_socket_does_not_fire() {
    let (mock, editor) = demo_editor(happy_path_mock());

    let node = editor.store().get_node("get-uuid").unwrap();
    let mut sockets = node.request.output_sockets;
    sockets[0].enabled = false;
    editor
        .store()
        .update_node(
            "get-uuid",
            NodePatch {
                output_sockets: Some(sockets),
                ..NodePatch::default()
            },
        )
        .unwrap();

    editor.run("get-uuid").await;
    assert_eq!(mock.requests().len(), 1);
}

#[tokio::test]
async fn test_removing_a_node_cascades_its_connections() {
    let (_mock, editor) = demo_editor(happy_path_mock());

    editor.remove_node("post-data").unwrap();

    assert_eq!(editor.store().connection_count(), 0);
    // The downstream parameter is editable again.
    let info = editor.store().get_node("get-request-info").unwrap();
    assert!(!info.parameter("param-trace-id").unwrap().has_connection);
}

#[tokio::test]
async fn test_rerun_clears_previous_runtime_state() {
    let mock = MockExecutor::new().on_error(
        "https://httpbin.org/uuid",
        RequestError::new("down").with_code("CONNECTION"),
    );
    let (_mock, editor) = demo_editor(mock);

    editor.run("get-uuid").await;
    assert_eq!(
        editor.store().get_node("get-uuid").unwrap().runtime.status,
        RequestStatus::Error
    );

    // Swap in a healthy transport and run the same graph again.
    let flow = editor.snapshot("demo");
    let healthy = FlowEditor::new(EditorConfig::default(), Arc::new(happy_path_mock()));
    healthy.install(flow).unwrap();

    let report = healthy.run("get-uuid").await;
    assert!(report.error.is_none());
    let node = healthy.store().get_node("get-uuid").unwrap();
    assert_eq!(node.runtime.status, RequestStatus::Success);
    assert!(node.runtime.error.is_none());
}

#[tokio::test]
async fn test_validation_failure_is_recorded_but_does_not_stop_the_chain() {
    let (_mock, editor) = demo_editor(happy_path_mock());

    editor
        .store()
        .update_field("get-uuid", "validation", json!("data.uuid == 'other'"))
        .unwrap();

    let report = editor.run("get-uuid").await;

    // Validation is advisory; propagation still happened.
    assert!(report.error.is_none());
    assert_eq!(report.records.len(), 3);

    let outcome = editor
        .store()
        .get_node("get-uuid")
        .unwrap()
        .runtime
        .validation
        .unwrap();
    assert!(outcome.status_valid);
    assert!(!outcome.custom_valid);
    assert!(!outcome.is_valid);
}
