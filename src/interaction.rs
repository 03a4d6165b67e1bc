use std::sync::Arc;

use tracing::debug;

use crate::config::EditorConfig;
use crate::geometry::{SocketDirection, SocketGeometry};
use crate::graph::{Connection, GraphStore, StoreError};
use crate::node::{Dimension, NodePatch, NodeSize};
use crate::util::generate_id;
use crate::viewport::{Point, Viewport};

/// What the renderer found under the pointer. Hit testing is the renderer's
/// job; the state machine only interprets the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HitTarget {
    Canvas,
    NodeHeader(String),
    ResizeHandle(String),
    OutputSocket { node_id: String, socket_id: String },
    InputSocket { node_id: String, socket_id: String },
}

/// Current pointer gesture. One gesture at a time: a press while another
/// gesture is active is ignored until the pointer is released.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionState {
    Idle,
    Panning {
        last_pointer: Point,
    },
    DraggingNode {
        node_id: String,
        /// Canvas-space offset from the node origin to the grab point, so
        /// the node does not jump to the cursor.
        grab_offset: Point,
    },
    Resizing {
        node_id: String,
        start_pointer: Point,
        start_width: f64,
        start_height: f64,
    },
    Connecting {
        from_node: String,
        from_socket: String,
        start: Point,
        current: Point,
    },
}

/// Canvas interaction state machine: pan, zoom, node drag, node resize and
/// connection drawing. All pointer positions arrive in device space and are
/// mapped through the viewport, so gestures behave identically at any zoom.
pub struct InteractionController {
    store: Arc<GraphStore>,
    geometry: Arc<SocketGeometry>,
    viewport: Viewport,
    state: InteractionState,
    min_node_width: f64,
    min_node_height: f64,
}

impl InteractionController {
    pub fn new(store: Arc<GraphStore>, geometry: Arc<SocketGeometry>, config: &EditorConfig) -> Self {
        Self {
            store,
            geometry,
            viewport: Viewport::new(config.min_scale, config.max_scale),
            state: InteractionState::Idle,
            min_node_width: config.min_node_width,
            min_node_height: config.min_node_height,
        }
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    /// The in-progress connection curve for the renderer, canvas space.
    pub fn connection_preview(&self) -> Option<(Point, Point)> {
        match &self.state {
            InteractionState::Connecting { start, current, .. } => Some((*start, *current)),
            _ => None,
        }
    }

    pub fn pointer_down(&mut self, target: HitTarget, device_pos: Point) {
        if self.state != InteractionState::Idle {
            debug!("pointer down ignored, gesture already active");
            return;
        }
        let canvas_pos = self.viewport.to_canvas(device_pos);

        self.state = match target {
            HitTarget::Canvas => InteractionState::Panning {
                last_pointer: device_pos,
            },
            HitTarget::NodeHeader(node_id) => match self.store.get_node(&node_id) {
                Some(node) => InteractionState::DraggingNode {
                    node_id,
                    grab_offset: canvas_pos - node.position,
                },
                None => InteractionState::Idle,
            },
            HitTarget::ResizeHandle(node_id) => match self.store.get_node(&node_id) {
                Some(node) => {
                    let start_height = match node.size.height {
                        Dimension::Px(px) => px,
                        // Auto height has no stored number; resizing starts
                        // from the minimum and grows from there.
                        Dimension::Auto => self.min_node_height,
                    };
                    InteractionState::Resizing {
                        node_id,
                        start_pointer: device_pos,
                        start_width: node.size.width,
                        start_height,
                    }
                }
                None => InteractionState::Idle,
            },
            HitTarget::OutputSocket { node_id, socket_id } => {
                let start = self
                    .geometry
                    .resolve(&node_id, &socket_id, SocketDirection::Output)
                    .unwrap_or(canvas_pos);
                InteractionState::Connecting {
                    from_node: node_id,
                    from_socket: socket_id,
                    start,
                    current: canvas_pos,
                }
            }
            // Connections are drawn from outputs to inputs only.
            HitTarget::InputSocket { .. } => InteractionState::Idle,
        };
    }

    pub fn pointer_move(&mut self, device_pos: Point) {
        match &mut self.state {
            InteractionState::Idle => {}
            InteractionState::Panning { last_pointer } => {
                let delta = device_pos - *last_pointer;
                *last_pointer = device_pos;
                self.viewport.pan_by(delta);
            }
            InteractionState::DraggingNode {
                node_id,
                grab_offset,
            } => {
                let position = self.viewport.to_canvas(device_pos) - *grab_offset;
                let _ = self.store.update_node(node_id, NodePatch::position(position));
            }
            InteractionState::Resizing {
                node_id,
                start_pointer,
                start_width,
                start_height,
            } => {
                let delta = (device_pos - *start_pointer) / self.viewport.scale();
                let size = NodeSize {
                    width: (*start_width + delta.x).max(self.min_node_width),
                    height: Dimension::Px((*start_height + delta.y).max(self.min_node_height)),
                };
                let _ = self.store.update_node(node_id, NodePatch::size(size));
            }
            InteractionState::Connecting { current, .. } => {
                *current = self.viewport.to_canvas(device_pos);
            }
        }
    }

    /// Ends the gesture. A connection commits only when released over an
    /// input socket of another node; everywhere else it is dropped.
    pub fn pointer_up(&mut self, target: HitTarget) -> Option<Connection> {
        let state = std::mem::replace(&mut self.state, InteractionState::Idle);
        let InteractionState::Connecting {
            from_node,
            from_socket,
            ..
        } = state
        else {
            return None;
        };
        let HitTarget::InputSocket { node_id, socket_id } = target else {
            debug!("connection dropped, released off-socket");
            return None;
        };
        if node_id == from_node {
            debug!("connection to own node rejected");
            return None;
        }

        let conn = Connection::new(
            generate_id("conn"),
            from_node,
            from_socket,
            node_id,
            socket_id,
        );
        match self.store.add_connection(conn.clone()) {
            Ok(()) => Some(conn),
            Err(e @ (StoreError::DuplicateConnection | StoreError::ParameterOccupied { .. })) => {
                debug!(error = %e, "connection rejected");
                None
            }
            Err(e) => {
                debug!(error = %e, "connection failed");
                None
            }
        }
    }

    /// Abort the gesture without committing anything (Escape, focus loss).
    pub fn cancel(&mut self) {
        self.state = InteractionState::Idle;
    }

    /// Wheel zoom anchored on the cursor. No-op mid-gesture so an in-flight
    /// drag keeps its coordinate frame.
    pub fn wheel(&mut self, device_pos: Point, delta_scale: f64) {
        if self.state == InteractionState::Idle {
            self.viewport.zoom_at(device_pos, delta_scale);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, OutputSocket, Parameter, RequestSpec};

    fn controller() -> (Arc<GraphStore>, InteractionController) {
        let store = Arc::new(GraphStore::new());
        let config = EditorConfig::default();
        let geometry = Arc::new(SocketGeometry::new(store.clone(), &config));

        let mut source_spec = RequestSpec::default();
        source_spec.output_sockets = vec![OutputSocket::new("value", "data.value")];
        store.add_node(Node::new("src", Point::new(0.0, 0.0)).with_request(source_spec));

        let mut target_spec = RequestSpec::default();
        target_spec.parameters = vec![Parameter::new("input")];
        store.add_node(Node::new("dst", Point::new(600.0, 0.0)).with_request(target_spec));

        let controller = InteractionController::new(store.clone(), geometry, &config);
        (store, controller)
    }

    fn output_socket_id(store: &GraphStore) -> String {
        store.get_node("src").unwrap().request.output_sockets[0]
            .id
            .clone()
    }

    fn input_param_id(store: &GraphStore) -> String {
        store.get_node("dst").unwrap().request.parameters[0]
            .id
            .clone()
    }

    #[test]
    fn test_canvas_press_pans_the_viewport() {
        let (_store, mut c) = controller();
        c.pointer_down(HitTarget::Canvas, Point::new(10.0, 10.0));
        c.pointer_move(Point::new(40.0, 25.0));
        c.pointer_up(HitTarget::Canvas);

        assert_eq!(c.viewport().pan(), Point::new(30.0, 15.0));
        assert_eq!(*c.state(), InteractionState::Idle);
    }

    #[test]
    fn test_header_drag_moves_node_without_jumping() {
        let (store, mut c) = controller();
        // Grab 20px into the header.
        c.pointer_down(HitTarget::NodeHeader("src".to_string()), Point::new(20.0, 5.0));
        c.pointer_move(Point::new(120.0, 55.0));

        let node = store.get_node("src").unwrap();
        assert_eq!(node.position, Point::new(100.0, 50.0));
    }

    #[test]
    fn test_drag_delta_is_scaled_by_zoom() {
        let (store, mut c) = controller();
        c.viewport_mut().zoom_at(Point::ZERO, -0.5); // scale 0.5

        c.pointer_down(HitTarget::NodeHeader("src".to_string()), Point::ZERO);
        c.pointer_move(Point::new(50.0, 0.0));

        // 50 device px at half zoom is 100 canvas px.
        let node = store.get_node("src").unwrap();
        assert_eq!(node.position.x, 100.0);
    }

    #[test]
    fn test_resize_clamps_to_minimum() {
        let (store, mut c) = controller();
        c.pointer_down(HitTarget::ResizeHandle("src".to_string()), Point::ZERO);
        c.pointer_move(Point::new(-1000.0, -1000.0));

        let size = store.get_node("src").unwrap().size;
        assert_eq!(size.width, 300.0);
        assert_eq!(size.height, Dimension::Px(200.0));
    }

    #[test]
    fn test_resize_grows_from_start_size() {
        let (store, mut c) = controller();
        c.pointer_down(HitTarget::ResizeHandle("src".to_string()), Point::ZERO);
        c.pointer_move(Point::new(50.0, 120.0));

        let size = store.get_node("src").unwrap().size;
        assert_eq!(size.width, 500.0); // 450 default + 50
        assert_eq!(size.height, Dimension::Px(320.0)); // 200 min + 120
    }

    #[test]
    fn test_press_during_gesture_is_ignored() {
        let (_store, mut c) = controller();
        c.pointer_down(HitTarget::Canvas, Point::ZERO);
        c.pointer_down(HitTarget::NodeHeader("src".to_string()), Point::ZERO);
        assert!(matches!(c.state(), InteractionState::Panning { .. }));
    }

    #[test]
    fn test_connect_commits_on_input_socket() {
        let (store, mut c) = controller();
        let out = output_socket_id(&store);
        let input = input_param_id(&store);

        c.pointer_down(
            HitTarget::OutputSocket {
                node_id: "src".to_string(),
                socket_id: out,
            },
            Point::new(450.0, 200.0),
        );
        c.pointer_move(Point::new(600.0, 200.0));
        assert!(c.connection_preview().is_some());

        let conn = c.pointer_up(HitTarget::InputSocket {
            node_id: "dst".to_string(),
            socket_id: input.clone(),
        });

        assert!(conn.is_some());
        assert_eq!(store.connection_count(), 1);
        assert!(store.get_node("dst").unwrap().request.parameters[0].has_connection);
        assert_eq!(*c.state(), InteractionState::Idle);
    }

    #[test]
    fn test_connect_released_on_canvas_is_dropped() {
        let (store, mut c) = controller();
        let out = output_socket_id(&store);

        c.pointer_down(
            HitTarget::OutputSocket {
                node_id: "src".to_string(),
                socket_id: out,
            },
            Point::ZERO,
        );
        assert!(c.pointer_up(HitTarget::Canvas).is_none());
        assert_eq!(store.connection_count(), 0);
    }

    #[test]
    fn test_duplicate_connect_is_a_quiet_no_op() {
        let (store, mut c) = controller();
        let out = output_socket_id(&store);
        let input = input_param_id(&store);

        for _ in 0..2 {
            c.pointer_down(
                HitTarget::OutputSocket {
                    node_id: "src".to_string(),
                    socket_id: out.clone(),
                },
                Point::ZERO,
            );
            c.pointer_up(HitTarget::InputSocket {
                node_id: "dst".to_string(),
                socket_id: input.clone(),
            });
        }
        assert_eq!(store.connection_count(), 1);
    }

    #[test]
    fn test_self_connection_is_rejected() {
        let (store, mut c) = controller();
        let out = output_socket_id(&store);

        let mut spec = store.get_node("src").unwrap().request;
        spec.parameters = vec![Parameter::new("loop")];
        let param = spec.parameters[0].id.clone();
        let _ = store.update_node(
            "src",
            NodePatch {
                parameters: Some(spec.parameters.clone()),
                ..NodePatch::default()
            },
        );

        c.pointer_down(
            HitTarget::OutputSocket {
                node_id: "src".to_string(),
                socket_id: out,
            },
            Point::ZERO,
        );
        let conn = c.pointer_up(HitTarget::InputSocket {
            node_id: "src".to_string(),
            socket_id: param,
        });
        assert!(conn.is_none());
        assert_eq!(store.connection_count(), 0);
    }

    #[test]
    fn test_wheel_is_ignored_mid_gesture() {
        let (_store, mut c) = controller();
        c.pointer_down(HitTarget::Canvas, Point::ZERO);
        c.wheel(Point::ZERO, 0.5);
        assert_eq!(c.viewport().scale(), 1.0);
    }

    #[test]
    fn test_cancel_drops_connection_preview() {
        let (store, mut c) = controller();
        let out = output_socket_id(&store);
        c.pointer_down(
            HitTarget::OutputSocket {
                node_id: "src".to_string(),
                socket_id: out,
            },
            Point::ZERO,
        );
        c.cancel();
        assert!(c.connection_preview().is_none());
        assert_eq!(*c.state(), InteractionState::Idle);
    }
}
