use std::sync::Arc;

use dashmap::DashMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::EditorConfig;
use crate::graph::GraphStore;
use crate::viewport::{Point, Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SocketDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SocketKey {
    node_id: String,
    socket_id: String,
    direction: SocketDirection,
}

/// An axis-aligned rectangle in canvas coordinates, as measured by the
/// renderer after a layout pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Maps (node, socket, direction) to an on-canvas position for connection
/// curves and hit tests. The renderer records measured rectangles here
/// after each layout pass; when a socket has not been measured yet its
/// position is derived from the node's geometry (inputs stack down the
/// left edge, outputs down the right, with a fixed pitch). Asking about a
/// deleted node or socket answers `None`, never a panic, so the renderer
/// can skip a stale connection.
pub struct SocketGeometry {
    store: Arc<GraphStore>,
    layouts: DashMap<SocketKey, Rect>,
    socket_offset: f64,
    socket_pitch: f64,
}

impl SocketGeometry {
    pub fn new(store: Arc<GraphStore>, config: &EditorConfig) -> Self {
        Self {
            store,
            layouts: DashMap::new(),
            socket_offset: config.socket_offset,
            socket_pitch: config.socket_pitch,
        }
    }

    /// Record a measured socket rectangle (canvas space).
    pub fn record_layout(
        &self,
        node_id: &str,
        socket_id: &str,
        direction: SocketDirection,
        rect: Rect,
    ) {
        self.layouts.insert(
            SocketKey {
                node_id: node_id.to_string(),
                socket_id: socket_id.to_string(),
                direction,
            },
            rect,
        );
    }

    /// Drop recorded layouts of a deleted node. Purely hygienic: stale
    /// entries are already unreachable because the store is checked first.
    pub fn forget_node(&self, node_id: &str) {
        self.layouts.retain(|key, _| key.node_id != node_id);
    }

    /// Canvas-space center of a socket's visual marker.
    pub fn resolve(
        &self,
        node_id: &str,
        socket_id: &str,
        direction: SocketDirection,
    ) -> Option<Point> {
        let node = self.store.get_node(node_id)?;

        let index = match direction {
            SocketDirection::Input => node
                .request
                .parameters
                .iter()
                .position(|p| p.id == socket_id)?,
            SocketDirection::Output => node
                .request
                .output_sockets
                .iter()
                .position(|s| s.id == socket_id)?,
        };

        let key = SocketKey {
            node_id: node_id.to_string(),
            socket_id: socket_id.to_string(),
            direction,
        };
        if let Some(rect) = self.layouts.get(&key) {
            return Some(rect.center());
        }

        let x = match direction {
            SocketDirection::Input => node.position.x,
            SocketDirection::Output => node.position.x + node.size.width,
        };
        let y = node.position.y + self.socket_offset + index as f64 * self.socket_pitch;
        Some(Point::new(x, y))
    }

    /// Same point mapped into device space through the viewport.
    pub fn resolve_device(
        &self,
        node_id: &str,
        socket_id: &str,
        direction: SocketDirection,
        viewport: &Viewport,
    ) -> Option<Point> {
        self.resolve(node_id, socket_id, direction)
            .map(|p| viewport.to_device(p))
    }
}
