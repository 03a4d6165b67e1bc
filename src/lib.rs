pub mod config;
pub mod engine;
pub mod executor;
pub mod extract;
pub mod flow;
pub mod geometry;
pub mod graph;
pub mod interaction;
pub mod logger;
pub mod node;
pub mod util;
pub mod validate;
pub mod viewport;

pub use config::EditorConfig;
pub use engine::{ExecutionEngine, ExecutionReport, NodeRecord};
pub use executor::{HttpExecutor, MockExecutor, ReqwestExecutor, RequestDescriptor};
pub use extract::{FieldInfo, available_fields, extract, response_fields};
pub use flow::{FlowEditor, FlowError, FlowFile, FlowIssue, demo_flow};
pub use geometry::{Rect, SocketDirection, SocketGeometry};
pub use graph::{Connection, GraphStore, StoreError};
pub use interaction::{HitTarget, InteractionController, InteractionState};
pub use node::{
    DataType, Dimension, HeaderEntry, HttpMethod, Node, NodeKind, NodePatch, NodeSize,
    OutputSocket, Parameter, RequestError, RequestSpec, RequestStatus, ResponseData,
};
pub use viewport::{Point, Viewport};
