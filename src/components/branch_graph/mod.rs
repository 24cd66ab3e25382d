//! Branching conversation tree drawn on a canvas.

pub mod api;
pub mod codec;
mod component;
pub mod config;
pub mod layout;
pub mod model;
mod render;
pub mod session;
pub mod state;
pub mod types;

pub use api::{GraphService, HttpGraphService};
pub use component::{BranchGraphCanvas, GraphControls, GraphHandle};
pub use model::{Graph, NodeId, Operation};
pub use session::{GraphManager, GraphSession};
pub use state::OperationStates;
pub use types::WireGraph;
