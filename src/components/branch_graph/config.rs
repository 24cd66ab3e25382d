//! Canvas constants and service configuration.

/// Distance between grid lines, and between a node and the next one grown from it.
pub const GRID_SPACING: f64 = 60.0;
pub const NODE_RADIUS: f64 = 8.0;
pub const NODE_SELECTED_RADIUS: f64 = 10.0;
pub const BRANCH_WIDTH: f64 = 4.0;
/// World-space pick radius, scales with zoom like nodes.
pub const HIT_RADIUS: f64 = NODE_RADIUS * 1.5;
/// Screen pixels the pointer may travel before a click turns into a pan.
pub const DRAG_THRESHOLD: f64 = 5.0;
pub const ZOOM_SPEED: f64 = 0.1;
pub const MIN_ZOOM: f64 = 0.2;
pub const MAX_ZOOM: f64 = 3.0;

pub const BRANCH_COLORS: &[&str] = &[
	"#f59e0b", "#10b981", "#3b82f6", "#ec4899", "#8b5cf6", "#ef4444",
];

pub const DEFAULT_CAMERA: (f64, f64, f64) = (150.0, 300.0, 1.0);

const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/api";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiConfig {
	pub base_url: String,
}

impl ApiConfig {
	/// Base URL baked in at build time through `GRAPH_API_BASE`.
	pub fn from_env() -> Self {
		Self::new(option_env!("GRAPH_API_BASE").unwrap_or(DEFAULT_API_BASE))
	}

	pub fn new(base_url: &str) -> Self {
		Self {
			base_url: base_url.trim_end_matches('/').to_string(),
		}
	}
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self::from_env()
	}
}
