use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Camera {
	pub x: f64,
	pub y: f64,
	pub scale: f64,
}

impl Default for Camera {
	fn default() -> Self {
		let (x, y, scale) = super::config::DEFAULT_CAMERA;
		Self { x, y, scale }
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireNode {
	pub id: u32,
	pub x: f64,
	pub y: f64,
	pub is_head: bool,
	#[serde(default, skip_serializing_if = "is_false")]
	pub is_hidden: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireBranch {
	pub id: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub label: Option<String>,
	pub color: String,
	pub node_ids: Vec<u32>,
	pub parent_node_id: Option<u32>,
}

/// Flat, id-indexed graph snapshot. Used for persistence and as the payload
/// exchanged with the graph service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireGraph {
	pub id: String,
	pub name: String,
	pub camera: Camera,
	pub nodes: BTreeMap<String, WireNode>,
	pub branches: BTreeMap<String, WireBranch>,
	pub branch_order: Vec<u32>,
	pub next_node_id: u32,
	pub next_branch_id: u32,
	pub next_color_index: u32,
}

impl WireGraph {
	pub fn empty(id: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			name: name.into(),
			camera: Camera::default(),
			nodes: BTreeMap::new(),
			branches: BTreeMap::new(),
			branch_order: Vec::new(),
			next_node_id: 1,
			next_branch_id: 1,
			next_color_index: 0,
		}
	}

	pub fn has_trunk(&self) -> bool {
		self.branches.values().any(|b| b.parent_node_id.is_none())
	}
}

fn is_false(v: &bool) -> bool {
	!*v
}
