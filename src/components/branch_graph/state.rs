use log::debug;

use super::config::{DRAG_THRESHOLD, HIT_RADIUS, MAX_ZOOM, MIN_ZOOM, ZOOM_SPEED};
use super::model::{Applied, Graph, NodeId, Operation, UnknownOperation};

/// Which structural operations make sense for the current selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OperationStates {
	pub create: bool,
	pub expand: bool,
	pub collapse: bool,
	pub fold: bool,
	pub unfold: bool,
	pub delete_node: bool,
	pub delete_extension: bool,
	pub delete_children: bool,
}

impl OperationStates {
	pub fn of(graph: &Graph, selected: Option<NodeId>) -> Self {
		let Some(node) = selected.and_then(|id| graph.node(id)) else {
			return Self::default();
		};
		let id = node.id;
		let has_children = graph.has_child_branches(id);
		let has_visible_children = graph.child_branches(id).any(|b| !b.is_hidden);
		let hidden_descendants = graph
			.descendant_branches(id)
			.into_iter()
			.any(|b| graph.branch(b).is_some_and(|b| b.is_hidden));
		let has_extension = !graph.nodes_above(id).is_empty();

		Self {
			create: !has_children,
			expand: node.is_head,
			collapse: !node.is_head,
			fold: has_visible_children,
			unfold: hidden_descendants || graph.has_hidden_extension(id),
			delete_node: !graph.is_trunk_root(id),
			delete_extension: !node.is_head && has_extension,
			delete_children: has_children,
		}
	}

	pub fn enabled(&self, op: Operation) -> bool {
		match op {
			Operation::CreateSubBranch => self.create,
			Operation::ExpandBranch => self.expand,
			Operation::CollapseSelected => self.collapse,
			Operation::FoldSelected => self.fold,
			Operation::UnfoldSelected => self.unfold,
			Operation::DeleteSelectedNode => self.delete_node,
			Operation::DeleteSelectedExtension => self.delete_extension,
			Operation::DeleteSelectedChildren => self.delete_children,
		}
	}
}

#[derive(Clone, Debug, Default)]
pub struct PanState {
	pub active: bool,
	/// Pointer went down here and has not travelled past the drag threshold yet.
	pub down_at: Option<(f64, f64)>,
	pub start_x: f64,
	pub start_y: f64,
	pub camera_start_x: f64,
	pub camera_start_y: f64,
}

pub struct BranchGraphState {
	pub graph: Graph,
	pub selected: Option<NodeId>,
	pub pan: PanState,
	pub width: f64,
	pub height: f64,
}

impl BranchGraphState {
	pub fn new(graph: Graph, width: f64, height: f64) -> Self {
		Self {
			graph,
			selected: None,
			pan: PanState::default(),
			width,
			height,
		}
	}

	/// Adopts a new authoritative graph, keeping the selection if its node survived.
	pub fn load(&mut self, graph: Graph) {
		self.selected = self
			.selected
			.filter(|id| graph.node(*id).is_some_and(|n| !n.is_hidden));
		self.graph = graph;
		self.pan = PanState::default();
	}

	pub fn screen_to_world(&self, sx: f64, sy: f64) -> (f64, f64) {
		let cam = &self.graph.camera;
		((sx - cam.x) / cam.scale, (sy - cam.y) / cam.scale)
	}

	/// Nearest visible node under the pointer, if any is within reach.
	pub fn node_at_position(&self, sx: f64, sy: f64) -> Option<NodeId> {
		let (wx, wy) = self.screen_to_world(sx, sy);
		self.graph
			.nodes()
			.filter(|n| !n.is_hidden)
			.map(|n| (n.id, ((n.x - wx).powi(2) + (n.y - wy).powi(2)).sqrt()))
			.filter(|(_, d)| *d < HIT_RADIUS)
			.min_by(|a, b| a.1.total_cmp(&b.1))
			.map(|(id, _)| id)
	}

	pub fn pointer_down(&mut self, sx: f64, sy: f64) {
		self.pan = PanState {
			active: false,
			down_at: Some((sx, sy)),
			start_x: sx,
			start_y: sy,
			camera_start_x: self.graph.camera.x,
			camera_start_y: self.graph.camera.y,
		};
	}

	/// Returns true once the gesture has turned into a pan.
	pub fn pointer_move(&mut self, sx: f64, sy: f64) -> bool {
		if let Some((dx, dy)) = self.pan.down_at {
			if (sx - dx).abs() > DRAG_THRESHOLD || (sy - dy).abs() > DRAG_THRESHOLD {
				self.pan.active = true;
			}
		}
		if self.pan.active {
			self.graph.camera.x = self.pan.camera_start_x + (sx - self.pan.start_x);
			self.graph.camera.y = self.pan.camera_start_y + (sy - self.pan.start_y);
		}
		self.pan.active
	}

	/// Ends the gesture. A press that never became a pan selects what is under it.
	/// Returns true when the selection changed.
	pub fn pointer_up(&mut self, sx: f64, sy: f64) -> bool {
		let clicked = self.pan.down_at.is_some() && !self.pan.active;
		self.pan = PanState::default();
		if !clicked {
			return false;
		}
		let hit = self.node_at_position(sx, sy);
		self.select(hit)
	}

	pub fn pointer_leave(&mut self) {
		self.pan = PanState::default();
	}

	/// Zooms one step around the pointer, keeping the world point under it fixed.
	pub fn zoom(&mut self, sx: f64, sy: f64, delta_y: f64) {
		let cam = &mut self.graph.camera;
		let old = cam.scale;
		let direction = if delta_y < 0.0 { 1.0 } else { -1.0 };
		let new = (old + direction * ZOOM_SPEED * old).clamp(MIN_ZOOM, MAX_ZOOM);
		cam.x = sx - (sx - cam.x) / old * new;
		cam.y = sy - (sy - cam.y) / old * new;
		cam.scale = new;
	}

	pub fn select(&mut self, node: Option<NodeId>) -> bool {
		if self.selected == node {
			return false;
		}
		debug!("selected {node:?}");
		self.selected = node;
		true
	}

	pub fn invoke(&mut self, op: Operation) -> Applied {
		let applied = self.graph.apply(op, self.selected);
		if let Applied::Done { selection } = applied {
			self.selected = selection;
		}
		applied
	}

	pub fn invoke_named(&mut self, name: &str) -> Result<Applied, UnknownOperation> {
		Ok(self.invoke(name.parse()?))
	}

	pub fn operation_states(&self) -> OperationStates {
		OperationStates::of(&self.graph, self.selected)
	}

	pub fn is_selected(&self, id: NodeId) -> bool {
		self.selected == Some(id)
	}

	pub fn resize(&mut self, width: f64, height: f64) {
		self.width = width;
		self.height = height;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::branch_graph::model::tests::{forked, trunk};
	use crate::components::branch_graph::types::Camera;

	fn state(graph: Graph) -> BranchGraphState {
		let mut s = BranchGraphState::new(graph, 800.0, 600.0);
		s.graph.camera = Camera {
			x: 100.0,
			y: 400.0,
			scale: 2.0,
		};
		s
	}

	/// Screen point of a world point under the test camera.
	fn screen(s: &BranchGraphState, id: u32) -> (f64, f64) {
		let n = s.graph.node(NodeId(id)).unwrap();
		let cam = &s.graph.camera;
		(n.x * cam.scale + cam.x, n.y * cam.scale + cam.y)
	}

	#[test]
	fn click_selects_nearest_visible_node() {
		let mut s = state(forked());
		let (x, y) = screen(&s, 4);
		s.pointer_down(x + 3.0, y - 2.0);
		assert!(s.pointer_up(x + 3.0, y - 2.0));
		assert_eq!(s.selected, Some(NodeId(4)));
	}

	#[test]
	fn click_on_empty_canvas_clears_selection() {
		let mut s = state(forked());
		s.select(Some(NodeId(1)));
		s.pointer_down(790.0, 10.0);
		assert!(s.pointer_up(790.0, 10.0));
		assert_eq!(s.selected, None);
	}

	#[test]
	fn hidden_nodes_cannot_be_picked() {
		let mut s = state(forked());
		s.select(Some(NodeId(2)));
		s.invoke(Operation::FoldSelected);
		assert!(s.graph.node(NodeId(6)).unwrap().is_hidden);
		let (x, y) = screen(&s, 6);
		assert_eq!(s.node_at_position(x, y), None);
	}

	#[test]
	fn drag_pans_instead_of_selecting() {
		let mut s = state(forked());
		let (x, y) = screen(&s, 1);
		s.pointer_down(x, y);
		assert!(!s.pointer_move(x + 3.0, y));
		assert!(s.pointer_move(x + 40.0, y + 10.0));
		assert!(!s.pointer_up(x + 40.0, y + 10.0));
		assert_eq!(s.selected, None);
		assert_eq!(s.graph.camera.x, 140.0);
		assert_eq!(s.graph.camera.y, 410.0);
	}

	#[test]
	fn zoom_keeps_pointer_anchored_and_clamps() {
		let mut s = state(trunk(1));
		let before = s.screen_to_world(300.0, 200.0);
		s.zoom(300.0, 200.0, -1.0);
		let after = s.screen_to_world(300.0, 200.0);
		assert!((before.0 - after.0).abs() < 1e-9);
		assert!((before.1 - after.1).abs() < 1e-9);
		for _ in 0..50 {
			s.zoom(300.0, 200.0, -1.0);
		}
		assert_eq!(s.graph.camera.scale, MAX_ZOOM);
		for _ in 0..100 {
			s.zoom(300.0, 200.0, 1.0);
		}
		assert_eq!(s.graph.camera.scale, MIN_ZOOM);
	}

	#[test]
	fn states_follow_selection() {
		let mut s = state(forked());
		assert_eq!(s.operation_states(), OperationStates::default());

		s.select(Some(NodeId(1)));
		let root = s.operation_states();
		assert!(root.create && root.collapse && root.delete_extension);
		assert!(!root.expand && !root.delete_node && !root.delete_children);

		s.select(Some(NodeId(2)));
		let fork = s.operation_states();
		assert!(fork.fold && fork.delete_children && fork.delete_node);
		assert!(!fork.create && !fork.unfold);
		s.invoke(Operation::FoldSelected);
		let folded = s.operation_states();
		assert!(folded.unfold && !folded.fold);

		s.select(Some(NodeId(3)));
		let head = s.operation_states();
		assert!(head.expand && !head.collapse && !head.delete_extension);
	}

	#[test]
	fn invoke_moves_selection() {
		let mut s = state(trunk(3));
		s.select(Some(NodeId(3)));
		assert_eq!(
			s.invoke_named("createSubBranch"),
			Ok(Applied::Done {
				selection: Some(NodeId(4))
			})
		);
		assert_eq!(s.selected, Some(NodeId(4)));
		s.invoke(Operation::DeleteSelectedNode);
		assert_eq!(s.selected, None);
		assert!(s.invoke_named("nope").is_err());
	}

	#[test]
	fn load_drops_selection_of_vanished_node() {
		let mut s = state(forked());
		s.select(Some(NodeId(6)));
		s.load(trunk(3));
		assert_eq!(s.selected, None);
		s.select(Some(NodeId(2)));
		s.load(forked());
		assert_eq!(s.selected, Some(NodeId(2)));
	}
}
