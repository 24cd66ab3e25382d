//! Column layout for the branch forest.
//!
//! The trunk keeps its x. Every other branch gets its own column: children of
//! a branch are placed left to right, each one grid step right of the widest
//! extent of the sibling before it, and a child's subtree is laid out before
//! the next sibling is placed. Hidden or empty branches take no space and keep
//! their coordinates. y is never touched.
//!
//! [`compute`] is pure: a [`Topology`] snapshot in, a full position map out.
//! That lets it run off the event loop; [`Graph::apply_layout`] drops results
//! computed for an older revision.
//!
//! [`Graph::apply_layout`]: super::model::Graph::apply_layout

use std::collections::{BTreeMap, HashMap, HashSet};

use super::config::GRID_SPACING;
use super::model::{BranchId, Graph, NodeId};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
	pub x: f64,
	pub y: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BranchShape {
	pub id: BranchId,
	pub parent_node: Option<NodeId>,
	/// Members bottom to top with their current positions.
	pub nodes: Vec<(NodeId, Point)>,
	/// Not folded away and at least one member is showing.
	pub visible: bool,
}

/// Everything layout needs to know about a graph at one revision.
#[derive(Clone, Debug, PartialEq)]
pub struct Topology {
	pub revision: u64,
	/// Branches in creation order.
	pub branches: Vec<BranchShape>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayoutResult {
	pub revision: u64,
	pub positions: BTreeMap<NodeId, Point>,
}

impl Topology {
	pub fn snapshot(graph: &Graph) -> Self {
		let branches = graph
			.branches()
			.map(|b| {
				let nodes: Vec<(NodeId, Point)> = b
					.nodes
					.iter()
					.filter_map(|id| graph.node(*id))
					.map(|n| (n.id, Point { x: n.x, y: n.y }))
					.collect();
				let visible = !b.is_hidden
					&& b.nodes
						.iter()
						.any(|id| graph.node(*id).is_some_and(|n| !n.is_hidden));
				BranchShape {
					id: b.id,
					parent_node: b.parent_node,
					nodes,
					visible,
				}
			})
			.collect();
		Self {
			revision: graph.revision(),
			branches,
		}
	}
}

struct Placer<'a> {
	shapes: HashMap<BranchId, &'a BranchShape>,
	children: HashMap<BranchId, Vec<&'a BranchShape>>,
	positions: BTreeMap<NodeId, Point>,
	placed: HashSet<BranchId>,
}

impl Placer<'_> {
	/// Puts `shape` on column `start_x` and returns the rightmost column its subtree used.
	fn place(&mut self, id: BranchId, start_x: f64) -> f64 {
		// A branch is placed once; a malformed cycle cannot recurse forever.
		if !self.placed.insert(id) {
			return start_x;
		}
		let Some(shape) = self.shapes.get(&id).copied() else {
			return start_x;
		};
		for (nid, _) in &shape.nodes {
			if let Some(p) = self.positions.get_mut(nid) {
				p.x = start_x;
			}
		}
		self.place_children(id, start_x)
	}

	fn place_children(&mut self, id: BranchId, start_x: f64) -> f64 {
		let children: Vec<BranchId> = self
			.children
			.get(&id)
			.into_iter()
			.flatten()
			.filter(|c| c.visible)
			.map(|c| c.id)
			.collect();
		let mut rightmost = start_x;
		for child in children {
			rightmost = self.place(child, rightmost + GRID_SPACING);
		}
		rightmost
	}
}

pub fn compute(topology: &Topology) -> LayoutResult {
	let mut positions = BTreeMap::new();
	let mut owner: HashMap<NodeId, (BranchId, f64)> = HashMap::new();
	for shape in &topology.branches {
		for (nid, p) in &shape.nodes {
			positions.insert(*nid, *p);
			owner.insert(*nid, (shape.id, p.y));
		}
	}

	let mut children: HashMap<BranchId, Vec<&BranchShape>> = HashMap::new();
	for shape in &topology.branches {
		if let Some((parent_branch, _)) = shape.parent_node.and_then(|p| owner.get(&p)) {
			children.entry(*parent_branch).or_default().push(shape);
		}
	}
	// Forks higher up the parent come first; ties keep creation order.
	let fork_y = |s: &BranchShape| {
		s.parent_node
			.and_then(|p| owner.get(&p))
			.map_or(0.0, |(_, y)| *y)
	};
	for list in children.values_mut() {
		list.sort_by(|a, b| fork_y(*a).total_cmp(&fork_y(*b)));
	}

	let trunk = topology
		.branches
		.iter()
		.find(|s| s.parent_node.is_none() && !s.nodes.is_empty());
	let mut placer = Placer {
		shapes: topology.branches.iter().map(|s| (s.id, s)).collect(),
		children,
		positions,
		placed: HashSet::new(),
	};
	if let Some(trunk) = trunk {
		placer.placed.insert(trunk.id);
		placer.place_children(trunk.id, trunk.nodes[0].1.x);
	}

	LayoutResult {
		revision: topology.revision,
		positions: placer.positions,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::branch_graph::model::Operation;
	use crate::components::branch_graph::model::tests::{forked, select, trunk};

	fn x_of(g: &Graph, id: u32) -> f64 {
		g.node(NodeId(id)).unwrap().x
	}

	#[test]
	fn trunk_keeps_its_column() {
		let mut g = trunk(3);
		select(g.create_sub_branch(Some(NodeId(3))));
		assert_eq!(x_of(&g, 1), 0.0);
		assert_eq!(x_of(&g, 3), 0.0);
		assert_eq!(x_of(&g, 4), GRID_SPACING);
	}

	#[test]
	fn wide_subtree_pushes_later_siblings_right() {
		// Fork from node 2 grows its own fork, then a second fork off node 1.
		let mut g = forked();
		select(g.create_sub_branch(Some(NodeId(1))));
		// branch 2 (node 2) sorts before branch 4 (node 1) since node 2 sits higher.
		assert_eq!(x_of(&g, 4), GRID_SPACING);
		assert_eq!(x_of(&g, 5), GRID_SPACING);
		assert_eq!(x_of(&g, 6), 2.0 * GRID_SPACING);
		assert_eq!(x_of(&g, 7), 3.0 * GRID_SPACING);
	}

	#[test]
	fn folded_branches_take_no_space() {
		let mut g = forked();
		select(g.create_sub_branch(Some(NodeId(1))));
		let before = x_of(&g, 6);
		select(g.fold_selected(Some(NodeId(2))));
		assert_eq!(x_of(&g, 7), GRID_SPACING);
		// hidden nodes are left where they were
		assert_eq!(x_of(&g, 6), before);
	}

	#[test]
	fn relayout_is_idempotent() {
		let mut g = forked();
		select(g.create_sub_branch(Some(NodeId(3))));
		let first = compute(&Topology::snapshot(&g));
		assert!(g.apply_layout(&first));
		let second = compute(&Topology::snapshot(&g));
		assert_eq!(first, second);
	}

	#[test]
	fn stale_layout_is_discarded() {
		let mut g = forked();
		let request = Topology::snapshot(&g);
		// the graph moves on while the layout is in flight
		g.apply(Operation::DeleteSelectedChildren, Some(NodeId(2)));
		let stale = compute(&request);
		let before = g.clone();
		assert!(!g.apply_layout(&stale));
		assert_eq!(g, before);

		let fresh = compute(&Topology::snapshot(&g));
		assert!(g.apply_layout(&fresh));
	}

	#[test]
	fn cyclic_topology_terminates() {
		let a = BranchShape {
			id: BranchId(2),
			parent_node: Some(NodeId(3)),
			nodes: vec![(NodeId(2), Point { x: 9.0, y: 0.0 })],
			visible: true,
		};
		let b = BranchShape {
			id: BranchId(3),
			parent_node: Some(NodeId(2)),
			nodes: vec![(NodeId(3), Point { x: 9.0, y: -60.0 })],
			visible: true,
		};
		let trunk = BranchShape {
			id: BranchId(1),
			parent_node: None,
			nodes: vec![(NodeId(1), Point { x: 0.0, y: 0.0 })],
			visible: true,
		};
		let result = compute(&Topology {
			revision: 1,
			branches: vec![trunk, a, b],
		});
		assert_eq!(result.positions.len(), 3);
		assert_eq!(result.positions[&NodeId(2)].x, 9.0);
	}
}
