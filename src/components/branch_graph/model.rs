//! Arena-backed branch tree.
//!
//! Nodes and branches live in id-keyed maps. A node names its owning branch,
//! a branch names the node it forks from; every traversal goes through those
//! ids. Structural operations work relative to a selected node, never fail,
//! and relayout before returning.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use log::debug;
use thiserror::Error;

use super::config::{BRANCH_COLORS, GRID_SPACING};
use super::layout::{self, LayoutResult, Topology};
use super::types::Camera;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchId(pub u32);

impl fmt::Display for NodeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl fmt::Display for BranchId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
	pub id: NodeId,
	pub x: f64,
	pub y: f64,
	pub is_head: bool,
	pub is_hidden: bool,
	pub branch: BranchId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Branch {
	pub id: BranchId,
	pub label: Option<String>,
	pub color: String,
	/// Sorted by descending y: the bottom node first, the topmost last.
	pub nodes: Vec<NodeId>,
	pub parent_node: Option<NodeId>,
	pub is_hidden: bool,
}

impl Branch {
	pub fn is_trunk(&self) -> bool {
		self.parent_node.is_none()
	}
}

/// Outcome of a structural operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
	/// Precondition failed, nothing changed.
	NoOp,
	/// The graph changed; `selection` is what should be selected now.
	Done { selection: Option<NodeId> },
}

#[derive(Clone, Debug)]
pub struct Graph {
	pub id: String,
	pub name: String,
	pub camera: Camera,
	pub(super) nodes: BTreeMap<NodeId, Node>,
	pub(super) branches: BTreeMap<BranchId, Branch>,
	pub(super) branch_order: Vec<BranchId>,
	pub(super) next_node_id: u32,
	pub(super) next_branch_id: u32,
	pub(super) next_color_index: u32,
	revision: u64,
}

// The revision counter is bookkeeping for layout reconciliation, not structure.
impl PartialEq for Graph {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
			&& self.name == other.name
			&& self.camera == other.camera
			&& self.nodes == other.nodes
			&& self.branches == other.branches
			&& self.branch_order == other.branch_order
			&& self.next_node_id == other.next_node_id
			&& self.next_branch_id == other.next_branch_id
			&& self.next_color_index == other.next_color_index
	}
}

impl Graph {
	pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
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
			revision: 0,
		}
	}

	/// A graph whose trunk holds a single head node at the world origin.
	pub fn with_trunk(id: impl Into<String>, name: impl Into<String>) -> Self {
		let mut graph = Self::new(id, name);
		let branch_id = graph.alloc_branch_id();
		let color = graph.next_color();
		let node_id = graph.alloc_node_id();
		graph.nodes.insert(
			node_id,
			Node {
				id: node_id,
				x: 0.0,
				y: 0.0,
				is_head: true,
				is_hidden: false,
				branch: branch_id,
			},
		);
		graph.branches.insert(
			branch_id,
			Branch {
				id: branch_id,
				label: None,
				color,
				nodes: vec![node_id],
				parent_node: None,
				is_hidden: false,
			},
		);
		graph.branch_order.push(branch_id);
		graph
	}

	pub(super) fn from_parts(
		id: String,
		name: String,
		camera: Camera,
		nodes: BTreeMap<NodeId, Node>,
		branches: BTreeMap<BranchId, Branch>,
		branch_order: Vec<BranchId>,
		counters: (u32, u32, u32),
	) -> Self {
		let (next_node_id, next_branch_id, next_color_index) = counters;
		let mut graph = Self {
			id,
			name,
			camera,
			nodes,
			branches,
			branch_order,
			next_node_id,
			next_branch_id,
			next_color_index,
			revision: 0,
		};
		let ids: Vec<BranchId> = graph.branch_order.clone();
		for bid in ids {
			graph.sort_branch(bid);
		}
		graph
	}

	pub fn node(&self, id: NodeId) -> Option<&Node> {
		self.nodes.get(&id)
	}

	pub fn branch(&self, id: BranchId) -> Option<&Branch> {
		self.branches.get(&id)
	}

	pub fn nodes(&self) -> impl Iterator<Item = &Node> {
		self.nodes.values()
	}

	/// Branches in creation order.
	pub fn branches(&self) -> impl Iterator<Item = &Branch> {
		self.branch_order.iter().filter_map(|id| self.branches.get(id))
	}

	pub fn branch_order(&self) -> &[BranchId] {
		&self.branch_order
	}

	pub fn node_count(&self) -> usize {
		self.nodes.len()
	}

	pub fn next_node_id(&self) -> u32 {
		self.next_node_id
	}

	pub fn next_branch_id(&self) -> u32 {
		self.next_branch_id
	}

	pub fn next_color_index(&self) -> u32 {
		self.next_color_index
	}

	pub fn revision(&self) -> u64 {
		self.revision
	}

	pub fn trunk(&self) -> Option<&Branch> {
		self.branches().find(|b| b.is_trunk())
	}

	/// The topmost node of the trunk.
	pub fn trunk_head(&self) -> Option<NodeId> {
		self.trunk().and_then(|b| b.nodes.last().copied())
	}

	pub fn is_trunk_root(&self, id: NodeId) -> bool {
		self.nodes
			.get(&id)
			.and_then(|n| self.branches.get(&n.branch))
			.is_some_and(|b| b.is_trunk() && b.nodes.first() == Some(&id))
	}

	pub fn child_branches(&self, id: NodeId) -> impl Iterator<Item = &Branch> {
		self.branches().filter(move |b| b.parent_node == Some(id))
	}

	pub fn has_child_branches(&self, id: NodeId) -> bool {
		self.child_branches(id).next().is_some()
	}

	/// Nodes of the same branch positioned above `id`, bottom to top.
	pub fn nodes_above(&self, id: NodeId) -> Vec<NodeId> {
		self.extension_from(id, 1)
	}

	fn extension_from(&self, id: NodeId, skip: usize) -> Vec<NodeId> {
		let Some(branch) = self.nodes.get(&id).and_then(|n| self.branches.get(&n.branch)) else {
			return Vec::new();
		};
		match branch.nodes.iter().position(|&n| n == id) {
			Some(idx) => branch.nodes[idx + skip..].to_vec(),
			None => Vec::new(),
		}
	}

	/// Every branch forked, directly or transitively, from `id`, in creation order.
	pub fn descendant_branches(&self, id: NodeId) -> Vec<BranchId> {
		let mut forks: HashMap<BranchId, Vec<BranchId>> = HashMap::new();
		let mut found: HashSet<BranchId> = HashSet::new();
		let mut queue = VecDeque::new();
		for branch in self.branches() {
			let Some(parent) = branch.parent_node else {
				continue;
			};
			if parent == id {
				found.insert(branch.id);
				queue.push_back(branch.id);
			} else if let Some(owner) = self.nodes.get(&parent) {
				forks.entry(owner.branch).or_default().push(branch.id);
			}
		}
		// `found` only grows, so the walk visits each branch at most once.
		while let Some(bid) = queue.pop_front() {
			for &child in forks.get(&bid).into_iter().flatten() {
				if found.insert(child) {
					queue.push_back(child);
				}
			}
		}
		self.branch_order
			.iter()
			.copied()
			.filter(|b| found.contains(b))
			.collect()
	}

	pub fn has_hidden_children(&self, id: NodeId) -> bool {
		self.child_branches(id).any(|b| b.is_hidden)
	}

	pub fn has_hidden_extension(&self, id: NodeId) -> bool {
		self.nodes_above(id)
			.iter()
			.any(|n| self.nodes.get(n).is_some_and(|n| n.is_hidden))
	}

	pub fn apply(&mut self, op: Operation, selected: Option<NodeId>) -> Applied {
		let applied = (op.handler())(self, selected);
		debug!("{op} on {selected:?}: {applied:?}");
		applied
	}

	pub fn create_sub_branch(&mut self, selected: Option<NodeId>) -> Applied {
		let Some(parent) = selected.and_then(|id| self.nodes.get(&id)) else {
			return Applied::NoOp;
		};
		let (parent_id, px, py) = (parent.id, parent.x, parent.y);
		if self.has_child_branches(parent_id) {
			return Applied::NoOp;
		}

		let branch_id = self.alloc_branch_id();
		let color = self.next_color();
		let node_id = self.alloc_node_id();
		self.nodes.insert(
			node_id,
			Node {
				id: node_id,
				x: px + GRID_SPACING,
				y: py - GRID_SPACING,
				is_head: true,
				is_hidden: false,
				branch: branch_id,
			},
		);
		self.branches.insert(
			branch_id,
			Branch {
				id: branch_id,
				label: None,
				color,
				nodes: vec![node_id],
				parent_node: Some(parent_id),
				is_hidden: false,
			},
		);
		self.branch_order.push(branch_id);
		self.relayout();
		Applied::Done {
			selection: Some(node_id),
		}
	}

	pub fn expand_branch(&mut self, selected: Option<NodeId>) -> Applied {
		let Some(head) = selected.and_then(|id| self.nodes.get_mut(&id)) else {
			return Applied::NoOp;
		};
		if !head.is_head {
			return Applied::NoOp;
		}
		head.is_head = false;
		let (x, y, branch) = (head.x, head.y, head.branch);
		let node_id = self.push_node(branch, x, y - GRID_SPACING);
		self.relayout();
		Applied::Done {
			selection: Some(node_id),
		}
	}

	pub fn fold_selected(&mut self, selected: Option<NodeId>) -> Applied {
		let Some(id) = selected.filter(|id| self.nodes.contains_key(id)) else {
			return Applied::NoOp;
		};
		for bid in self.descendant_branches(id) {
			self.set_branch_hidden(bid, true);
		}
		self.relayout();
		Applied::Done {
			selection: Some(id),
		}
	}

	pub fn unfold_selected(&mut self, selected: Option<NodeId>) -> Applied {
		let Some(node) = selected.and_then(|id| self.nodes.get(&id)) else {
			return Applied::NoOp;
		};
		let (id, own) = (node.id, node.branch);
		for bid in self.descendant_branches(id) {
			self.set_branch_hidden(bid, false);
		}
		self.set_branch_hidden(own, false);
		self.relayout();
		Applied::Done {
			selection: Some(id),
		}
	}

	pub fn collapse_selected(&mut self, selected: Option<NodeId>) -> Applied {
		let Some(node) = selected.and_then(|id| self.nodes.get(&id)) else {
			return Applied::NoOp;
		};
		if node.is_head {
			return Applied::NoOp;
		}
		let id = node.id;
		for above in self.nodes_above(id) {
			if let Some(n) = self.nodes.get_mut(&above) {
				n.is_hidden = true;
				n.is_head = false;
			}
			for bid in self.descendant_branches(above) {
				self.set_branch_hidden(bid, true);
			}
		}
		if let Some(n) = self.nodes.get_mut(&id) {
			n.is_head = true;
		}
		self.relayout();
		Applied::Done {
			selection: Some(id),
		}
	}

	pub fn delete_selected_children(&mut self, selected: Option<NodeId>) -> Applied {
		let Some(id) = selected.filter(|id| self.nodes.contains_key(id)) else {
			return Applied::NoOp;
		};
		let doomed = self.descendant_branches(id);
		if doomed.is_empty() {
			return Applied::NoOp;
		}
		self.remove_branches(&doomed);
		self.relayout();
		Applied::Done {
			selection: Some(id),
		}
	}

	pub fn delete_selected_extension(&mut self, selected: Option<NodeId>) -> Applied {
		let Some(node) = selected.and_then(|id| self.nodes.get(&id)) else {
			return Applied::NoOp;
		};
		if node.is_head {
			return Applied::NoOp;
		}
		let (id, branch) = (node.id, node.branch);
		let extension = self.nodes_above(id);
		if extension.is_empty() {
			return Applied::NoOp;
		}
		self.remove_nodes(branch, &extension);
		if let Some(n) = self.nodes.get_mut(&id) {
			n.is_head = true;
		}
		self.relayout();
		Applied::Done {
			selection: Some(id),
		}
	}

	/// Removes the node, its extension, and everything forked from them.
	/// The trunk's root node is never removed.
	pub fn delete_selected_node(&mut self, selected: Option<NodeId>) -> Applied {
		let Some(node) = selected.and_then(|id| self.nodes.get(&id)) else {
			return Applied::NoOp;
		};
		let (id, branch) = (node.id, node.branch);
		if self.is_trunk_root(id) {
			return Applied::NoOp;
		}
		let doomed = self.extension_from(id, 0);
		self.remove_nodes(branch, &doomed);

		let remaining = self
			.branches
			.get(&branch)
			.map(|b| b.nodes.clone())
			.unwrap_or_default();
		if remaining.is_empty() {
			self.remove_branches(&[branch]);
		} else {
			for nid in &remaining {
				if let Some(n) = self.nodes.get_mut(nid) {
					n.is_head = false;
				}
			}
			if let Some(top) = remaining.last().and_then(|t| self.nodes.get_mut(t)) {
				top.is_head = true;
			}
		}
		self.relayout();
		Applied::Done { selection: None }
	}

	/// Adds a new head above the topmost node of `anchor`'s branch. A folded
	/// branch is revealed first, together with whatever hides its fork.
	pub fn append_head(&mut self, anchor: NodeId) -> Option<NodeId> {
		let branch = self.nodes.get(&anchor)?.branch;
		self.reveal_path(branch);
		let top = *self.branches.get(&branch)?.nodes.last()?;
		let (x, y) = self.nodes.get(&top).map(|n| (n.x, n.y))?;
		for nid in self.branches.get(&branch)?.nodes.clone() {
			if let Some(n) = self.nodes.get_mut(&nid) {
				n.is_head = false;
			}
		}
		let node_id = self.push_node(branch, x, y - GRID_SPACING);
		self.relayout();
		Some(node_id)
	}

	/// Recomputes x positions from the current topology.
	pub fn relayout(&mut self) {
		self.revision += 1;
		let result = layout::compute(&Topology::snapshot(self));
		self.apply_layout(&result);
	}

	/// Writes a layout back, unless the topology changed since it was requested.
	pub fn apply_layout(&mut self, result: &LayoutResult) -> bool {
		if result.revision != self.revision {
			debug!(
				"discarding layout for revision {} (graph is at {})",
				result.revision, self.revision
			);
			return false;
		}
		for (id, pos) in &result.positions {
			if let Some(n) = self.nodes.get_mut(id) {
				n.x = pos.x;
				n.y = pos.y;
			}
		}
		true
	}

	fn alloc_node_id(&mut self) -> NodeId {
		let id = NodeId(self.next_node_id);
		self.next_node_id += 1;
		id
	}

	fn alloc_branch_id(&mut self) -> BranchId {
		let id = BranchId(self.next_branch_id);
		self.next_branch_id += 1;
		id
	}

	fn next_color(&mut self) -> String {
		let idx = self.next_color_index as usize % BRANCH_COLORS.len();
		self.next_color_index = ((idx + 1) % BRANCH_COLORS.len()) as u32;
		BRANCH_COLORS[idx].to_string()
	}

	fn push_node(&mut self, branch: BranchId, x: f64, y: f64) -> NodeId {
		let id = self.alloc_node_id();
		self.nodes.insert(
			id,
			Node {
				id,
				x,
				y,
				is_head: true,
				is_hidden: false,
				branch,
			},
		);
		if let Some(b) = self.branches.get_mut(&branch) {
			b.nodes.push(id);
		}
		self.sort_branch(branch);
		id
	}

	fn sort_branch(&mut self, branch: BranchId) {
		let Some(b) = self.branches.get_mut(&branch) else {
			return;
		};
		let nodes = &self.nodes;
		let y = |id: &NodeId| nodes.get(id).map_or(0.0, |n| n.y);
		b.nodes.sort_by(|a, c| y(c).total_cmp(&y(a)));
	}

	/// Hiding keeps head flags as they are. Revealing shows every node of the
	/// branch, so the head moves back to the topmost one.
	fn set_branch_hidden(&mut self, branch: BranchId, hidden: bool) {
		let Some(b) = self.branches.get_mut(&branch) else {
			return;
		};
		b.is_hidden = hidden;
		for nid in &b.nodes {
			if let Some(n) = self.nodes.get_mut(nid) {
				n.is_hidden = hidden;
				if !hidden {
					n.is_head = false;
				}
			}
		}
		if !hidden {
			if let Some(top) = b.nodes.last().and_then(|t| self.nodes.get_mut(t)) {
				top.is_head = true;
			}
		}
	}

	/// Shows `branch` and, walking towards the trunk, every branch that is
	/// folded or whose collapsed extension holds the fork it hangs from.
	fn reveal_path(&mut self, branch: BranchId) {
		let mut seen = HashSet::new();
		let mut cur = Some(branch);
		let mut fork_hidden = false;
		while let Some(bid) = cur {
			if !seen.insert(bid) {
				break;
			}
			let Some(b) = self.branches.get(&bid) else {
				break;
			};
			let parent = b.parent_node.and_then(|p| self.nodes.get(&p));
			let next = parent.map(|n| (n.branch, n.is_hidden));
			if b.is_hidden || fork_hidden {
				debug!("revealing branch {bid:?}");
				self.set_branch_hidden(bid, false);
			}
			fork_hidden = next.is_some_and(|(_, hidden)| hidden);
			cur = next.map(|(owner, _)| owner);
		}
	}

	/// Drops `doomed` from `branch` together with every branch forked from them.
	fn remove_nodes(&mut self, branch: BranchId, doomed: &[NodeId]) {
		let mut forks: Vec<BranchId> = Vec::new();
		for &nid in doomed {
			for bid in self.descendant_branches(nid) {
				if !forks.contains(&bid) {
					forks.push(bid);
				}
			}
		}
		self.remove_branches(&forks);
		for nid in doomed {
			self.nodes.remove(nid);
		}
		if let Some(b) = self.branches.get_mut(&branch) {
			b.nodes.retain(|n| !doomed.contains(n));
		}
	}

	fn remove_branches(&mut self, doomed: &[BranchId]) {
		for bid in doomed {
			if let Some(b) = self.branches.remove(bid) {
				for nid in b.nodes {
					self.nodes.remove(&nid);
				}
			}
		}
		self.branch_order.retain(|b| !doomed.contains(b));
	}
}

/// Structural operations, addressable by the names the controls use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
	CreateSubBranch,
	ExpandBranch,
	CollapseSelected,
	FoldSelected,
	UnfoldSelected,
	DeleteSelectedNode,
	DeleteSelectedExtension,
	DeleteSelectedChildren,
}

type Handler = fn(&mut Graph, Option<NodeId>) -> Applied;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown graph operation `{0}`")]
pub struct UnknownOperation(pub String);

impl Operation {
	pub const ALL: [Operation; 8] = [
		Operation::CreateSubBranch,
		Operation::ExpandBranch,
		Operation::CollapseSelected,
		Operation::FoldSelected,
		Operation::UnfoldSelected,
		Operation::DeleteSelectedNode,
		Operation::DeleteSelectedExtension,
		Operation::DeleteSelectedChildren,
	];

	pub fn name(self) -> &'static str {
		match self {
			Operation::CreateSubBranch => "createSubBranch",
			Operation::ExpandBranch => "expandBranch",
			Operation::CollapseSelected => "collapseSelected",
			Operation::FoldSelected => "foldSelected",
			Operation::UnfoldSelected => "unfoldSelected",
			Operation::DeleteSelectedNode => "deleteSelectedNode",
			Operation::DeleteSelectedExtension => "deleteSelectedExtension",
			Operation::DeleteSelectedChildren => "deleteSelectedChildren",
		}
	}

	pub fn label(self) -> &'static str {
		match self {
			Operation::CreateSubBranch => "Create Sub-Branch",
			Operation::ExpandBranch => "Expand Head",
			Operation::CollapseSelected => "Collapse Extension",
			Operation::FoldSelected => "Fold Children",
			Operation::UnfoldSelected => "Unfold",
			Operation::DeleteSelectedNode => "Delete Node",
			Operation::DeleteSelectedExtension => "Delete Extension",
			Operation::DeleteSelectedChildren => "Delete Children",
		}
	}

	pub fn is_destructive(self) -> bool {
		matches!(
			self,
			Operation::DeleteSelectedNode
				| Operation::DeleteSelectedExtension
				| Operation::DeleteSelectedChildren
		)
	}

	fn handler(self) -> Handler {
		match self {
			Operation::CreateSubBranch => Graph::create_sub_branch,
			Operation::ExpandBranch => Graph::expand_branch,
			Operation::CollapseSelected => Graph::collapse_selected,
			Operation::FoldSelected => Graph::fold_selected,
			Operation::UnfoldSelected => Graph::unfold_selected,
			Operation::DeleteSelectedNode => Graph::delete_selected_node,
			Operation::DeleteSelectedExtension => Graph::delete_selected_extension,
			Operation::DeleteSelectedChildren => Graph::delete_selected_children,
		}
	}
}

impl fmt::Display for Operation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for Operation {
	type Err = UnknownOperation;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Operation::ALL
			.into_iter()
			.find(|op| op.name() == s)
			.ok_or_else(|| UnknownOperation(s.to_string()))
	}
}
