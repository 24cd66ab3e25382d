//! Conversion between the arena [`Graph`] and the flat [`WireGraph`].

use std::collections::{BTreeMap, HashMap, HashSet};

use thiserror::Error;

use super::config::BRANCH_COLORS;
use super::model::{Branch, BranchId, Graph, Node, NodeId};
use super::types::{WireBranch, WireGraph, WireNode};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
	#[error("{kind} keyed `{key}` carries id {id}")]
	KeyMismatch {
		kind: &'static str,
		key: String,
		id: u32,
	},
	#[error("branch {branch} lists node {node}, which does not exist")]
	DanglingNode { branch: u32, node: u32 },
	#[error("node {node} is listed by both branch {first} and branch {second}")]
	SharedNode { node: u32, first: u32, second: u32 },
	#[error("node {0} belongs to no branch")]
	OrphanNode(u32),
	#[error("branch {branch} forks from node {node}, which does not exist")]
	MissingParent { branch: u32, node: u32 },
	#[error("branch {branch} forks from its own node {node}")]
	SelfParent { branch: u32, node: u32 },
	#[error("graph has branches but no trunk")]
	NoTrunk,
	#[error("graph has several trunks: {0:?}")]
	SeveralTrunks(Vec<u32>),
	#[error("branch {0} is its own ancestor")]
	CyclicAncestry(u32),
	#[error("branchOrder names unknown branch {0}")]
	UnknownOrderedBranch(u32),
	#[error("branchOrder lists branch {0} more than once")]
	DuplicateOrderedBranch(u32),
	#[error("branch {0} is missing from branchOrder")]
	UnorderedBranch(u32),
	#[error("{kind} id {id} leaves no room for new ids")]
	IdOverflow { kind: &'static str, id: u32 },
}

pub fn serialize(graph: &Graph) -> WireGraph {
	let nodes: BTreeMap<String, WireNode> = graph
		.nodes()
		.map(|n| {
			(
				n.id.to_string(),
				WireNode {
					id: n.id.0,
					x: n.x,
					y: n.y,
					is_head: n.is_head,
					is_hidden: n.is_hidden,
				},
			)
		})
		.collect();
	let branches: BTreeMap<String, WireBranch> = graph
		.branches()
		.map(|b| {
			(
				b.id.to_string(),
				WireBranch {
					id: b.id.0,
					label: b.label.clone(),
					color: b.color.clone(),
					node_ids: b.nodes.iter().map(|n| n.0).collect(),
					parent_node_id: b.parent_node.map(|n| n.0),
				},
			)
		})
		.collect();

	let max_node = graph.nodes().map(|n| n.id.0).max().unwrap_or(0);
	let max_branch = graph.branches().map(|b| b.id.0).max().unwrap_or(0);

	WireGraph {
		id: graph.id.clone(),
		name: graph.name.clone(),
		camera: graph.camera,
		nodes,
		branches,
		branch_order: graph.branch_order().iter().map(|b| b.0).collect(),
		next_node_id: graph.next_node_id().max(max_node.saturating_add(1)),
		next_branch_id: graph.next_branch_id().max(max_branch.saturating_add(1)),
		next_color_index: graph.next_color_index(),
	}
}

/// Rebuilds a graph, rejecting anything layout could not safely walk.
pub fn deserialize(wire: &WireGraph) -> Result<Graph, CodecError> {
	for (key, n) in &wire.nodes {
		check_key("node", key, n.id)?;
	}
	for (key, b) in &wire.branches {
		check_key("branch", key, b.id)?;
	}

	let mut seen = HashSet::new();
	for &bid in &wire.branch_order {
		if !wire.branches.contains_key(&bid.to_string()) {
			return Err(CodecError::UnknownOrderedBranch(bid));
		}
		if !seen.insert(bid) {
			return Err(CodecError::DuplicateOrderedBranch(bid));
		}
	}
	if let Some(b) = wire.branches.values().find(|b| !seen.contains(&b.id)) {
		return Err(CodecError::UnorderedBranch(b.id));
	}

	let mut owner: HashMap<u32, u32> = HashMap::new();
	for b in wire.branches.values() {
		for &nid in &b.node_ids {
			if !wire.nodes.contains_key(&nid.to_string()) {
				return Err(CodecError::DanglingNode {
					branch: b.id,
					node: nid,
				});
			}
			if let Some(first) = owner.insert(nid, b.id) {
				return Err(CodecError::SharedNode {
					node: nid,
					first,
					second: b.id,
				});
			}
		}
	}
	if let Some(n) = wire.nodes.values().find(|n| !owner.contains_key(&n.id)) {
		return Err(CodecError::OrphanNode(n.id));
	}

	let mut trunks = Vec::new();
	for b in wire.branches.values() {
		match b.parent_node_id {
			None => trunks.push(b.id),
			Some(p) => match owner.get(&p) {
				None => {
					return Err(CodecError::MissingParent {
						branch: b.id,
						node: p,
					});
				}
				Some(&o) if o == b.id => {
					return Err(CodecError::SelfParent {
						branch: b.id,
						node: p,
					});
				}
				Some(_) => {}
			},
		}
	}
	match trunks.len() {
		0 if !wire.branches.is_empty() => return Err(CodecError::NoTrunk),
		0 | 1 => {}
		_ => return Err(CodecError::SeveralTrunks(trunks)),
	}

	let parent_branch = |b: &WireBranch| b.parent_node_id.and_then(|p| owner.get(&p).copied());
	for b in wire.branches.values() {
		let mut cur = parent_branch(b);
		let mut steps = 0;
		while let Some(bid) = cur {
			steps += 1;
			if bid == b.id || steps > wire.branches.len() {
				return Err(CodecError::CyclicAncestry(b.id));
			}
			cur = wire
				.branches
				.get(&bid.to_string())
				.and_then(|p| parent_branch(p));
		}
	}

	let nodes: BTreeMap<NodeId, Node> = wire
		.nodes
		.values()
		.map(|n| {
			let id = NodeId(n.id);
			(
				id,
				Node {
					id,
					x: n.x,
					y: n.y,
					is_head: n.is_head,
					is_hidden: n.is_hidden,
					branch: BranchId(owner[&n.id]),
				},
			)
		})
		.collect();
	let branches: BTreeMap<BranchId, Branch> = wire
		.branches
		.values()
		.map(|b| {
			let id = BranchId(b.id);
			let members: Vec<NodeId> = b.node_ids.iter().copied().map(NodeId).collect();
			let is_hidden = !members.is_empty()
				&& members
					.iter()
					.all(|n| nodes.get(n).is_some_and(|n| n.is_hidden));
			(
				id,
				Branch {
					id,
					label: b.label.clone(),
					color: b.color.clone(),
					nodes: members,
					parent_node: b.parent_node_id.map(NodeId),
					is_hidden,
				},
			)
		})
		.collect();

	let max_node = wire.nodes.values().map(|n| n.id).max().unwrap_or(0);
	let max_branch = wire.branches.values().map(|b| b.id).max().unwrap_or(0);
	let counters = (
		next_counter("node", wire.next_node_id, max_node)?,
		next_counter("branch", wire.next_branch_id, max_branch)?,
		wire.next_color_index % BRANCH_COLORS.len() as u32,
	);

	Ok(Graph::from_parts(
		wire.id.clone(),
		wire.name.clone(),
		wire.camera,
		nodes,
		branches,
		wire.branch_order.iter().copied().map(BranchId).collect(),
		counters,
	))
}

/// The counter, raised past every id in use.
fn next_counter(kind: &'static str, counter: u32, max_id: u32) -> Result<u32, CodecError> {
	let floor = max_id
		.checked_add(1)
		.ok_or(CodecError::IdOverflow { kind, id: max_id })?;
	Ok(counter.max(floor))
}

fn check_key(kind: &'static str, key: &str, id: u32) -> Result<(), CodecError> {
	if key.parse::<u32>().ok() == Some(id) {
		Ok(())
	} else {
		Err(CodecError::KeyMismatch {
			kind,
			key: key.to_string(),
			id,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::branch_graph::model::tests::{check_invariants, forked, select};
	use crate::components::branch_graph::types::Camera;

	fn round_trip(g: &Graph) -> Graph {
		deserialize(&serialize(g)).expect("valid graph")
	}

	#[test]
	fn round_trip_preserves_structure() {
		let mut g = forked();
		g.camera = Camera {
			x: -40.0,
			y: 310.5,
			scale: 1.7,
		};
		select(g.collapse_selected(Some(NodeId(4))));
		select(g.fold_selected(Some(NodeId(1))));
		let back = round_trip(&g);
		assert_eq!(back, g);
		check_invariants(&back);
	}

	#[test]
	fn round_trip_survives_json() {
		let g = forked();
		let json = serde_json::to_string(&serialize(&g)).unwrap();
		let wire: WireGraph = serde_json::from_str(&json).unwrap();
		assert_eq!(deserialize(&wire).unwrap(), g);
	}

	#[test]
	fn wire_shape_is_camel_case() {
		let g = forked();
		let value = serde_json::to_value(serialize(&g)).unwrap();
		assert_eq!(value["nextNodeId"], 7);
		assert_eq!(value["nextBranchId"], 4);
		assert_eq!(value["branchOrder"], serde_json::json!([1, 2, 3]));
		assert_eq!(value["branches"]["3"]["parentNodeId"], 5);
		assert_eq!(value["branches"]["1"]["parentNodeId"], serde_json::Value::Null);
		assert_eq!(value["branches"]["2"]["nodeIds"], serde_json::json!([4, 5]));
		assert_eq!(value["nodes"]["5"]["isHead"], true);
		assert!(value["nodes"]["5"].get("isHidden").is_none());
		assert!(value["branches"]["1"].get("label").is_none());
	}

	#[test]
	fn counters_cover_every_live_id() {
		let mut wire = serialize(&forked());
		wire.next_node_id = 1;
		wire.next_branch_id = 2;
		let g = deserialize(&wire).unwrap();
		assert_eq!(g.next_node_id(), 7);
		assert_eq!(g.next_branch_id(), 4);
	}

	#[test]
	fn empty_graph_round_trips() {
		let wire = WireGraph::empty("g", "Untitled 1");
		let g = deserialize(&wire).unwrap();
		assert_eq!(g.node_count(), 0);
		assert_eq!(serialize(&g), wire);
	}

	#[test]
	fn members_are_sorted_bottom_to_top() {
		let mut wire = serialize(&forked());
		wire.branches.get_mut("1").unwrap().node_ids = vec![3, 1, 2];
		let g = deserialize(&wire).unwrap();
		assert_eq!(
			g.branch(BranchId(1)).unwrap().nodes,
			vec![NodeId(1), NodeId(2), NodeId(3)]
		);
	}

	#[test]
	fn missing_hidden_flag_reads_as_visible() {
		let json = r##"{"id":"g","name":"n","camera":{"x":0,"y":0,"scale":1},
			"nodes":{"1":{"id":1,"x":0,"y":0,"isHead":true}},
			"branches":{"1":{"id":1,"color":"#f59e0b","nodeIds":[1],"parentNodeId":null}},
			"branchOrder":[1],"nextNodeId":2,"nextBranchId":2,"nextColorIndex":1}"##;
		let wire: WireGraph = serde_json::from_str(json).unwrap();
		let g = deserialize(&wire).unwrap();
		assert!(!g.node(NodeId(1)).unwrap().is_hidden);
		assert!(g.is_trunk_root(NodeId(1)));
	}

	#[test]
	fn rejects_ids_at_the_top_of_the_range() {
		let top = u32::MAX;

		let mut wire = serialize(&forked());
		let mut node = wire.nodes.remove("6").unwrap();
		node.id = top;
		wire.nodes.insert(top.to_string(), node);
		wire.branches.get_mut("3").unwrap().node_ids = vec![top];
		assert_eq!(
			deserialize(&wire),
			Err(CodecError::IdOverflow { kind: "node", id: top })
		);

		let mut wire = serialize(&forked());
		let mut branch = wire.branches.remove("3").unwrap();
		branch.id = top;
		wire.branches.insert(top.to_string(), branch);
		wire.branch_order = vec![1, 2, top];
		assert_eq!(
			deserialize(&wire),
			Err(CodecError::IdOverflow { kind: "branch", id: top })
		);

		// one below the top still loads, with the counter just past it
		let mut wire = serialize(&forked());
		let mut node = wire.nodes.remove("6").unwrap();
		node.id = top - 1;
		wire.nodes.insert((top - 1).to_string(), node);
		wire.branches.get_mut("3").unwrap().node_ids = vec![top - 1];
		assert_eq!(deserialize(&wire).unwrap().next_node_id(), top);
	}

	#[test]
	fn rejects_malformed_input() {
		let base = serialize(&forked());

		let mut wire = base.clone();
		wire.branches.get_mut("2").unwrap().node_ids.push(99);
		assert_eq!(
			deserialize(&wire),
			Err(CodecError::DanglingNode { branch: 2, node: 99 })
		);

		let mut wire = base.clone();
		wire.branches.get_mut("3").unwrap().parent_node_id = Some(42);
		assert_eq!(
			deserialize(&wire),
			Err(CodecError::MissingParent { branch: 3, node: 42 })
		);

		let mut wire = base.clone();
		wire.branches.get_mut("2").unwrap().parent_node_id = Some(6);
		assert_eq!(deserialize(&wire), Err(CodecError::CyclicAncestry(2)));

		let mut wire = base.clone();
		wire.branches.get_mut("3").unwrap().parent_node_id = Some(6);
		assert_eq!(
			deserialize(&wire),
			Err(CodecError::SelfParent { branch: 3, node: 6 })
		);

		let mut wire = base.clone();
		wire.branches.get_mut("2").unwrap().parent_node_id = None;
		assert_eq!(deserialize(&wire), Err(CodecError::SeveralTrunks(vec![1, 2])));

		let mut wire = base.clone();
		wire.branch_order.pop();
		assert_eq!(deserialize(&wire), Err(CodecError::UnorderedBranch(3)));

		let mut wire = base.clone();
		wire.branch_order.push(8);
		assert_eq!(deserialize(&wire), Err(CodecError::UnknownOrderedBranch(8)));

		let mut wire = base.clone();
		wire.branches.get_mut("3").unwrap().node_ids.push(5);
		assert_eq!(
			deserialize(&wire),
			Err(CodecError::SharedNode {
				node: 5,
				first: 2,
				second: 3
			})
		);

		let mut wire = base.clone();
		wire.branches.get_mut("3").unwrap().node_ids.clear();
		assert_eq!(deserialize(&wire), Err(CodecError::OrphanNode(6)));

		let mut wire = base;
		let node = wire.nodes.remove("6").unwrap();
		wire.nodes.insert("60".into(), node);
		assert!(matches!(
			deserialize(&wire),
			Err(CodecError::KeyMismatch { kind: "node", .. })
		));
	}
}
