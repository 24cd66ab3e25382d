//! Local graphs kept in step with the graph service.
//!
//! A request may carry a tentative patch: the graph the user sees while the
//! service answers. The answer either replaces everything with the service's
//! snapshot or, on failure, drops the patch and leaves the last authoritative
//! graph in place. Server and tentative state are never merged.

use log::{debug, info, warn};
use thiserror::Error;

use super::api::{GraphService, ServiceError};
use super::codec::{self, CodecError};
use super::model::{Graph, NodeId};
use super::types::WireGraph;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
	#[error(transparent)]
	Service(#[from] ServiceError),
	#[error("service sent a malformed graph: {0}")]
	Codec(#[from] CodecError),
	#[error("service answered for graph {got}, expected {expected}")]
	WrongGraph { expected: String, got: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
	/// The snapshot is now the authoritative graph.
	Adopted,
	/// A newer request superseded this one; the answer was ignored.
	Stale,
}

/// What a chat turn has to ask the service for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
	CreateRoot { graph_id: String },
	Extend { anchor: NodeId },
}

impl Outbound {
	pub async fn send<S: GraphService>(
		&self,
		service: &S,
		content: &str,
		author: &str,
	) -> Result<WireGraph, ServiceError> {
		match self {
			Outbound::CreateRoot { graph_id } => service.create_root(graph_id, content, author).await,
			Outbound::Extend { anchor } => service.extend_node(*anchor, content, author).await,
		}
	}
}

#[derive(Clone, Debug)]
struct Pending {
	id: RequestId,
	graph: Graph,
	ego_before: Option<NodeId>,
}

#[derive(Clone, Debug)]
pub struct GraphSession {
	authoritative: Graph,
	pending: Option<Pending>,
	next_request: u64,
	ego: Option<NodeId>,
}

impl GraphSession {
	pub fn new(graph: Graph) -> Self {
		Self {
			authoritative: graph,
			pending: None,
			next_request: 1,
			ego: None,
		}
	}

	pub fn from_wire(wire: &WireGraph) -> Result<Self, CodecError> {
		let mut session = Self::new(codec::deserialize(wire)?);
		session.ego = session.latest_node();
		Ok(session)
	}

	pub fn id(&self) -> &str {
		&self.authoritative.id
	}

	/// The graph to show: the tentative one while a request is out.
	pub fn view(&self) -> &Graph {
		self.pending
			.as_ref()
			.map_or(&self.authoritative, |p| &p.graph)
	}

	pub fn authoritative(&self) -> &Graph {
		&self.authoritative
	}

	pub fn is_pending(&self) -> bool {
		self.pending.is_some()
	}

	/// The node the next chat turn extends.
	pub fn ego(&self) -> Option<NodeId> {
		self.ego
	}

	pub fn set_ego(&mut self, node: Option<NodeId>) {
		self.ego = node;
	}

	/// Replaces local state wholesale, e.g. with edits made on the canvas.
	pub fn replace(&mut self, wire: &WireGraph) -> Result<(), SyncError> {
		let graph = self.decode(wire)?;
		self.authoritative = graph;
		self.pending = None;
		if self.ego.is_some_and(|id| self.authoritative.node(id).is_none()) {
			self.ego = self.latest_node();
		}
		Ok(())
	}

	/// Starts a request without a tentative patch.
	pub fn begin(&mut self) -> RequestId {
		let graph = self.view().clone();
		self.push_pending(graph)
	}

	/// Starts an `extend` request, showing the new head right away.
	pub fn begin_extend(&mut self, anchor: NodeId) -> Option<RequestId> {
		let mut graph = self.view().clone();
		let node = graph.append_head(anchor)?;
		let id = self.push_pending(graph);
		self.ego = Some(node);
		Some(id)
	}

	/// Starts whatever request a chat turn needs: seeding the trunk of an empty
	/// graph, otherwise extending from the ego node (or the trunk head).
	pub fn begin_message(&mut self) -> (RequestId, Outbound) {
		if self.view().trunk().is_none() {
			let graph_id = self.id().to_string();
			return (self.begin(), Outbound::CreateRoot { graph_id });
		}
		let anchor = self
			.ego
			.filter(|id| self.view().node(*id).is_some())
			.or_else(|| self.view().trunk_head());
		match anchor.and_then(|a| self.begin_extend(a).map(|id| (id, a))) {
			Some((id, anchor)) => (id, Outbound::Extend { anchor }),
			None => {
				let graph_id = self.id().to_string();
				(self.begin(), Outbound::CreateRoot { graph_id })
			}
		}
	}

	/// Settles request `id` with the service's answer.
	pub fn resolve(
		&mut self,
		id: RequestId,
		outcome: Result<WireGraph, ServiceError>,
	) -> Result<Resolution, SyncError> {
		if self.pending.as_ref().is_none_or(|p| p.id != id) {
			debug!("ignoring answer to superseded request {id:?}");
			return Ok(Resolution::Stale);
		}
		let Some(pending) = self.pending.take() else {
			return Ok(Resolution::Stale);
		};

		let adopted = outcome
			.map_err(SyncError::from)
			.and_then(|wire| self.decode(&wire));
		match adopted {
			Ok(graph) => {
				self.authoritative = graph;
				self.ego = self.latest_node();
				info!("graph {} synced, ego node {:?}", self.id(), self.ego);
				Ok(Resolution::Adopted)
			}
			Err(e) => {
				warn!("request {id:?} failed, keeping last synced graph: {e}");
				self.ego = pending.ego_before;
				Err(e)
			}
		}
	}

	fn push_pending(&mut self, graph: Graph) -> RequestId {
		let id = RequestId(self.next_request);
		self.next_request += 1;
		let ego_before = match &self.pending {
			Some(p) => p.ego_before,
			None => self.ego,
		};
		self.pending = Some(Pending {
			id,
			graph,
			ego_before,
		});
		id
	}

	fn decode(&self, wire: &WireGraph) -> Result<Graph, SyncError> {
		if wire.id != self.authoritative.id {
			return Err(SyncError::WrongGraph {
				expected: self.authoritative.id.clone(),
				got: wire.id.clone(),
			});
		}
		Ok(codec::deserialize(wire)?)
	}

	/// The newest node, as the service numbers them.
	fn latest_node(&self) -> Option<NodeId> {
		let id = NodeId(self.authoritative.next_node_id().checked_sub(1)?);
		self.authoritative.node(id).map(|n| n.id)
	}
}

/// All open graphs, in the order they were opened, plus the active one.
#[derive(Debug, Default)]
pub struct GraphManager {
	sessions: Vec<GraphSession>,
	active: Option<String>,
}

impl GraphManager {
	pub fn new_graph(&mut self) -> &mut GraphSession {
		let id = uuid::Uuid::new_v4().to_string();
		let name = format!("Untitled {}", self.sessions.len() + 1);
		self.open(GraphSession::new(Graph::new(id, name)))
	}

	/// Adds a session (or swaps out the one with the same id) and activates it.
	pub fn open(&mut self, session: GraphSession) -> &mut GraphSession {
		let id = session.id().to_string();
		let idx = match self.sessions.iter().position(|s| s.id() == id) {
			Some(idx) => {
				self.sessions[idx] = session;
				idx
			}
			None => {
				self.sessions.push(session);
				self.sessions.len() - 1
			}
		};
		self.active = Some(id);
		&mut self.sessions[idx]
	}

	pub fn select(&mut self, id: &str) -> bool {
		if self.sessions.iter().any(|s| s.id() == id) {
			self.active = Some(id.to_string());
			true
		} else {
			false
		}
	}

	pub fn remove(&mut self, id: &str) -> Option<GraphSession> {
		let idx = self.sessions.iter().position(|s| s.id() == id)?;
		let removed = self.sessions.remove(idx);
		if self.active.as_deref() == Some(id) {
			self.active = self.sessions.first().map(|s| s.id().to_string());
		}
		Some(removed)
	}

	/// Settles a service-side delete. The session only goes once the service
	/// has dropped the graph; on failure it stays open as it was.
	pub fn finish_delete(
		&mut self,
		id: &str,
		outcome: Result<(), ServiceError>,
	) -> Result<Option<GraphSession>, ServiceError> {
		match outcome {
			Ok(()) => {
				info!("graph {id} deleted");
				Ok(self.remove(id))
			}
			Err(e) => {
				warn!("keeping graph {id}, service refused the delete: {e}");
				Err(e)
			}
		}
	}

	pub fn active(&self) -> Option<&GraphSession> {
		let id = self.active.as_deref()?;
		self.sessions.iter().find(|s| s.id() == id)
	}

	pub fn active_mut(&mut self) -> Option<&mut GraphSession> {
		let id = self.active.clone()?;
		self.sessions.iter_mut().find(|s| s.id() == id)
	}

	pub fn get_mut(&mut self, id: &str) -> Option<&mut GraphSession> {
		self.sessions.iter_mut().find(|s| s.id() == id)
	}

	pub fn sessions(&self) -> impl Iterator<Item = &GraphSession> {
		self.sessions.iter()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::branch_graph::codec::serialize;
	use crate::components::branch_graph::model::tests::{forked, trunk};

	fn failure() -> ServiceError {
		ServiceError::Status {
			path: "/nodes/3/extend".into(),
			status: 502,
			body: "upstream".into(),
		}
	}

	/// What the service would answer to extending `anchor` on `graph`.
	fn served(graph: &Graph, anchor: NodeId) -> WireGraph {
		let mut g = graph.clone();
		g.append_head(anchor).unwrap();
		serialize(&g)
	}

	#[test]
	fn optimistic_extend_is_replaced_by_server_state() {
		let mut s = GraphSession::new(trunk(3));
		s.set_ego(Some(NodeId(3)));
		let answer = served(s.authoritative(), NodeId(3));

		let (req, outbound) = s.begin_message();
		assert_eq!(outbound, Outbound::Extend { anchor: NodeId(3) });
		assert!(s.is_pending());
		assert_eq!(s.view().node_count(), 4);
		assert_eq!(s.authoritative().node_count(), 3);
		assert_eq!(s.ego(), Some(NodeId(4)));

		assert_eq!(s.resolve(req, Ok(answer.clone())), Ok(Resolution::Adopted));
		assert!(!s.is_pending());
		assert_eq!(serialize(s.view()), answer);
		assert_eq!(s.ego(), Some(NodeId(4)));
	}

	#[test]
	fn failed_request_rolls_back() {
		let mut s = GraphSession::new(forked());
		s.set_ego(Some(NodeId(5)));
		let before = s.authoritative().clone();
		let req = s.begin_extend(NodeId(5)).unwrap();
		assert_eq!(s.view().node_count(), 7);

		assert_eq!(
			s.resolve(req, Err(failure())),
			Err(SyncError::Service(failure()))
		);
		assert_eq!(s.view(), &before);
		assert_eq!(s.ego(), Some(NodeId(5)));
	}

	#[test]
	fn malformed_answer_rolls_back() {
		let mut s = GraphSession::new(trunk(2));
		let req = s.begin();
		let mut bad = serialize(&trunk(2));
		bad.branch_order.clear();
		assert!(matches!(
			s.resolve(req, Ok(bad)),
			Err(SyncError::Codec(CodecError::UnorderedBranch(1)))
		));
		assert_eq!(s.view(), &trunk(2));
	}

	#[test]
	fn answer_for_another_graph_is_rejected() {
		let mut s = GraphSession::new(trunk(2));
		let req = s.begin();
		let mut other = serialize(&trunk(2));
		other.id = "elsewhere".into();
		assert!(matches!(
			s.resolve(req, Ok(other)),
			Err(SyncError::WrongGraph { .. })
		));
		assert!(!s.is_pending());
	}

	#[test]
	fn superseded_answers_are_ignored() {
		let mut s = GraphSession::new(trunk(3));
		let first = s.begin_extend(NodeId(3)).unwrap();
		let second = s.begin_extend(NodeId(4)).unwrap();
		assert_eq!(s.view().node_count(), 5);

		let late = serialize(&trunk(1));
		assert_eq!(s.resolve(first, Ok(late)), Ok(Resolution::Stale));
		assert_eq!(s.view().node_count(), 5);

		assert!(s.resolve(second, Err(failure())).is_err());
		// both tentative nodes go, ego returns to where it was before either request
		assert_eq!(s.view().node_count(), 3);
		assert_eq!(s.ego(), None);
	}

	#[test]
	fn empty_graph_asks_for_a_root() {
		let mut s = GraphSession::new(Graph::new("g", "Untitled 1"));
		let (req, outbound) = s.begin_message();
		assert_eq!(
			outbound,
			Outbound::CreateRoot {
				graph_id: "g".into()
			}
		);
		let root = serialize(&Graph::with_trunk("g", "Untitled 1"));
		assert_eq!(s.resolve(req, Ok(root)), Ok(Resolution::Adopted));
		assert_eq!(s.ego(), Some(NodeId(1)));
	}

	#[test]
	fn manager_tracks_active_graph() {
		let mut m = GraphManager::default();
		let first = m.new_graph().id().to_string();
		let second = m.new_graph().id().to_string();
		assert_ne!(first, second);
		assert_eq!(m.active().map(|s| s.id()), Some(second.as_str()));
		assert_eq!(m.active().unwrap().view().name, "Untitled 2");

		assert!(m.select(&first));
		assert!(!m.select("missing"));
		assert!(m.remove(&first).is_some());
		assert_eq!(m.active().map(|s| s.id()), Some(second.as_str()));
		assert!(m.remove(&second).is_some());
		assert!(m.active().is_none());
	}

	#[test]
	fn failed_delete_keeps_the_graph() {
		let mut m = GraphManager::default();
		let id = m.new_graph().id().to_string();

		let refused = ServiceError::Transport {
			path: format!("/graphs/{id}"),
			message: "offline".into(),
		};
		assert!(matches!(
			m.finish_delete(&id, Err(refused.clone())),
			Err(e) if e == refused
		));
		assert_eq!(m.sessions().count(), 1);
		assert_eq!(m.active().map(|s| s.id()), Some(id.as_str()));

		let removed = m.finish_delete(&id, Ok(())).unwrap();
		assert_eq!(removed.map(|s| s.id().to_string()), Some(id));
		assert!(m.active().is_none());
		assert_eq!(m.sessions().count(), 0);
	}
}
