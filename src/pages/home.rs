use leptos::prelude::*;
use leptos::task::spawn_local;
use log::{info, warn};

use crate::components::branch_graph::codec;
use crate::components::branch_graph::config::ApiConfig;
use crate::components::branch_graph::session::Resolution;
use crate::components::branch_graph::{
	BranchGraphCanvas, Graph, GraphControls, GraphHandle, GraphManager, GraphService, GraphSession,
	HttpGraphService, NodeId, Operation, OperationStates, WireGraph,
};

const AUTHOR: &str = "user";

/// A small local tree to look at before anything is fetched.
fn demo_session() -> Option<GraphSession> {
	let mut graph = Graph::with_trunk(uuid::Uuid::new_v4().to_string(), "Demo");
	let root = graph.trunk_head()?;
	let second = graph.append_head(root)?;
	let third = graph.append_head(root)?;
	graph.append_head(root)?;

	graph.apply(Operation::CreateSubBranch, Some(second));
	graph.append_head(NodeId(5))?;
	graph.apply(Operation::CreateSubBranch, Some(third));
	graph.apply(Operation::CreateSubBranch, Some(NodeId(6)));

	let mut wire = codec::serialize(&graph);
	for (key, label) in [("1", "main"), ("2", "retry"), ("3", "tangent")] {
		if let Some(b) = wire.branches.get_mut(key) {
			b.label = Some(label.to_string());
		}
	}
	GraphSession::from_wire(&wire).ok()
}

/// Pushes edits made on the canvas into the session they belong to.
fn commit_canvas(canvas: StoredValue<GraphHandle, LocalStorage>, manager: StoredValue<GraphManager>) {
	let Some(wire) = canvas.with_value(|h| h.serialize()) else {
		return;
	};
	manager.update_value(|m| {
		if let Some(s) = m.get_mut(&wire.id).filter(|s| !s.is_pending()) {
			if let Err(e) = s.replace(&wire) {
				warn!("could not keep canvas edits: {e}");
			}
		}
	});
}

#[derive(Clone, Debug)]
struct Tab {
	id: String,
	name: String,
	synced_nodes: usize,
}

/// Default Home Page
#[component]
pub fn Home() -> impl IntoView {
	let manager = StoredValue::new(GraphManager::default());
	if let Some(demo) = demo_session() {
		manager.update_value(|m| {
			m.open(demo);
		});
	}
	let service = HttpGraphService::new(ApiConfig::from_env());
	let canvas = StoredValue::new_local(GraphHandle::default());
	let states = RwSignal::new(OperationStates::default());

	let shown: RwSignal<Option<WireGraph>> = RwSignal::new(None);
	let tabs: RwSignal<Vec<Tab>> = RwSignal::new(Vec::new());
	let active: RwSignal<Option<String>> = RwSignal::new(None);
	let pending = RwSignal::new(false);
	let status = RwSignal::new(String::new());
	let prompt = RwSignal::new(String::new());

	let refresh = move || {
		manager.with_value(|m| {
			shown.set(m.active().map(|s| codec::serialize(s.view())));
			active.set(m.active().map(|s| s.id().to_string()));
			pending.set(m.active().is_some_and(|s| s.is_pending()));
			tabs.set(
				m.sessions()
					.map(|s| Tab {
						id: s.id().to_string(),
						name: s.view().name.clone(),
						synced_nodes: s.authoritative().node_count(),
					})
					.collect(),
			);
		});
	};
	refresh();

	let on_new = move |_| {
		commit_canvas(canvas, manager);
		manager.update_value(|m| {
			let id = m.new_graph().id().to_string();
			info!("opened new graph {id}");
		});
		refresh();
	};

	let on_reload = {
		let service = service.clone();
		move |_| {
			let Some(id) = active.get_untracked() else {
				return;
			};
			let service = service.clone();
			spawn_local(async move {
				let outcome = service.get_graph(&id).await;
				let result = manager
					.try_update_value(|m| {
						let s = m.get_mut(&id)?;
						Some(match outcome {
							Ok(wire) => s.replace(&wire).map_err(|e| e.to_string()),
							Err(e) => Err(e.to_string()),
						})
					})
					.flatten();
				match result {
					Some(Ok(())) => status.set("reloaded".into()),
					Some(Err(e)) => status.set(e),
					None => {}
				}
				refresh();
			});
		}
	};

	let on_delete = {
		let service = service.clone();
		move |_| {
			let Some(id) = active.get_untracked() else {
				return;
			};
			let service = service.clone();
			spawn_local(async move {
				let outcome = service.delete_graph(&id).await;
				let result = manager.try_update_value(|m| m.finish_delete(&id, outcome).map(|_| ()));
				match result {
					Some(Ok(())) => status.set(String::new()),
					Some(Err(e)) => status.set(e.to_string()),
					None => {}
				}
				refresh();
			});
		}
	};

	let send = {
		let service = service.clone();
		move || {
			let content = prompt.get_untracked();
			if content.trim().is_empty() {
				return;
			}
			commit_canvas(canvas, manager);
			let selected = canvas.with_value(|h| h.selected());
			let started = manager
				.try_update_value(|m| {
					let s = m.active_mut()?;
					if selected.is_some() {
						s.set_ego(selected);
					}
					let (request, outbound) = s.begin_message();
					Some((s.id().to_string(), request, outbound))
				})
				.flatten();
			let Some((graph_id, request, outbound)) = started else {
				return;
			};
			prompt.set(String::new());
			refresh();

			let service = service.clone();
			spawn_local(async move {
				let outcome = outbound.send(&service, &content, AUTHOR).await;
				let result = manager
					.try_update_value(|m| m.get_mut(&graph_id).map(|s| s.resolve(request, outcome)))
					.flatten();
				match result {
					Some(Ok(Resolution::Adopted)) => status.set(String::new()),
					Some(Ok(Resolution::Stale)) | None => {}
					Some(Err(e)) => status.set(e.to_string()),
				}
				refresh();
			});
		}
	};
	let send_on_enter = send.clone();

	let select_tab = move |id: String| {
		commit_canvas(canvas, manager);
		manager.update_value(|m| {
			m.select(&id);
		});
		refresh();
	};

	view! {
		<ErrorBoundary fallback=|errors| {
			view! {
				<h1>"Uh oh! Something went wrong!"</h1>

				<p>"Errors: "</p>
				<ul>
					{move || {
						errors
							.get()
							.into_iter()
							.map(|(_, e)| view! { <li>{e.to_string()}</li> })
							.collect_view()
					}}
				</ul>
			}
		}>

			<div class="fullscreen-graph">
				<BranchGraphCanvas
					graph=shown
					handle=canvas.get_value()
					states=states
					fullscreen=true
				/>
				<div class="graph-overlay">
					<nav class="graph-tabs">
						<For
							each=move || tabs.get()
							key=|tab| (tab.id.clone(), tab.name.clone(), tab.synced_nodes)
							children=move |tab| {
								let id = tab.id.clone();
								let is_active = move || active.get().as_deref() == Some(id.as_str());
								let id = tab.id.clone();
								view! {
									<button
										class="graph-tab"
										class:active=is_active
										title=format!("{} nodes synced", tab.synced_nodes)
										on:click=move |_| select_tab(id.clone())
									>
										{tab.name}
									</button>
								}
							}
						/>
						<button on:click=on_new>"New graph"</button>
						<button on:click=on_reload>"Reload"</button>
						<button class="danger" on:click=on_delete>"Delete graph"</button>
					</nav>
					<div class="graph-controls">
						<GraphControls handle=canvas.get_value() states=states />
					</div>
					<p class="subtitle">"Click a node to select it. Drag to pan. Scroll to zoom."</p>
					<div class="graph-prompt">
						<input
							type="text"
							placeholder="Message"
							prop:value=move || prompt.get()
							prop:disabled=move || pending.get()
							on:input=move |ev| prompt.set(event_target_value(&ev))
							on:keydown=move |ev| {
								if ev.key() == "Enter" {
									send_on_enter();
								}
							}
						/>
						<button disabled=move || pending.get() on:click=move |_| send()>
							"Send"
						</button>
					</div>
					<p class="status">{move || status.get()}</p>
				</div>
			</div>
		</ErrorBoundary>
	}
}
