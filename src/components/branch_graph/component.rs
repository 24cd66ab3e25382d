use std::cell::{Cell, RefCell};
use std::rc::Rc;

use leptos::prelude::*;
use log::{info, warn};
use wasm_bindgen::prelude::*;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, MouseEvent, WheelEvent, Window};

use super::codec::{self, CodecError};
use super::model::{Applied, NodeId, Operation};
use super::render;
use super::state::{BranchGraphState, OperationStates};
use super::types::WireGraph;

/// Shared access to the live canvas state, for controls that sit outside the canvas.
#[derive(Clone, Default)]
pub struct GraphHandle(Rc<RefCell<Option<BranchGraphState>>>);

impl GraphHandle {
	/// Runs `op` on the current selection and returns the refreshed button states.
	pub fn invoke(&self, op: Operation) -> Option<OperationStates> {
		let mut slot = self.0.borrow_mut();
		let s = slot.as_mut()?;
		if s.invoke(op) == Applied::NoOp {
			return None;
		}
		Some(s.operation_states())
	}

	/// Current canvas graph in wire form, including local edits.
	pub fn serialize(&self) -> Option<WireGraph> {
		self.0.borrow().as_ref().map(|s| codec::serialize(&s.graph))
	}

	pub fn selected(&self) -> Option<NodeId> {
		self.0.borrow().as_ref().and_then(|s| s.selected)
	}

	fn load(&self, wire: &WireGraph, size: (f64, f64)) -> Result<OperationStates, CodecError> {
		let graph = codec::deserialize(wire)?;
		let mut slot = self.0.borrow_mut();
		match slot.as_mut() {
			Some(s) => s.load(graph),
			None => *slot = Some(BranchGraphState::new(graph, size.0, size.1)),
		}
		Ok(slot.as_ref().map(|s| s.operation_states()).unwrap_or_default())
	}

	fn clear(&self) {
		*self.0.borrow_mut() = None;
	}
}

fn canvas_point(canvas_ref: NodeRef<leptos::html::Canvas>, ev: &MouseEvent) -> Option<(f64, f64)> {
	let canvas: HtmlCanvasElement = canvas_ref.get()?.into();
	let rect = canvas.get_bounding_client_rect();
	Some((
		ev.client_x() as f64 - rect.left(),
		ev.client_y() as f64 - rect.top(),
	))
}

#[component]
pub fn BranchGraphCanvas(
	#[prop(into)] graph: Signal<Option<WireGraph>>,
	handle: GraphHandle,
	states: RwSignal<OperationStates>,
	#[prop(default = false)] fullscreen: bool,
	#[prop(default = None)] width: Option<f64>,
	#[prop(default = None)] height: Option<f64>,
) -> impl IntoView {
	let canvas_ref = NodeRef::<leptos::html::Canvas>::new();
	let size = Rc::new(Cell::new((width.unwrap_or(800.0), height.unwrap_or(600.0))));
	let animate: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));
	let resize_cb: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));

	let (handle_load, size_load) = (handle.clone(), size.clone());
	Effect::new(move |_| match graph.get() {
		Some(wire) => match handle_load.load(&wire, size_load.get()) {
			Ok(s) => {
				info!("loaded graph {} ({} nodes)", wire.id, wire.nodes.len());
				states.set(s);
			}
			Err(e) => warn!("refusing to load graph {}: {e}", wire.id),
		},
		None => {
			handle_load.clear();
			states.set(OperationStates::default());
		}
	});

	let (state_init, size_init) = (handle.0.clone(), size.clone());
	let (animate_init, resize_cb_init) = (animate.clone(), resize_cb.clone());
	Effect::new(move |_| {
		let Some(canvas) = canvas_ref.get() else {
			return;
		};
		let canvas: HtmlCanvasElement = canvas.into();
		let Some(window) = web_sys::window() else {
			return;
		};

		let inner = |w: &Window| {
			(
				w.inner_width().ok().and_then(|v| v.as_f64()).unwrap_or(800.0),
				w.inner_height().ok().and_then(|v| v.as_f64()).unwrap_or(600.0),
			)
		};
		let (w, h) = if fullscreen {
			inner(&window)
		} else {
			(
				width.unwrap_or_else(|| {
					canvas
						.parent_element()
						.map(|p| p.client_width() as f64)
						.unwrap_or(800.0)
				}),
				height.unwrap_or_else(|| {
					canvas
						.parent_element()
						.map(|p| p.client_height() as f64)
						.unwrap_or(600.0)
				}),
			)
		};
		canvas.set_width(w as u32);
		canvas.set_height(h as u32);
		size_init.set((w, h));
		if let Some(ref mut s) = *state_init.borrow_mut() {
			s.resize(w, h);
		}

		let Some(ctx) = canvas
			.get_context("2d")
			.ok()
			.flatten()
			.and_then(|c| c.dyn_into::<CanvasRenderingContext2d>().ok())
		else {
			warn!("canvas has no 2d context");
			return;
		};

		if fullscreen {
			let (state_resize, canvas_resize, size_resize) =
				(state_init.clone(), canvas.clone(), size_init.clone());
			*resize_cb_init.borrow_mut() = Some(Closure::new(move || {
				let Some(win) = web_sys::window() else {
					return;
				};
				let (nw, nh) = inner(&win);
				canvas_resize.set_width(nw as u32);
				canvas_resize.set_height(nh as u32);
				size_resize.set((nw, nh));
				if let Some(ref mut s) = *state_resize.borrow_mut() {
					s.resize(nw, nh);
				}
			}));
			if let Some(ref cb) = *resize_cb_init.borrow() {
				let _ =
					window.add_event_listener_with_callback("resize", cb.as_ref().unchecked_ref());
			}
		}

		let (state_anim, animate_inner) = (state_init.clone(), animate_init.clone());
		*animate_init.borrow_mut() = Some(Closure::new(move || {
			if let Some(ref s) = *state_anim.borrow() {
				render::render(s, &ctx);
			}
			if let (Some(cb), Some(win)) = (animate_inner.borrow().as_ref(), web_sys::window()) {
				let _ = win.request_animation_frame(cb.as_ref().unchecked_ref());
			}
		}));
		if let Some(ref cb) = *animate_init.borrow() {
			let _ = window.request_animation_frame(cb.as_ref().unchecked_ref());
		}
	});

	let state_md = handle.0.clone();
	let on_mousedown = move |ev: MouseEvent| {
		let Some((x, y)) = canvas_point(canvas_ref, &ev) else {
			return;
		};
		if let Some(ref mut s) = *state_md.borrow_mut() {
			s.pointer_down(x, y);
		}
	};

	let state_mm = handle.0.clone();
	let on_mousemove = move |ev: MouseEvent| {
		let Some((x, y)) = canvas_point(canvas_ref, &ev) else {
			return;
		};
		if let Some(ref mut s) = *state_mm.borrow_mut() {
			s.pointer_move(x, y);
		}
	};

	let state_mu = handle.0.clone();
	let on_mouseup = move |ev: MouseEvent| {
		let Some((x, y)) = canvas_point(canvas_ref, &ev) else {
			return;
		};
		if let Some(ref mut s) = *state_mu.borrow_mut() {
			if s.pointer_up(x, y) {
				states.set(s.operation_states());
			}
		}
	};

	let state_ml = handle.0.clone();
	let on_mouseleave = move |_: MouseEvent| {
		if let Some(ref mut s) = *state_ml.borrow_mut() {
			s.pointer_leave();
		}
	};

	let state_wh = handle.0.clone();
	let on_wheel = move |ev: WheelEvent| {
		ev.prevent_default();
		let Some((x, y)) = canvas_point(canvas_ref, &ev) else {
			return;
		};
		if let Some(ref mut s) = *state_wh.borrow_mut() {
			s.zoom(x, y, ev.delta_y());
		}
	};

	view! {
		<canvas
			node_ref=canvas_ref
			class="branch-graph-canvas"
			on:mousedown=on_mousedown
			on:mousemove=on_mousemove
			on:mouseup=on_mouseup
			on:mouseleave=on_mouseleave
			on:wheel=on_wheel
			style="display: block; cursor: grab;"
		/>
	}
}

/// One button per structural operation, enabled from `states`.
#[component]
pub fn GraphControls(handle: GraphHandle, states: RwSignal<OperationStates>) -> impl IntoView {
	Operation::ALL
		.into_iter()
		.map(|op| {
			let handle = handle.clone();
			let on_click = move |_| {
				if let Some(s) = handle.invoke(op) {
					states.set(s);
				}
			};
			view! {
				<button
					class=if op.is_destructive() { "graph-control danger" } else { "graph-control" }
					title=op.name()
					disabled=move || !states.get().enabled(op)
					on:click=on_click
				>
					{op.label()}
				</button>
			}
		})
		.collect_view()
}
