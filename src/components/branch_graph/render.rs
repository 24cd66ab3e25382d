use std::f64::consts::PI;

use web_sys::CanvasRenderingContext2d;

use super::config::{BRANCH_WIDTH, GRID_SPACING, NODE_RADIUS, NODE_SELECTED_RADIUS};
use super::model::Node;
use super::state::BranchGraphState;

const BACKGROUND: &str = "#1e1e1e";
const SELECTED_FILL: &str = "#ffffff";
const SELECTED_RING: &str = "#0ea5e9";
const FOLD_GLOW: &str = "#06b6d4";

pub fn render(state: &BranchGraphState, ctx: &CanvasRenderingContext2d) {
	let cam = &state.graph.camera;
	ctx.set_fill_style_str(BACKGROUND);
	ctx.fill_rect(0.0, 0.0, state.width, state.height);
	ctx.save();
	let _ = ctx.translate(cam.x, cam.y);
	let _ = ctx.scale(cam.scale, cam.scale);
	draw_grid(state, ctx);
	draw_branches(state, ctx);
	draw_nodes(state, ctx);
	ctx.restore();
}

fn draw_grid(state: &BranchGraphState, ctx: &CanvasRenderingContext2d) {
	let cam = &state.graph.camera;
	let (left, top) = state.screen_to_world(0.0, 0.0);
	let (right, bottom) = state.screen_to_world(state.width, state.height);

	ctx.set_stroke_style_str("rgba(255, 255, 255, 0.1)");
	ctx.set_line_width(1.0 / cam.scale);
	let mut x = (left / GRID_SPACING).floor() * GRID_SPACING;
	while x <= right {
		ctx.begin_path();
		ctx.move_to(x, top);
		ctx.line_to(x, bottom);
		ctx.stroke();
		x += GRID_SPACING;
	}
	let mut y = (top / GRID_SPACING).floor() * GRID_SPACING;
	while y <= bottom {
		ctx.begin_path();
		ctx.move_to(left, y);
		ctx.line_to(right, y);
		ctx.stroke();
		y += GRID_SPACING;
	}
}

fn draw_branches(state: &BranchGraphState, ctx: &CanvasRenderingContext2d) {
	let graph = &state.graph;
	ctx.set_line_width(BRANCH_WIDTH);
	ctx.set_line_cap("butt");
	ctx.set_line_join("round");

	for branch in graph.branches().filter(|b| !b.is_hidden) {
		let visible: Vec<&Node> = branch
			.nodes
			.iter()
			.filter_map(|id| graph.node(*id))
			.filter(|n| !n.is_hidden)
			.collect();
		let Some(first) = visible.first() else {
			continue;
		};
		ctx.set_stroke_style_str(&branch.color);
		ctx.begin_path();
		match branch.parent_node.and_then(|p| graph.node(p)) {
			Some(parent) => {
				ctx.move_to(parent.x, parent.y);
				ctx.line_to(first.x, first.y);
			}
			None => ctx.move_to(first.x, first.y),
		}
		for n in &visible[1..] {
			ctx.line_to(n.x, n.y);
		}
		ctx.stroke();

		if let Some(label) = &branch.label {
			ctx.set_fill_style_str("rgba(255, 255, 255, 0.8)");
			ctx.set_font(&format!("{}px sans-serif", 10.0 / graph.camera.scale.max(0.5)));
			let _ = ctx.fill_text(label, first.x + NODE_RADIUS + 3.0, first.y + 3.0);
		}
	}
}

fn draw_nodes(state: &BranchGraphState, ctx: &CanvasRenderingContext2d) {
	let graph = &state.graph;
	for node in graph.nodes().filter(|n| !n.is_hidden) {
		let selected = state.is_selected(node.id);
		let color = graph.branch(node.branch).map_or("#6b7280", |b| b.color.as_str());

		// glow marks a node with folded children or a collapsed extension
		if graph.has_hidden_children(node.id) || graph.has_hidden_extension(node.id) {
			ctx.set_shadow_color(FOLD_GLOW);
			ctx.set_shadow_blur(15.0);
		}
		let radius = if selected { NODE_SELECTED_RADIUS } else { NODE_RADIUS };
		ctx.begin_path();
		let _ = ctx.arc(node.x, node.y, radius, 0.0, 2.0 * PI);
		ctx.set_fill_style_str(if selected { SELECTED_FILL } else { color });
		ctx.fill();
		if selected {
			ctx.set_stroke_style_str(SELECTED_RING);
			ctx.set_line_width(3.0);
			ctx.stroke();
		}
		ctx.set_shadow_color("transparent");
		ctx.set_shadow_blur(0.0);

		if !selected {
			ctx.begin_path();
			let _ = ctx.arc(node.x, node.y, NODE_RADIUS * 0.4, 0.0, 2.0 * PI);
			ctx.set_fill_style_str(BACKGROUND);
			ctx.fill();
		}
	}
}
