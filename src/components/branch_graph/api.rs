//! Client for the graph service.
//!
//! Every call answers with a full [`WireGraph`] snapshot that replaces local
//! state. Uses `fetch` through web-sys, so it only does real work in the browser.

use std::future::Future;

use serde::Serialize;
use thiserror::Error;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, RequestInit, RequestMode, Response};

use super::config::ApiConfig;
use super::model::NodeId;
use super::types::WireGraph;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
	#[error("request to {path} failed: {message}")]
	Transport { path: String, message: String },
	#[error("{path} answered {status}: {body}")]
	Status {
		path: String,
		status: u16,
		body: String,
	},
	#[error("could not decode response from {path}: {message}")]
	Decode { path: String, message: String },
}

/// The remote store the editor syncs with.
pub trait GraphService {
	/// Fetches a graph, creating it server-side if it does not exist yet.
	fn get_graph(&self, graph_id: &str) -> impl Future<Output = Result<WireGraph, ServiceError>>;

	/// Seeds the trunk of an empty graph with its first turn.
	fn create_root(
		&self,
		graph_id: &str,
		content: &str,
		author: &str,
	) -> impl Future<Output = Result<WireGraph, ServiceError>>;

	/// Appends a new head to the branch holding `node`.
	fn extend_node(
		&self,
		node: NodeId,
		content: &str,
		author: &str,
	) -> impl Future<Output = Result<WireGraph, ServiceError>>;

	fn delete_graph(&self, graph_id: &str) -> impl Future<Output = Result<(), ServiceError>>;
}

#[derive(Serialize)]
struct Turn<'a> {
	content: &'a str,
	author: &'a str,
}

#[derive(Clone, Debug)]
pub struct HttpGraphService {
	config: ApiConfig,
}

impl HttpGraphService {
	pub fn new(config: ApiConfig) -> Self {
		Self { config }
	}

	async fn request(&self, method: &str, path: &str, body: Option<String>) -> Result<String, ServiceError> {
		let transport = |e: JsValue| ServiceError::Transport {
			path: path.to_string(),
			message: format!("{e:?}"),
		};
		let url = format!("{}{}", self.config.base_url, path);

		let opts = RequestInit::new();
		opts.set_method(method);
		opts.set_mode(RequestMode::Cors);
		if let Some(body) = &body {
			opts.set_body(&JsValue::from_str(body));
		}
		let request = Request::new_with_str_and_init(&url, &opts).map_err(transport)?;
		request
			.headers()
			.set("Content-Type", "application/json")
			.map_err(transport)?;

		let window = web_sys::window().ok_or_else(|| ServiceError::Transport {
			path: path.to_string(),
			message: "no window".into(),
		})?;
		let resp: Response = JsFuture::from(window.fetch_with_request(&request))
			.await
			.map_err(transport)?
			.dyn_into()
			.map_err(transport)?;
		let text = JsFuture::from(resp.text().map_err(transport)?)
			.await
			.map_err(transport)?
			.as_string()
			.unwrap_or_default();

		if !resp.ok() {
			return Err(ServiceError::Status {
				path: path.to_string(),
				status: resp.status(),
				body: text,
			});
		}
		Ok(text)
	}

	async fn fetch_graph(&self, method: &str, path: &str, body: Option<String>) -> Result<WireGraph, ServiceError> {
		let text = self.request(method, path, body).await?;
		serde_json::from_str(&text).map_err(|e| ServiceError::Decode {
			path: path.to_string(),
			message: e.to_string(),
		})
	}

	fn turn(content: &str, author: &str) -> Option<String> {
		serde_json::to_string(&Turn { content, author }).ok()
	}
}

impl GraphService for HttpGraphService {
	async fn get_graph(&self, graph_id: &str) -> Result<WireGraph, ServiceError> {
		self.fetch_graph("GET", &format!("/graphs/{graph_id}"), None).await
	}

	async fn create_root(&self, graph_id: &str, content: &str, author: &str) -> Result<WireGraph, ServiceError> {
		let path = format!("/graphs/{graph_id}/root");
		self.fetch_graph("POST", &path, Self::turn(content, author)).await
	}

	async fn extend_node(&self, node: NodeId, content: &str, author: &str) -> Result<WireGraph, ServiceError> {
		let path = format!("/nodes/{node}/extend");
		self.fetch_graph("POST", &path, Self::turn(content, author)).await
	}

	async fn delete_graph(&self, graph_id: &str) -> Result<(), ServiceError> {
		self.request("DELETE", &format!("/graphs/{graph_id}"), None)
			.await
			.map(|_| ())
	}
}
