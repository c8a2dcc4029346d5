//! Captures question media from the browser's network traffic
//!
//! The interceptor runs as its own task, subscribed to the page's `Network` events. Bodies are read once
//! loading finishes and written under the assets directory; the URL -> file mapping lands in an [`AssetTable`]
//! shared with the extractor. Nothing orders the interceptor against question extraction, so a lookup may
//! miss an asset that is still in flight.

use std::{
	collections::HashMap,
	path::{Path, PathBuf},
	sync::Arc,
};

use base64::Engine;
use chromiumoxide::{
	Page,
	cdp::browser_protocol::network::{EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived, GetResponseBodyParams, RequestId},
};
use color_eyre::{Result, eyre::eyre};
use futures::{StreamExt, stream::BoxStream};
use tokio::{sync::RwLock, task::JoinHandle};
use url::Url;
use v_utils::elog;

/// Only responses under this path are persisted
pub const ASSET_PATH_PREFIX: &str = "/Content/ImageQuestion/";

/// Source URL -> local file, shared between the interceptor task and the extractor
#[derive(Clone, Debug, Default)]
pub struct AssetTable {
	inner: Arc<RwLock<HashMap<String, PathBuf>>>,
}

impl AssetTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Record where `url` was saved, replacing any earlier capture of the same URL
	pub async fn insert(&self, url: impl Into<String>, path: impl Into<PathBuf>) {
		self.inner.write().await.insert(url.into(), path.into());
	}

	pub async fn get(&self, url: &str) -> Option<PathBuf> {
		self.inner.read().await.get(url).cloned()
	}

	pub async fn len(&self) -> usize {
		self.inner.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.len().await == 0
	}
}

/// How a `content-type` header maps onto a file extension
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MimeClass {
	/// One of the media types the portal is known to serve
	Known(String),
	/// Anything else; the extension is the MIME string with `/` turned into `.`
	Unknown(String),
	Missing,
}

const KNOWN_MIME_TYPES: [&str; 4] = ["video/mp4", "image/gif", "image/jpg", "image/png"];

impl MimeClass {
	pub fn classify(content_type: Option<&str>) -> Self {
		match content_type {
			None => MimeClass::Missing,
			Some(mime) if KNOWN_MIME_TYPES.contains(&mime) => {
				let subtype = mime.split_once('/').map(|(_, sub)| sub).unwrap_or(mime);
				MimeClass::Known(subtype.to_owned())
			}
			Some(mime) => MimeClass::Unknown(mime.replace('/', ".")),
		}
	}

	pub fn extension(&self) -> &str {
		match self {
			MimeClass::Known(ext) | MimeClass::Unknown(ext) => ext,
			MimeClass::Missing => "",
		}
	}
}

/// File name for an asset path: the part after [`ASSET_PATH_PREFIX`], `/` flattened to `-`, plus the extension.
/// `None` when the path is not an asset path.
pub fn asset_file_name(url_path: &str, extension: &str) -> Option<String> {
	let suffix = url_path.strip_prefix(ASSET_PATH_PREFIX)?;
	Some(format!("{}.{}", suffix.replace('/', "-"), extension))
}

/// Case-insensitive header lookup on a CDP headers object
pub fn header_value(headers: &serde_json::Value, name: &str) -> Option<String> {
	headers
		.as_object()?
		.iter()
		.find(|(key, _)| key.eq_ignore_ascii_case(name))
		.and_then(|(_, value)| value.as_str())
		.map(str::to_owned)
}

/// An asset response whose body is not loaded yet
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PendingAsset {
	pub request_id: String,
	pub url: String,
	/// Path component of `url`
	pub path: String,
	pub content_type: Option<String>,
}

/// The slice of a CDP `Network` event the tracker cares about
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NetworkEvent {
	Request { request_id: String, method: String },
	Response { request_id: String, url: String, content_type: Option<String> },
	Finished { request_id: String },
	Failed { request_id: String },
}

impl NetworkEvent {
	pub fn request_id(&self) -> &str {
		match self {
			NetworkEvent::Request { request_id, .. } | NetworkEvent::Response { request_id, .. } | NetworkEvent::Finished { request_id } | NetworkEvent::Failed { request_id } => request_id,
		}
	}
}

/// Decide whether a response is worth persisting: a GET under [`ASSET_PATH_PREFIX`]
pub fn asset_response(request_id: &str, method: &str, url: &str, content_type: Option<String>) -> Option<PendingAsset> {
	if !method.eq_ignore_ascii_case("get") {
		return None;
	}
	let parsed = match Url::parse(url) {
		Ok(parsed) => parsed,
		Err(_) => {
			tracing::debug!("ignoring response with unparsable url {url}");
			return None;
		}
	};
	if !parsed.path().starts_with(ASSET_PATH_PREFIX) {
		return None;
	}
	Some(PendingAsset {
		request_id: request_id.to_owned(),
		url: url.to_owned(),
		path: parsed.path().to_owned(),
		content_type,
	})
}

#[derive(Debug, Default)]
struct RequestProgress {
	method: Option<String>,
	/// url and content-type
	response: Option<(String, Option<String>)>,
	finished: bool,
	failed: bool,
}

/// Correlates CDP request/response/loading events by request id.
///
/// The events reach us through separate listener streams, so they can arrive in any order. Each request id
/// accumulates what it has seen until the method, the response and the end of loading are all known.
#[derive(Debug, Default)]
pub struct ResponseTracker {
	requests: HashMap<String, RequestProgress>,
}

impl ResponseTracker {
	/// Feed one event; returns the asset once its request qualified and its body finished loading
	pub fn observe(&mut self, event: NetworkEvent) -> Option<PendingAsset> {
		let request_id = event.request_id().to_owned();
		let progress = self.requests.entry(request_id.clone()).or_default();
		match event {
			NetworkEvent::Request { method, .. } => progress.method = Some(method),
			NetworkEvent::Response { url, content_type, .. } => progress.response = Some((url, content_type)),
			NetworkEvent::Finished { .. } => progress.finished = true,
			NetworkEvent::Failed { .. } => progress.failed = true,
		}
		self.settle(&request_id)
	}

	fn settle(&mut self, request_id: &str) -> Option<PendingAsset> {
		let progress = self.requests.get(request_id)?;
		let verdict = match (&progress.method, &progress.response) {
			(Some(method), Some((url, content_type))) => Some(asset_response(request_id, method, url, content_type.clone())),
			_ => None,
		};
		let (finished, failed, requested) = (progress.finished, progress.failed, progress.method.is_some());

		if failed {
			if let Some(Some(asset)) = &verdict {
				tracing::warn!("loading failed for asset {}", asset.url);
			}
			// a failed load may never see its response; the request alone is enough to retire it
			if requested {
				self.requests.remove(request_id);
			}
			return None;
		}

		match verdict {
			Some(Some(asset)) if finished => {
				self.requests.remove(request_id);
				Some(asset)
			}
			Some(None) if finished => {
				self.requests.remove(request_id);
				None
			}
			_ => None,
		}
	}

	/// Request ids that have not reached a verdict yet
	pub fn tracked_len(&self) -> usize {
		self.requests.len()
	}
}

/// Subscribe to the page's network events and persist every asset response until the page goes away
pub async fn spawn_interceptor(page: Page, table: AssetTable, assets_dir: PathBuf) -> Result<JoinHandle<()>> {
	let requests: BoxStream<'static, NetworkEvent> = page
		.event_listener::<EventRequestWillBeSent>()
		.await
		.map_err(|e| eyre!("Failed to subscribe to requests: {}", e))?
		.map(|ev| NetworkEvent::Request {
			request_id: ev.request_id.inner().clone(),
			method: ev.request.method.clone(),
		})
		.boxed();
	let responses = page
		.event_listener::<EventResponseReceived>()
		.await
		.map_err(|e| eyre!("Failed to subscribe to responses: {}", e))?
		.map(|ev| NetworkEvent::Response {
			request_id: ev.request_id.inner().clone(),
			url: ev.response.url.clone(),
			content_type: header_value(ev.response.headers.inner(), "content-type"),
		})
		.boxed();
	let finished = page
		.event_listener::<EventLoadingFinished>()
		.await
		.map_err(|e| eyre!("Failed to subscribe to loading events: {}", e))?
		.map(|ev| NetworkEvent::Finished { request_id: ev.request_id.inner().clone() })
		.boxed();
	let failed = page
		.event_listener::<EventLoadingFailed>()
		.await
		.map_err(|e| eyre!("Failed to subscribe to loading failures: {}", e))?
		.map(|ev| NetworkEvent::Failed { request_id: ev.request_id.inner().clone() })
		.boxed();

	// select_all polls its streams in turn, so cross-stream order is lost here; the tracker copes with that
	let mut events = futures::stream::select_all([requests, responses, finished, failed]);

	Ok(tokio::spawn(async move {
		let mut tracker = ResponseTracker::default();
		while let Some(event) = events.next().await {
			if let Some(asset) = tracker.observe(event) {
				save_asset(&page, &table, &assets_dir, asset).await;
			}
		}
		tracing::debug!("network event stream closed ({} requests unsettled)", tracker.tracked_len());
	}))
}

/// Fetch the body of a finished asset response and write it to disk. Every failure here is logged and the asset dropped.
async fn save_asset(page: &Page, table: &AssetTable, assets_dir: &Path, asset: PendingAsset) {
	tracing::debug!("downloading asset {}", asset.path);

	let mime = MimeClass::classify(asset.content_type.as_deref());
	match &mime {
		MimeClass::Missing => {
			elog!("missing content-type for {}", asset.url);
		}
		MimeClass::Unknown(_) => {
			elog!("unknown content-type: {}", asset.content_type.as_deref().unwrap_or_default());
		}
		MimeClass::Known(_) => {}
	}

	let body = match page.execute(GetResponseBodyParams::new(RequestId::new(asset.request_id.clone()))).await {
		Ok(body) => body,
		Err(e) => {
			elog!("couldn't get body of {}:\n    {}", asset.url, e);
			return;
		}
	};
	let bytes = match decode_body(&body.result.body, body.result.base64_encoded) {
		Ok(bytes) => bytes,
		Err(e) => {
			elog!("couldn't decode body of {}: {}", asset.url, e);
			return;
		}
	};

	if let Err(e) = store_asset(assets_dir, table, &asset, &mime, &bytes).await {
		elog!("{e}");
	}
}

/// Write an asset body under `assets_dir` and record it in `table`; returns where it landed
pub async fn store_asset(assets_dir: &Path, table: &AssetTable, asset: &PendingAsset, mime: &MimeClass, bytes: &[u8]) -> Result<PathBuf> {
	let file_name = asset_file_name(&asset.path, mime.extension()).ok_or_else(|| eyre!("{} is not under {}", asset.path, ASSET_PATH_PREFIX))?;
	tokio::fs::create_dir_all(assets_dir)
		.await
		.map_err(|e| eyre!("Failed to create {}: {}", assets_dir.display(), e))?;
	let dest = assets_dir.join(file_name);
	tokio::fs::write(&dest, bytes).await.map_err(|e| eyre!("Failed to write {}: {}", dest.display(), e))?;
	tracing::debug!("saved {} ({} bytes) to {}", asset.url, bytes.len(), dest.display());
	table.insert(asset.url.clone(), dest.clone()).await;
	Ok(dest)
}

/// CDP hands binary bodies over base64-encoded and text bodies verbatim
pub fn decode_body(body: &str, base64_encoded: bool) -> Result<Vec<u8>> {
	if base64_encoded {
		base64::engine::general_purpose::STANDARD
			.decode(body)
			.map_err(|e| eyre!("Failed to decode base64: {}", e))
	} else {
		Ok(body.as_bytes().to_vec())
	}
}
