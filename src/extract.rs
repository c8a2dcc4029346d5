//! Question rendering and extraction
//!
//! The page only reports plain DOM facts ([`RawQuestionView`]) for a serializable [`ExtractionRequest`];
//! answer ordering, prefixing and media fallback all happen here on the host side.

use std::{
	cmp::Reverse,
	path::{Path, PathBuf},
};

use chromiumoxide::{
	Page,
	cdp::browser_protocol::page::{CaptureScreenshotFormat, EventFrameNavigated},
	element::Element,
};
use color_eyre::eyre::eyre;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{Question, QuestionMeta, assets::AssetTable, runner::progress};

pub const RENDER_QUESTION_PATH: &str = "/Test/RenderQuestion";
pub const FRAME_SELECTOR: &str = "div.image-frame";
/// Labels for the first three answers after the correct one has been moved to the front
pub const ANSWER_PREFIXES: [&str; 3] = ["A: ", "B: ", "C: "];

/// Fixed frame geometry so screenshots come out the same size
const NORMALIZE_FRAME_JS: &str = r#"
	function() {
		this.style.width = "644px";
		this.style.height = "327px";
		this.style.textAlign = "center";
		this.style.verticalAlign = "middle";
		this.style.display = "table";
	}
"#;

/// Per-question failure. Whether it aborts the run is the caller's call.
#[derive(Debug, Error)]
pub enum ExtractError {
	#[error("question {id}: failed to render: {reason}")]
	Navigation { id: i64, reason: String },
	#[error("question {code}: media frame `div.image-frame` not found")]
	MissingFrame { code: String },
	#[error("question {code}: page evaluation failed: {reason}")]
	Evaluation { code: String, reason: String },
	#[error("question {code}: no non-empty question text")]
	MissingQuestionText { code: String },
	#[error("question {code}: no answer options")]
	MissingAnswers { code: String },
	#[error("question {code}: screenshot to {} failed: {reason}", .path.display())]
	Screenshot { code: String, path: PathBuf, reason: String },
}

/// Selectors sent into the page
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ExtractionRequest {
	pub answer_selector: String,
	/// Queried inside each answer element
	pub answer_text_selector: String,
	pub answer_id_attribute: String,
	pub question_text_selector: String,
	pub frame_children_selector: String,
	pub video_source_selector: String,
}

impl Default for ExtractionRequest {
	fn default() -> Self {
		Self {
			answer_selector: ".answer-container > .answer".into(),
			answer_text_selector: "p".into(),
			answer_id_attribute: "data-answerid".into(),
			question_text_selector: ".question-text".into(),
			frame_children_selector: format!("{FRAME_SELECTOR} > *"),
			video_source_selector: format!("{FRAME_SELECTOR} > video > source"),
		}
	}
}

impl ExtractionRequest {
	pub fn script(&self) -> serde_json::Result<String> {
		let request = serde_json::to_string(self)?;
		Ok(format!(
			r#"
			(function(req) {{
				const answers = Array.from(document.querySelectorAll(req.answer_selector), e => {{
					const textEl = e.querySelector(req.answer_text_selector);
					return {{
						answer_id: e.getAttribute(req.answer_id_attribute),
						text: textEl ? textEl.textContent : null,
					}};
				}});
				const question_texts = Array.from(document.querySelectorAll(req.question_text_selector), e => e.textContent || '');
				const frame_children = Array.from(document.querySelectorAll(req.frame_children_selector), e => ({{
					tag: e.tagName.toLowerCase(),
					src: e.getAttribute('src'),
				}}));
				const source = document.querySelector(req.video_source_selector);
				return JSON.stringify({{
					answers: answers,
					question_texts: question_texts,
					frame_children: frame_children,
					video_source_src: source ? source.getAttribute('src') : null,
				}});
			}})({request})
			"#
		))
	}
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct RawAnswer {
	pub answer_id: Option<String>,
	pub text: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct RawFrameChild {
	pub tag: String,
	pub src: Option<String>,
}

/// What the page reports back for one rendered question
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct RawQuestionView {
	pub answers: Vec<RawAnswer>,
	pub question_texts: Vec<String>,
	pub frame_children: Vec<RawFrameChild>,
	pub video_source_src: Option<String>,
}

/// Answer texts with the correct one moved first (stable otherwise), the first three labelled
pub fn order_answers(answers: &[RawAnswer], correct_answer_id: Option<i64>) -> Vec<String> {
	let correct = correct_answer_id.map(|id| id.to_string());
	let mut ordered: Vec<&RawAnswer> = answers.iter().collect();
	ordered.sort_by_key(|a| Reverse(correct.is_some() && a.answer_id == correct));

	ordered
		.into_iter()
		.enumerate()
		.map(|(i, a)| {
			let text = a.text.as_deref().unwrap_or_default().trim();
			format!("{}{}", ANSWER_PREFIXES.get(i).copied().unwrap_or_default(), text)
		})
		.collect()
}

/// First question text that is non-empty once trimmed
pub fn pick_question_text(texts: &[String]) -> Option<String> {
	texts.iter().map(|t| t.trim()).find(|t| !t.is_empty()).map(str::to_owned)
}

/// What the frame contents say about a question's media
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MediaSource {
	/// Exactly one element in the frame; its `src`, if it has one
	Single(Option<String>),
	/// Nothing or several things in the frame; only a screenshot captures it
	Composite,
}

impl MediaSource {
	pub fn from_view(view: &RawQuestionView) -> Self {
		match view.frame_children.as_slice() {
			[child] => {
				let src = child.src.clone().or_else(|| if child.tag == "video" { view.video_source_src.clone() } else { None });
				MediaSource::Single(src)
			}
			_ => MediaSource::Composite,
		}
	}
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Media {
	/// Captured by the interceptor
	Asset(PathBuf),
	/// Referenced but never captured; the absolute URL
	Remote(String),
	Screenshot(PathBuf),
	None,
}

impl Media {
	pub async fn resolve(source: &MediaSource, base: &Url, table: &AssetTable, screenshot_path: &Path) -> Self {
		match source {
			MediaSource::Composite => Media::Screenshot(screenshot_path.to_path_buf()),
			MediaSource::Single(None) => Media::None,
			MediaSource::Single(Some(src)) => {
				let absolute = match base.join(src) {
					Ok(url) => url.to_string(),
					Err(e) => {
						tracing::warn!("couldn't resolve media src {src:?}: {e}");
						src.clone()
					}
				};
				match table.get(&absolute).await {
					Some(path) => Media::Asset(path),
					None => Media::Remote(absolute),
				}
			}
		}
	}

	pub fn to_field(&self) -> Option<String> {
		match self {
			Media::Asset(path) | Media::Screenshot(path) => Some(path.display().to_string()),
			Media::Remote(url) => Some(url.clone()),
			Media::None => None,
		}
	}
}

/// Combine fetched metadata, page facts and resolved media into the output record
pub fn assemble_question(meta: &QuestionMeta, view: &RawQuestionView, media: &Media) -> Result<Question, ExtractError> {
	let mut answers = order_answers(&view.answers, meta.correct_answer_id()).into_iter();
	let name = pick_question_text(&view.question_texts).ok_or_else(|| ExtractError::MissingQuestionText { code: meta.code.clone() })?;
	let answer = answers.next().ok_or_else(|| ExtractError::MissingAnswers { code: meta.code.clone() })?;

	Ok(Question {
		id: meta.question_id,
		code: meta.code.clone(),
		name,
		answer,
		first_wrong: answers.next(),
		second_wrong: answers.next(),
		media: media.to_field(),
	})
}

pub fn screenshot_path(screenshots_dir: &Path, code: &str) -> PathBuf {
	screenshots_dir.join(format!("{code}.png"))
}

/// Drives the shared page through one question at a time
#[derive(Clone)]
pub struct QuestionRenderer {
	page: Page,
	base: Url,
	render_url: Url,
	table: AssetTable,
	screenshots_dir: PathBuf,
	request: ExtractionRequest,
}

impl QuestionRenderer {
	pub fn new(page: Page, base: Url, table: AssetTable, screenshots_dir: PathBuf) -> color_eyre::Result<Self> {
		let render_url = base.join(RENDER_QUESTION_PATH)?;
		Ok(Self {
			page,
			base,
			render_url,
			table,
			screenshots_dir,
			request: ExtractionRequest::default(),
		})
	}

	pub async fn render(&self, meta: &QuestionMeta) -> Result<Question, ExtractError> {
		self.navigate(meta.question_id).await?;

		let frame = self.page.find_element(FRAME_SELECTOR).await.map_err(|_| ExtractError::MissingFrame { code: meta.code.clone() })?;
		frame.call_js_fn(NORMALIZE_FRAME_JS, false).await.map_err(|e| ExtractError::Evaluation {
			code: meta.code.clone(),
			reason: format!("frame styling: {e}"),
		})?;

		let view = self.read_view(&meta.code).await?;
		let shot_path = screenshot_path(&self.screenshots_dir, &meta.code);
		let media = Media::resolve(&MediaSource::from_view(&view), &self.base, &self.table, &shot_path).await;
		let question = assemble_question(meta, &view, &media)?;

		if let Media::Screenshot(path) = &media {
			capture_screenshot(&frame, path).await.map_err(|reason| ExtractError::Screenshot {
				code: meta.code.clone(),
				path: path.clone(),
				reason,
			})?;
		}

		Ok(question)
	}

	/// Replace the document with a form POSTing the question id to the render endpoint, submit it and wait
	/// for the result page. There is no timeout on the wait.
	async fn navigate(&self, question_id: i64) -> Result<(), ExtractError> {
		let nav_err = |reason: String| ExtractError::Navigation { id: question_id, reason };

		let form = format!(
			r#"<form action="{}" method="POST"><input type="hidden" name="id" value="{}"><button id="submit" type="submit"></button></form>"#,
			self.render_url, question_id
		);
		let html = serde_json::to_string(&form).map_err(|e| nav_err(e.to_string()))?;
		self.page
			.evaluate(format!("document.documentElement.innerHTML = {html}"))
			.await
			.map_err(|e| nav_err(format!("failed to inject form: {e}")))?;

		// subscribe before submitting, or a fast response could land before anyone listens
		let mut navigations = self
			.page
			.event_listener::<EventFrameNavigated>()
			.await
			.map_err(|e| nav_err(format!("failed to watch navigation: {e}")))?
			.map(|ev| FrameNavigation {
				url: ev.frame.url.clone(),
				main_frame: ev.frame.parent_id.is_none(),
			})
			.boxed();

		let button = self.page.find_element("button#submit").await.map_err(|e| nav_err(format!("submit button missing: {e}")))?;
		// an empty button may have no clickable box, so click it from script
		button
			.call_js_fn("function() { this.click(); }", false)
			.await
			.map_err(|e| nav_err(format!("failed to submit: {e}")))?;

		let landed = next_main_frame_navigation(&mut navigations)
			.await
			.ok_or_else(|| nav_err("page closed before the form was submitted".into()))?;
		tracing::trace!("question {question_id} rendered at {}", landed.url);
		// the frame has committed to the new document; now wait for it to finish loading
		self.page.wait_for_navigation().await.map_err(|e| nav_err(format!("navigation failed: {e}")))?;
		Ok(())
	}

	async fn read_view(&self, code: &str) -> Result<RawQuestionView, ExtractError> {
		let eval_err = |reason: String| ExtractError::Evaluation { code: code.to_owned(), reason };

		let script = self.request.script().map_err(|e| eval_err(e.to_string()))?;
		let result = self.page.evaluate(script).await.map_err(|e| eval_err(e.to_string()))?;
		let json_str = result.value().and_then(|v| v.as_str()).ok_or_else(|| eval_err("extraction returned nothing".into()))?;
		serde_json::from_str(json_str).map_err(|e| eval_err(format!("bad extraction JSON: {e}")))
	}
}

/// A `Page.frameNavigated` event reduced to what the renderer checks
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FrameNavigation {
	pub url: String,
	/// No parent frame
	pub main_frame: bool,
}

/// Next navigation of the top-level frame; iframes navigating on the way are skipped. `None` if the stream ends first.
pub async fn next_main_frame_navigation<S: Stream<Item = FrameNavigation> + Unpin>(navigations: &mut S) -> Option<FrameNavigation> {
	while let Some(navigation) = navigations.next().await {
		if navigation.main_frame {
			return Some(navigation);
		}
	}
	None
}

async fn capture_screenshot(frame: &Element, path: &Path) -> Result<(), String> {
	progress(&format!("screenshotting {}", path.display()));
	let png = frame.screenshot(CaptureScreenshotFormat::Png).await.map_err(|e| e.to_string())?;
	write_screenshot(path, &png).await.map_err(|e| e.to_string())
}

/// Write PNG bytes to `path`, creating the screenshots directory on first use
pub async fn write_screenshot(path: &Path, png: &[u8]) -> color_eyre::Result<()> {
	if let Some(dir) = path.parent() {
		tokio::fs::create_dir_all(dir).await.map_err(|e| eyre!("failed to create {}: {}", dir.display(), e))?;
	}
	tokio::fs::write(path, png).await.map_err(|e| eyre!("failed to write {}: {}", path.display(), e))
}
