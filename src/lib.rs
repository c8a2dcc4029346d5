use std::fmt;

use derive_new::new;
use serde::{Deserialize, Serialize};

pub mod assets;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod runner;
pub mod sections;
pub mod writer;

/// A topic grouping of questions, as listed in the portal's side menu
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, new)]
pub struct Section {
	/// Trailing path segment of the menu link, used as `lectureID` when fetching questions
	pub id: String,
	/// Visible link text
	pub name: String,
}

/// Response of the practice-generation endpoint
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct QuestionsRes {
	pub questions: Vec<QuestionMeta>,
}

/// Per-question metadata returned by the portal for a section
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct QuestionMeta {
	#[serde(rename = "QuestionID")]
	pub question_id: i64,
	#[serde(rename = "Code")]
	pub code: String,
	#[serde(rename = "CorrectAnswers", default)]
	pub correct_answers: Vec<i64>,
}

impl QuestionMeta {
	/// Only the first correct answer is ever promoted; multi-answer questions are not modeled.
	pub fn correct_answer_id(&self) -> Option<i64> {
		self.correct_answers.first().copied()
	}
}

/// One scraped question, in output column order
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
	pub id: i64,
	pub code: String,
	/// The question text
	pub name: String,
	/// Correct answer, always prefixed `A: `
	pub answer: String,
	pub first_wrong: Option<String>,
	pub second_wrong: Option<String>,
	/// Local asset path, local screenshot path, or absolute remote URL
	pub media: Option<String>,
}

impl fmt::Display for Question {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "[{}] {}", self.code, self.name)?;
		writeln!(f, "  {} (correct)", self.answer)?;
		for wrong in [&self.first_wrong, &self.second_wrong].into_iter().flatten() {
			writeln!(f, "  {}", wrong)?;
		}
		if let Some(media) = &self.media {
			writeln!(f, "  media: {}", media)?;
		}
		Ok(())
	}
}
