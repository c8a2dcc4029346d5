//! Section-by-section scraping loop

use std::{io::Write, path::PathBuf};

use chromiumoxide::Page;
use color_eyre::{Result, eyre::eyre};
use v_utils::{elog, log};

use crate::{
	Question, Section,
	assets::AssetTable,
	config::AppConfig,
	extract::{ExtractError, QuestionRenderer},
	fetch::{GENERATE_PRACTISE_PATH, QuestionFetcher},
	sections::{SECTIONS_PATH, list_sections},
	writer::write_section,
};

/// Overwrite the current console line
pub fn progress(line: &str) {
	let mut stdout = std::io::stdout().lock();
	let _ = write!(stdout, "\r{line} \x1B[0K");
	let _ = stdout.flush();
}

/// Collects a section's questions and applies the failure policy to each result
#[derive(Debug, Default)]
pub struct SectionAccumulator {
	keep_going: bool,
	questions: Vec<Question>,
	skipped: usize,
}

impl SectionAccumulator {
	pub fn new(keep_going: bool) -> Self {
		Self { keep_going, ..Default::default() }
	}

	/// Keep a question, or decide what a failed one means: skip it with `keep_going`, abort otherwise
	pub fn push(&mut self, outcome: Result<Question, ExtractError>) -> Result<()> {
		match outcome {
			Ok(question) => {
				tracing::trace!("{question}");
				self.questions.push(question);
				Ok(())
			}
			Err(e) if self.keep_going => {
				elog!("skipping: {}", e);
				self.skipped += 1;
				Ok(())
			}
			Err(e) => Err(e.into()),
		}
	}

	pub fn questions(&self) -> &[Question] {
		&self.questions
	}

	pub fn skipped(&self) -> usize {
		self.skipped
	}
}

#[derive(Clone, Debug)]
pub struct SectionReport {
	pub section: Section,
	pub written: usize,
	pub skipped: usize,
	pub file: PathBuf,
}

/// Enumerate sections, then fetch, render and write each one in turn
pub async fn scrape_all(page: &Page, config: &AppConfig, table: &AssetTable) -> Result<Vec<SectionReport>> {
	let base = config.base()?;
	let sections = list_sections(page, &config.endpoint(SECTIONS_PATH)?).await?;
	tracing::info!("found {} sections", sections.len());

	let fetcher = QuestionFetcher::new(reqwest::Client::new(), config.endpoint(GENERATE_PRACTISE_PATH)?);
	let renderer = QuestionRenderer::new(page.clone(), base, table.clone(), config.screenshots_dir())?;

	let mut reports = Vec::new();
	for section in sections.into_iter().filter(|s| config.wants_section(&s.id)) {
		reports.push(scrape_section(&fetcher, &renderer, section, config).await?);
	}
	Ok(reports)
}

pub async fn scrape_section(fetcher: &QuestionFetcher, renderer: &QuestionRenderer, section: Section, config: &AppConfig) -> Result<SectionReport> {
	log!("scraping section {}", section.name);
	let res = fetcher.fetch(&section.id).await?;
	let total = res.questions.len();

	let mut acc = SectionAccumulator::new(config.keep_going);
	for (i, meta) in res.questions.iter().enumerate() {
		progress(&format!("  {}/{}: {}", i + 1, total, meta.code));
		acc.push(renderer.render(meta).await)?;
	}

	let file = write_section(&config.out_dir, &section, acc.questions(), config.name_max_chars)
		.map_err(|e| eyre!("Failed to write section {}: {}", section.id, e))?;
	progress(&format!("  {} questions written to {}", acc.questions().len(), file.display()));
	println!();
	if acc.skipped() > 0 {
		elog!("{} of {} questions skipped in section {}", acc.skipped(), total, section.name);
	}

	Ok(SectionReport {
		written: acc.questions().len(),
		skipped: acc.skipped(),
		section,
		file,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn question(code: &str) -> Question {
		Question {
			id: 1,
			code: code.into(),
			name: "q".into(),
			answer: "A: a".into(),
			first_wrong: None,
			second_wrong: None,
			media: None,
		}
	}

	#[test]
	fn failure_aborts_by_default() {
		let mut acc = SectionAccumulator::new(false);
		acc.push(Ok(question("1"))).unwrap();
		let err = acc.push(Err(ExtractError::MissingFrame { code: "2".into() })).unwrap_err();
		assert!(err.to_string().contains("media frame"));
		assert_eq!(acc.questions().len(), 1);
	}

	#[test]
	fn keep_going_skips_failures() {
		let mut acc = SectionAccumulator::new(true);
		acc.push(Ok(question("1"))).unwrap();
		acc.push(Err(ExtractError::MissingAnswers { code: "2".into() })).unwrap();
		acc.push(Ok(question("3"))).unwrap();
		assert_eq!(acc.questions().iter().map(|q| q.code.as_str()).collect::<Vec<_>>(), vec!["1", "3"]);
		assert_eq!(acc.skipped(), 1);
	}
}
