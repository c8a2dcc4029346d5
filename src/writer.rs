use std::{
	io,
	path::{Path, PathBuf},
};

use color_eyre::{Result, eyre::eyre};

use crate::{Question, Section};

/// `scrape.<id>.<name>.csv`, the name cut to `max_chars` characters with `/` replaced so it stays one path component
pub fn csv_file_name(section: &Section, max_chars: usize) -> String {
	let name: String = section.name.chars().take(max_chars).collect();
	format!("scrape.{}.{}.csv", section.id, name.replace('/', "-"))
}

/// Rows in `id, code, name, answer, firstWrong, secondWrong, media` order, no header row. Absent values are empty fields.
pub fn write_questions<W: io::Write>(out: W, questions: &[Question]) -> Result<()> {
	let mut writer = csv::WriterBuilder::new().has_headers(false).terminator(csv::Terminator::Any(b'\n')).from_writer(out);
	for question in questions {
		writer.serialize(question).map_err(|e| eyre!("Failed to serialize question {}: {}", question.code, e))?;
	}
	writer.flush()?;
	Ok(())
}

/// Write a section's questions into `dir`, replacing any earlier file of the same name
pub fn write_section(dir: &Path, section: &Section, questions: &[Question], max_chars: usize) -> Result<PathBuf> {
	std::fs::create_dir_all(dir).map_err(|e| eyre!("Failed to create output dir {}: {}", dir.display(), e))?;
	let path = dir.join(csv_file_name(section, max_chars));
	let file = std::fs::File::create(&path).map_err(|e| eyre!("Failed to create {}: {}", path.display(), e))?;
	write_questions(file, questions)?;
	Ok(path)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn question(code: &str, media: Option<&str>) -> Question {
		Question {
			id: 3,
			code: code.into(),
			name: "Which car goes first?".into(),
			answer: "A: the red one".into(),
			first_wrong: Some("B: the blue one, obviously".into()),
			second_wrong: None,
			media: media.map(Into::into),
		}
	}

	#[test]
	fn file_name_truncates_and_sanitizes() {
		assert_eq!(csv_file_name(&Section::new("42".into(), "Signs".into()), 50), "scrape.42.Signs.csv");
		assert_eq!(csv_file_name(&Section::new("7".into(), "Rules/Traffic".into()), 50), "scrape.7.Rules-Traffic.csv");
		assert_eq!(csv_file_name(&Section::new("8".into(), "Příliš dlouhý".into()), 6), "scrape.8.Příliš.csv");
	}

	#[test]
	fn rows_follow_column_order() {
		let mut out = Vec::new();
		write_questions(&mut out, &[question("0001", Some("./assets/a.png")), question("0002", None)]).unwrap();
		let text = String::from_utf8(out).unwrap();
		assert_eq!(
			text,
			"3,0001,Which car goes first?,A: the red one,\"B: the blue one, obviously\",,./assets/a.png\n\
			 3,0002,Which car goes first?,A: the red one,\"B: the blue one, obviously\",,\n"
		);
	}

	#[test]
	fn rewriting_replaces_previous_file() {
		let dir = tempfile::tempdir().unwrap();
		let section = Section::new("42".into(), "Signs".into());

		write_section(dir.path(), &section, &[question("1", None), question("2", None)], 50).unwrap();
		let path = write_section(dir.path(), &section, &[question("1", None)], 50).unwrap();

		assert_eq!(path, dir.path().join("scrape.42.Signs.csv"));
		assert_eq!(std::fs::read_to_string(path).unwrap().lines().count(), 1);
	}

	#[test]
	fn empty_section_writes_empty_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = write_section(dir.path(), &Section::new("1".into(), "Empty".into()), &[], 50).unwrap();
		assert_eq!(std::fs::read_to_string(path).unwrap(), "");
	}
}
