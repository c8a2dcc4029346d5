use std::path::Path;

use etesty_scrape::{
	QuestionsRes, Section,
	assets::AssetTable,
	extract::{Media, MediaSource, RawQuestionView, assemble_question, screenshot_path, write_screenshot},
	fetch::parse_questions,
	runner::SectionAccumulator,
	sections::section_from_anchor,
	writer::write_section,
};
use url::Url;

fn view(json: &str) -> RawQuestionView {
	serde_json::from_str(json).unwrap()
}

async fn run_section(out: &Path, section: &Section, res: &QuestionsRes, views: &[RawQuestionView], table: &AssetTable) -> std::path::PathBuf {
	let base = Url::parse("https://etesty2.mdcr.cz").unwrap();
	let mut acc = SectionAccumulator::new(false);
	for (meta, view) in res.questions.iter().zip(views) {
		let shot = screenshot_path(&out.join("screenshots"), &meta.code);
		let media = Media::resolve(&MediaSource::from_view(view), &base, table, &shot).await;
		acc.push(assemble_question(meta, view, &media)).unwrap();
		// stand-in for the element capture the browser would hand back
		if let Media::Screenshot(path) = &media {
			write_screenshot(path, format!("png of {}", meta.code).as_bytes()).await.unwrap();
		}
	}
	write_section(out, section, acc.questions(), 50).unwrap()
}

#[tokio::test]
async fn screenshot_only_section_produces_one_row_per_question() {
	let out = tempfile::tempdir().unwrap();
	let section = section_from_anchor("https://etesty2.mdcr.cz/Test/Lecture/42", "Signs");
	let res = parse_questions(r#"{"Questions":[{"QuestionID":1,"Code":"0001","CorrectAnswers":[12]},{"QuestionID":2,"Code":"0002","CorrectAnswers":[21]}]}"#).unwrap();
	let views = [
		view(r#"{"answers":[{"answer_id":"11","text":"left"},{"answer_id":"12","text":"right"},{"answer_id":"13","text":"neither"}],"question_texts":["","Which way?"],"frame_children":[],"video_source_src":null}"#),
		view(r#"{"answers":[{"answer_id":"21","text":"stop"},{"answer_id":"22","text":"go"},{"answer_id":"23","text":"wait"}],"question_texts":["Red light?"],"frame_children":[{"tag":"img","src":"a"},{"tag":"img","src":"b"}],"video_source_src":null}"#),
	];

	let file = run_section(out.path(), &section, &res, &views, &AssetTable::new()).await;

	assert_eq!(file.file_name().unwrap(), "scrape.42.Signs.csv");
	let csv = std::fs::read_to_string(&file).unwrap();
	let rows: Vec<&str> = csv.lines().collect();
	assert_eq!(rows.len(), res.questions.len());

	let shots = out.path().join("screenshots");
	assert_eq!(rows[0], format!("1,0001,Which way?,A: right,B: left,C: neither,{}", shots.join("0001.png").display()));
	assert_eq!(rows[1], format!("2,0002,Red light?,A: stop,B: go,C: wait,{}", shots.join("0002.png").display()));
	assert_eq!(std::fs::read_to_string(shots.join("0001.png")).unwrap(), "png of 0001");
	assert_eq!(std::fs::read_to_string(shots.join("0002.png")).unwrap(), "png of 0002");
	assert_eq!(std::fs::read_dir(&shots).unwrap().count(), 2);
}

#[tokio::test]
async fn single_media_child_uses_captured_asset_or_remote_url() {
	let out = tempfile::tempdir().unwrap();
	let section = Section::new("7".into(), "Media/Video".into());
	let res = parse_questions(r#"{"Questions":[{"QuestionID":5,"Code":"0500","CorrectAnswers":[]},{"QuestionID":6,"Code":"0600","CorrectAnswers":[]}]}"#).unwrap();
	let views = [
		view(r#"{"answers":[{"answer_id":"1","text":"yes"}],"question_texts":["Seen?"],"frame_children":[{"tag":"img","src":"/Content/ImageQuestion/5/pic"}],"video_source_src":null}"#),
		view(r#"{"answers":[{"answer_id":"1","text":"yes"},{"answer_id":"2","text":"no"}],"question_texts":["Played?"],"frame_children":[{"tag":"video","src":null}],"video_source_src":"/Content/ImageQuestion/6/clip"}"#),
	];
	let table = AssetTable::new();
	table.insert("https://etesty2.mdcr.cz/Content/ImageQuestion/5/pic", "./assets/5-pic.png").await;

	let file = run_section(out.path(), &section, &res, &views, &table).await;

	assert_eq!(file.file_name().unwrap(), "scrape.7.Media-Video.csv");
	let csv = std::fs::read_to_string(&file).unwrap();
	let rows: Vec<&str> = csv.lines().collect();
	assert_eq!(rows, vec![
		"5,0500,Seen?,A: yes,,,./assets/5-pic.png",
		"6,0600,Played?,A: yes,B: no,,https://etesty2.mdcr.cz/Content/ImageQuestion/6/clip",
	]);
	assert!(!out.path().join("screenshots").exists());
}
