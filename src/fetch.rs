use color_eyre::{Result, eyre::eyre};
use derive_new::new;
use url::Url;

use crate::QuestionsRes;

pub const GENERATE_PRACTISE_PATH: &str = "/Test/GeneratePractise/";

/// Requests a section's question set straight from the portal, outside the browser
#[derive(Clone, Debug, new)]
pub struct QuestionFetcher {
	client: reqwest::Client,
	endpoint: Url,
}

impl QuestionFetcher {
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// POST `lectureID=<section_id>` and parse the returned question list. No retries.
	pub async fn fetch(&self, section_id: &str) -> Result<QuestionsRes> {
		tracing::debug!("fetching questions for section {section_id} from {}", self.endpoint);
		let response = self
			.client
			.post(self.endpoint.clone())
			.form(&[("lectureID", section_id)])
			.send()
			.await
			.map_err(|e| eyre!("Failed to request questions for section {}: {}", section_id, e))?
			.error_for_status()
			.map_err(|e| eyre!("Portal rejected question request for section {}: {}", section_id, e))?;
		let body = response.text().await.map_err(|e| eyre!("Failed to read questions for section {}: {}", section_id, e))?;
		parse_questions(&body).map_err(|e| eyre!("Section {}: {}", section_id, e))
	}
}

pub fn parse_questions(body: &str) -> Result<QuestionsRes> {
	serde_json::from_str(body).map_err(|e| eyre!("Failed to parse questions JSON: {}", e))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_question_list() {
		let res = parse_questions(r#"{"Questions":[{"QuestionID":1,"Code":"0001","CorrectAnswers":[3]}]}"#).unwrap();
		assert_eq!(res.questions.len(), 1);
		assert_eq!(res.questions[0].correct_answer_id(), Some(3));
	}

	#[test]
	fn rejects_html_error_page() {
		let err = parse_questions("<html><body>500</body></html>").unwrap_err();
		assert!(err.to_string().contains("Failed to parse questions JSON"));
	}

	#[test]
	fn missing_question_list_is_an_error() {
		assert!(parse_questions("{}").is_err());
	}

	#[test]
	fn fetcher_targets_given_endpoint() {
		let endpoint = Url::parse("https://etesty2.mdcr.cz").unwrap().join(GENERATE_PRACTISE_PATH).unwrap();
		let fetcher = QuestionFetcher::new(reqwest::Client::new(), endpoint);
		assert_eq!(fetcher.endpoint().as_str(), "https://etesty2.mdcr.cz/Test/GeneratePractise/");
	}
}
