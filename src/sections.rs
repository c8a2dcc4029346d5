use chromiumoxide::Page;
use color_eyre::{Result, eyre::eyre};
use serde::Deserialize;
use url::Url;

use crate::Section;

/// Landing page listing all test sections
pub const SECTIONS_PATH: &str = "/Home/Tests/ro";
pub const SECTIONS_SELECTOR: &str = "#VerticalMenuPanel > ul:first-of-type > li > a";

/// Menu link as read from the DOM
#[derive(Clone, Debug, Deserialize)]
struct RawAnchor {
	href: String,
	text: String,
}

/// Navigate to the section listing and read the menu, in DOM order
pub async fn list_sections(page: &Page, listing_url: &Url) -> Result<Vec<Section>> {
	page.goto(listing_url.as_str())
		.await
		.map_err(|e| eyre!("Failed to navigate to {}: {}", listing_url, e))?;

	let selector = serde_json::to_string(SECTIONS_SELECTOR)?;
	let script = format!(
		r#"
		(function() {{
			const anchors = document.querySelectorAll({selector});
			return JSON.stringify(Array.from(anchors, a => ({{ href: a.href, text: a.text }})));
		}})()
		"#
	);

	let result = page.evaluate(script).await.map_err(|e| eyre!("Failed to read section menu: {}", e))?;
	sections_from_menu_json(result.value().and_then(|v| v.as_str()))
}

/// Map the menu script's result onto sections. A missing result means the page never answered, which is fatal.
pub fn sections_from_menu_json(json: Option<&str>) -> Result<Vec<Section>> {
	let json = json.ok_or_else(|| eyre!("Section menu evaluation returned nothing"))?;
	let anchors: Vec<RawAnchor> = serde_json::from_str(json).map_err(|e| eyre!("Failed to parse section menu JSON: {}", e))?;
	Ok(anchors.iter().map(|a| section_from_anchor(&a.href, &a.text)).collect())
}

/// The section id is whatever follows the last `/` of the link
pub fn section_from_anchor(href: &str, text: &str) -> Section {
	let id = href.rsplit('/').next().unwrap_or_default();
	Section::new(id.to_owned(), text.to_owned())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn id_is_last_path_segment() {
		let section = section_from_anchor("https://etesty2.mdcr.cz/Test/Lecture/42", "Signs");
		assert_eq!(section, Section::new("42".into(), "Signs".into()));
	}

	#[test]
	fn trailing_slash_gives_empty_id() {
		assert_eq!(section_from_anchor("https://etesty2.mdcr.cz/Test/Lecture/", "x").id, "");
	}

	#[test]
	fn name_is_kept_verbatim() {
		let section = section_from_anchor("/a/7", "Rules / Traffic");
		assert_eq!(section.id, "7");
		assert_eq!(section.name, "Rules / Traffic");
	}

	#[test]
	fn menu_json_maps_in_dom_order() {
		let json = r#"[{"href":"https://etesty2.mdcr.cz/Test/Lecture/42","text":"Signs"},{"href":"https://etesty2.mdcr.cz/Test/Lecture/7","text":"Rules"}]"#;
		let sections = sections_from_menu_json(Some(json)).unwrap();
		assert_eq!(sections, vec![Section::new("42".into(), "Signs".into()), Section::new("7".into(), "Rules".into())]);
	}

	#[test]
	fn empty_menu_is_not_an_error() {
		assert!(sections_from_menu_json(Some("[]")).unwrap().is_empty());
	}

	#[test]
	fn missing_evaluation_result_is_fatal() {
		let err = sections_from_menu_json(None).unwrap_err();
		assert!(err.to_string().contains("returned nothing"));
	}

	#[test]
	fn malformed_menu_json_is_fatal() {
		assert!(sections_from_menu_json(Some("{not json")).is_err());
		assert!(sections_from_menu_json(Some(r#"[{"href":1}]"#)).is_err());
	}
}
