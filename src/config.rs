use std::path::PathBuf;

use color_eyre::{Result, eyre::eyre};
use url::Url;
use v_utils::macros::{MyConfigPrimitives, Settings};

#[derive(Clone, Debug, MyConfigPrimitives, Settings)]
pub struct AppConfig {
	/// Portal origin; every endpoint path is joined onto it (default: https://etesty2.mdcr.cz)
	#[primitives(skip)]
	#[serde(default = "default_base_url")]
	pub base_url: String,
	/// Directory receiving the CSV files plus the `assets/` and `screenshots/` trees (default: .)
	#[primitives(skip)]
	#[serde(default = "default_out_dir")]
	pub out_dir: PathBuf,
	/// Run with visible browser window (non-headless mode)
	#[serde(default)]
	pub visible: bool,
	/// Log and skip questions that fail to extract instead of aborting the run
	#[serde(default)]
	pub keep_going: bool,
	/// Only scrape these section ids (empty: all sections)
	#[serde(default)]
	pub sections: Vec<String>,
	/// Section names are cut to this many characters in CSV file names (default: 50)
	#[serde(default = "default_name_max_chars")]
	pub name_max_chars: usize,
}

fn default_base_url() -> String {
	"https://etesty2.mdcr.cz".to_owned()
}

fn default_out_dir() -> PathBuf {
	PathBuf::from(".")
}

fn default_name_max_chars() -> usize {
	50
}

impl Default for AppConfig {
	fn default() -> Self {
		Self {
			base_url: default_base_url(),
			out_dir: default_out_dir(),
			visible: false,
			keep_going: false,
			sections: Vec::new(),
			name_max_chars: default_name_max_chars(),
		}
	}
}

impl AppConfig {
	pub fn base(&self) -> Result<Url> {
		Url::parse(&self.base_url).map_err(|e| eyre!("Invalid base URL {:?}: {}", self.base_url, e))
	}

	/// Absolute URL of an endpoint path on the portal
	pub fn endpoint(&self, path: &str) -> Result<Url> {
		self.base()?.join(path).map_err(|e| eyre!("Failed to build URL for {}: {}", path, e))
	}

	pub fn assets_dir(&self) -> PathBuf {
		self.out_dir.join("assets")
	}

	pub fn screenshots_dir(&self) -> PathBuf {
		self.out_dir.join("screenshots")
	}

	pub fn wants_section(&self, id: &str) -> bool {
		self.sections.is_empty() || self.sections.iter().any(|s| s == id)
	}
}
