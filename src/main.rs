use chromiumoxide::browser::{Browser, BrowserConfig};
use clap::Parser;
use color_eyre::{Result, eyre::eyre};
use etesty_scrape::{assets::{AssetTable, spawn_interceptor}, config::{AppConfig, SettingsCommand, SettingsFlags}, runner::scrape_all};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;
use v_utils::log;

#[derive(Parser)]
#[command(name = "etesty_scrape")]
#[command(about = "Scrape the driving-test question bank into per-section CSV files", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<SettingsCommand>,
	// every config field can be overridden here, e.g. `--visible true --keep-going true --sections 42,43`
	#[clap(flatten)]
	settings_flags: SettingsFlags,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("etesty_scrape=info")))
		.with_writer(std::io::stderr)
		.with_target(false)
		.init();

	let cli = Cli::parse();
	if let Some(cmd) = cli.command {
		AppConfig::handle_settings_command(cmd, cli.settings_flags);
	}
	let config = AppConfig::try_build(cli.settings_flags).map_err(|e| eyre!("Failed to load config: {}", e))?;
	tracing::debug!(?config, "resolved config");

	let browser_config = if config.visible {
		BrowserConfig::builder().with_head().build()
	} else {
		BrowserConfig::builder().build()
	}
	.map_err(|e| eyre!("Failed to build browser config: {}", e))?;

	let (mut browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| eyre!("Failed to launch browser: {}", e))?;

	// Drive the CDP connection; errors here are mostly noise from closed targets
	let handle = tokio::spawn(async move {
		while let Some(event) = handler.next().await {
			if let Err(e) = event {
				tracing::trace!("browser handler: {e}");
			}
		}
	});

	let page = browser.new_page("about:blank").await.map_err(|e| eyre!("Failed to create new page: {}", e))?;

	let table = AssetTable::new();
	let interceptor = spawn_interceptor(page.clone(), table.clone(), config.assets_dir()).await?;

	let reports = scrape_all(&page, &config, &table).await?;

	let written: usize = reports.iter().map(|r| r.written).sum();
	let skipped: usize = reports.iter().map(|r| r.skipped).sum();
	let assets = table.len().await;
	tracing::info!(sections = reports.len(), written, skipped, assets, "run finished");

	drop(page);
	browser.close().await.map_err(|e| eyre!("Failed to close browser: {}", e))?;
	interceptor.abort();
	handle.abort();

	log!("done");
	Ok(())
}
