use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use ::config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

const DEFAULT_CONFIG_FILE: &str = "scraper.toml";
const ENV_PREFIX: &str = "SCRAPER";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub input_path: PathBuf,
    pub dataset_path: PathBuf,
    pub csv_path: PathBuf,
    /// Pause after each scraped page.
    pub delay_ms: u64,
    pub browser: BrowserSettings,
    pub selectors: SelectorTable,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("INPUT.json"),
            dataset_path: PathBuf::from("data/dataset.sqlite"),
            csv_path: PathBuf::from("yelp_data.csv"),
            delay_ms: 2000,
            browser: BrowserSettings::default(),
            selectors: SelectorTable::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub webdriver_url: String,
    pub headless: bool,
    pub user_agent: String,
    pub accept_language: String,
    pub navigation_timeout_secs: u64,
    pub wait_timeout_secs: u64,
    /// Presence of this element marks the listing as rendered.
    pub wait_selector: String,
    pub idle_quiet_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            navigation_timeout_secs: 60,
            wait_timeout_secs: 30,
            wait_selector: r#"[class*="businessTitle"]"#.to_string(),
            idle_quiet_ms: 500,
        }
    }
}

impl BrowserSettings {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn idle_quiet(&self) -> Duration {
        Duration::from_millis(self.idle_quiet_ms)
    }
}

/// CSS selectors per extracted field. Listing markup uses generated class
/// names, so these are matched by class substring and kept overridable.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorTable {
    pub name: String,
    pub categories: String,
    pub price_range: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub rating: String,
    pub review_count: String,
}

impl Default for SelectorTable {
    fn default() -> Self {
        Self {
            name: "h1".to_string(),
            categories: r#"[class*="category-str-list"] a"#.to_string(),
            price_range: r#"[class*="price-range"]"#.to_string(),
            phone: r#"[class*="phone"]"#.to_string(),
            address: r#"[class*="address"]"#.to_string(),
            city: r#"[class*="address-city"]"#.to_string(),
            state: r#"[class*="address-state"]"#.to_string(),
            zip_code: r#"[class*="address-postal"]"#.to_string(),
            country: r#"[class*="address-country"]"#.to_string(),
            rating: r#"[class*="rating"] meta[itemprop="ratingValue"]"#.to_string(),
            review_count: r#"[class*="rating"] meta[itemprop="reviewCount"]"#.to_string(),
        }
    }
}

impl Settings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Defaults, then the config file, then `SCRAPER_*` environment variables.
    ///
    /// An explicit `path` must exist; the default `scraper.toml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p.to_path_buf()).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let builder = Config::builder().add_source(file).add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<::config::builder::DefaultState>) -> Result<Self> {
        builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    #[cfg(test)]
    fn from_toml(toml: &str) -> Result<Self> {
        Self::build(Config::builder().add_source(File::from_str(toml, ::config::FileFormat::Toml)))
    }
}
