use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use fantoccini::error::{CmdError, ErrorStatus};
use fantoccini::wd::{TimeoutConfiguration, WindowHandle};
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::BrowserSettings;
use crate::error::ScrapeError;

const IDLE_POLL: Duration = Duration::from_millis(100);

/// Resource count once the document has loaded, -1 while still loading.
/// The timing buffer stops recording at 250 entries unless it is enlarged,
/// which would freeze the count on resource-heavy pages.
const IDLE_PROBE_JS: &str = "performance.setResourceTimingBufferSize(100000); \
     return document.readyState === 'complete' \
     ? performance.getEntriesByType('resource').length : -1;";

/// Source of rendered page HTML.
#[async_trait]
pub trait PageFetcher: Send {
    /// Load `url` and return its rendered markup.
    async fn fetch(&mut self, url: &str) -> Result<String, ScrapeError>;

    /// Release the underlying browser session.
    async fn close(self) -> Result<()>;
}

/// Chrome driven over WebDriver. Each fetch uses a fresh tab that is closed
/// before the next one opens.
pub struct WebDriverFetcher {
    client: Client,
    home: WindowHandle,
    settings: BrowserSettings,
}

impl WebDriverFetcher {
    pub async fn connect(settings: &BrowserSettings) -> Result<Self> {
        let mut caps = serde_json::Map::new();
        caps.insert("goog:chromeOptions".to_string(), chrome_options(settings));

        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&settings.webdriver_url)
            .await
            .with_context(|| {
                format!("Failed to start browser session at {}", settings.webdriver_url)
            })?;

        client
            .update_timeouts(TimeoutConfiguration::new(
                None,
                Some(settings.navigation_timeout()),
                None,
            ))
            .await
            .context("Failed to set page load timeout")?;

        let home = client.window().await?;
        info!(webdriver = %settings.webdriver_url, headless = settings.headless, "Browser session started");

        Ok(Self {
            client,
            home,
            settings: settings.clone(),
        })
    }

    async fn load(&self, url: &str) -> Result<String, ScrapeError> {
        let nav_timeout = self.settings.navigation_timeout();
        let deadline = Instant::now() + nav_timeout;
        let nav_err = || ScrapeError::NavigationTimeout {
            url: url.to_string(),
            timeout: nav_timeout,
        };

        match tokio::time::timeout(nav_timeout, self.client.goto(url)).await {
            Err(_) => return Err(nav_err()),
            Ok(Err(e)) if is_timeout(&e) => return Err(nav_err()),
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(())) => {}
        }

        if !self.wait_for_network_idle(deadline).await? {
            return Err(nav_err());
        }

        let selector = &self.settings.wait_selector;
        let wait_timeout = self.settings.wait_timeout();
        match self
            .client
            .wait()
            .at_most(wait_timeout)
            .for_element(Locator::Css(selector))
            .await
        {
            Ok(_) => {}
            Err(e) if is_timeout(&e) => {
                return Err(ScrapeError::ElementWaitTimeout {
                    selector: selector.clone(),
                    timeout: wait_timeout,
                })
            }
            Err(e) => return Err(e.into()),
        }

        Ok(self.client.source().await?)
    }

    /// Poll until the document is loaded and no new resources have been
    /// requested for the quiet period. `false` if the deadline passes first.
    async fn wait_for_network_idle(&self, deadline: Instant) -> Result<bool, ScrapeError> {
        let quiet = self.settings.idle_quiet();
        let mut last_count: Option<i64> = None;
        let mut stable_since = Instant::now();

        loop {
            let count = self
                .client
                .execute(IDLE_PROBE_JS, vec![])
                .await?
                .as_i64()
                .unwrap_or(-1);

            if count >= 0 && last_count == Some(count) {
                if stable_since.elapsed() >= quiet {
                    return Ok(true);
                }
            } else {
                last_count = Some(count);
                stable_since = Instant::now();
            }

            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    async fn close_tab(&self) -> Result<(), CmdError> {
        self.client.close_window().await?;
        self.client.switch_to_window(self.home.clone()).await
    }
}

#[async_trait]
impl PageFetcher for WebDriverFetcher {
    async fn fetch(&mut self, url: &str) -> Result<String, ScrapeError> {
        let tab = self.client.new_window(true).await?;
        self.client.switch_to_window(tab.handle).await?;
        debug!(url, "Opened tab");

        let result = self.load(url).await;

        // The tab goes away whether or not the load succeeded.
        match (result, self.close_tab().await) {
            (Ok(html), Ok(())) => Ok(html),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), closed) => {
                if let Err(ce) = closed {
                    warn!(url, error = %ce, "Failed to close tab");
                }
                Err(e)
            }
        }
    }

    async fn close(self) -> Result<()> {
        self.client
            .close()
            .await
            .context("Failed to close browser session")?;
        info!("Browser session closed");
        Ok(())
    }
}

fn is_timeout(e: &CmdError) -> bool {
    match e {
        CmdError::WaitTimeout => true,
        CmdError::Standard(w) => w.error == ErrorStatus::Timeout,
        _ => false,
    }
}

/// Launch options carrying the fixed request identity.
fn chrome_options(settings: &BrowserSettings) -> serde_json::Value {
    let lang = settings
        .accept_language
        .split(',')
        .next()
        .unwrap_or("en-US")
        .trim();

    let mut args = vec![
        format!("--user-agent={}", settings.user_agent),
        format!("--lang={}", lang),
        "--window-size=1366,900".to_string(),
    ];
    if settings.headless {
        args.push("--headless=new".to_string());
        args.push("--disable-gpu".to_string());
    }

    json!({
        "args": args,
        "prefs": { "intl.accept_languages": settings.accept_language },
    })
}

/// Ask the WebDriver endpoint whether it can start a session.
pub async fn probe(webdriver_url: &str) -> Result<(bool, String)> {
    let status_url = format!("{}/status", webdriver_url.trim_end_matches('/'));
    let body = reqwest::get(&status_url)
        .await
        .with_context(|| format!("WebDriver not reachable at {}", status_url))?
        .text()
        .await?;
    let v: serde_json::Value =
        serde_json::from_str(&body).context("WebDriver /status returned invalid JSON")?;
    let ready = v["value"]["ready"].as_bool().unwrap_or(false);
    let message = v["value"]["message"].as_str().unwrap_or("").to_string();
    Ok((ready, message))
}
