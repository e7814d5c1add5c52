//! Native browser management using `chromiumoxide`.
//!
//! Single source of truth for:
//! * Finding a usable browser executable (env override → PATH scan →
//!   well-known install paths, cross-platform).
//! * Launching a headless session against the directory page.
//! * `wait_until_stable` — poll-until-stable readiness instead of fixed
//!   sleeps, so interaction timing is bounded and observable.
//! * Locating and activating pagination controls in the live page.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::core::error::EngineError;
use crate::net::random_user_agent;

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan — finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Ok(p) = std::env::var("CHROME_EXECUTABLE") {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
            "brave",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/brave-browser",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

/// `true` when a usable browser binary is present on this machine.
/// Gates the simulated-interaction mechanism.
pub fn native_browser_available() -> bool {
    find_chrome_executable().is_some()
}

fn build_headless_config(exe: &str, width: u32, height: u32) -> Result<BrowserConfig> {
    let ua = random_user_agent();

    BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--disable-gpu")
        .arg("--no-sandbox") // often required in CI / restricted environments
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--hide-scrollbars")
        .arg("--mute-audio")
        .arg(format!("--user-agent={}", ua))
        .build()
        .map_err(|e| anyhow!("failed to build browser config: {}", e))
}

/// One live, script-executing rendering session pinned to a directory page.
///
/// Pagination on the target is stateful — the rendered result of page N must
/// be observed before page N+1 can be requested — so a session is owned by
/// exactly one traversal and never shared.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler: tokio::task::JoinHandle<()>,
}

impl BrowserSession {
    /// Launch the browser and navigate to `url`. A launch failure here is the
    /// one fatal error class: the caller aborts before any page is fetched.
    pub async fn launch(url: &str) -> std::result::Result<Self, EngineError> {
        let exe = find_chrome_executable().ok_or(EngineError::BrowserMissing)?;
        info!("🚀 launching headless browser: {}", exe);

        let config = build_headless_config(&exe, 1280, 900).map_err(|e| {
            EngineError::BrowserLaunch {
                exe: exe.clone(),
                reason: e.to_string(),
            }
        })?;

        let (browser, mut handler) =
            Browser::launch(config)
                .await
                .map_err(|e| EngineError::BrowserLaunch {
                    exe: exe.clone(),
                    reason: e.to_string(),
                })?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler event error: {}", e);
                }
            }
        });

        let page = match browser.new_page(url).await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(EngineError::BrowserLaunch {
                    exe,
                    reason: format!("failed to open page: {}", e),
                });
            }
        };

        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    /// Wait until the page network goes idle (no new resource entries for
    /// `quiet_ms` consecutive ms) or until `timeout_ms` has elapsed.
    ///
    /// Polls `performance.getEntriesByType("resource").length` every 250 ms —
    /// a networkidle heuristic that works without CDP Network events.
    pub async fn wait_until_stable(&self, quiet_ms: u64, timeout_ms: u64) {
        let poll_ms = 250u64;
        let start = std::time::Instant::now();
        let mut last_count: u64 = 0;
        let mut stable_since = std::time::Instant::now();

        loop {
            if start.elapsed().as_millis() as u64 >= timeout_ms {
                debug!("wait_until_stable: timeout after {}ms", timeout_ms);
                return;
            }

            let count: u64 = self
                .eval_u64("performance.getEntriesByType('resource').length")
                .await
                .unwrap_or(0);

            let ready_complete = self
                .eval_string("document.readyState")
                .await
                .map(|s| s == "complete")
                .unwrap_or(false);

            if !ready_complete {
                stable_since = std::time::Instant::now();
                last_count = count;
            } else if count != last_count {
                last_count = count;
                stable_since = std::time::Instant::now();
            } else if stable_since.elapsed().as_millis() as u64 >= quiet_ms {
                debug!(
                    "wait_until_stable: idle after {}ms ({} resources)",
                    start.elapsed().as_millis(),
                    count
                );
                return;
            }

            tokio::time::sleep(Duration::from_millis(poll_ms)).await;
        }
    }

    /// Snapshot the current rendered HTML.
    pub async fn content(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| anyhow!("failed to read page content: {}", e))
    }

    /// Click the first visible element matching `selector`.
    /// Returns `false` when no element matches (not an error).
    pub async fn click_selector(&self, selector: &str) -> Result<bool> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(|e| anyhow!("selector query failed ({}): {}", selector, e))?;

        for element in elements {
            if element.scroll_into_view().await.is_err() {
                continue;
            }
            match element.click().await {
                Ok(_) => return Ok(true),
                Err(e) => {
                    debug!("native click failed on {}: {}", selector, e);
                    continue;
                }
            }
        }
        Ok(false)
    }

    /// Click the element inside any `container_selector` whose trimmed text
    /// equals `label`. Returns `false` when nothing matches.
    pub async fn click_by_text(&self, container_selector: &str, label: &str) -> Result<bool> {
        let elements = self
            .page
            .find_elements(container_selector)
            .await
            .map_err(|e| anyhow!("selector query failed ({}): {}", container_selector, e))?;

        for element in elements {
            let text = match element.inner_text().await {
                Ok(Some(text)) => text.trim().to_string(),
                _ => continue,
            };
            if text != label {
                continue;
            }
            if element.scroll_into_view().await.is_err() {
                continue;
            }
            match element.click().await {
                Ok(_) => return Ok(true),
                Err(e) => {
                    debug!("native click failed on text '{}': {}", label, e);
                    continue;
                }
            }
        }
        Ok(false)
    }

    /// Alternate activation path: dispatch a synthetic click from inside the
    /// page. Used when the native CDP click fails (overlays, custom widgets).
    pub async fn js_click(&self, selector: &str) -> Result<bool> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; el.click(); return true; }})()",
            serde_json::to_string(selector)?
        );
        self.eval_bool(&script).await
    }

    /// Synthetic click on the element inside `container_selector` whose text
    /// equals `label`, walked entirely in page script.
    pub async fn js_click_by_text(&self, container_selector: &str, label: &str) -> Result<bool> {
        let script = format!(
            "(() => {{ const els = document.querySelectorAll({}); for (const el of els) {{ if ((el.textContent || '').trim() === {}) {{ el.click(); return true; }} }} return false; }})()",
            serde_json::to_string(container_selector)?,
            serde_json::to_string(label)?
        );
        self.eval_bool(&script).await
    }

    async fn eval_u64(&self, script: &str) -> Option<u64> {
        self.page
            .evaluate(script)
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_u64())
    }

    async fn eval_string(&self, script: &str) -> Option<String> {
        self.page
            .evaluate(script)
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_str().map(|s| s.to_string()))
    }

    async fn eval_bool(&self, script: &str) -> Result<bool> {
        let value = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| anyhow!("script evaluation failed: {}", e))?
            .into_value::<serde_json::Value>()
            .map_err(|e| anyhow!("script result decode failed: {}", e))?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Gracefully shut the session down.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("browser close error (non-fatal): {}", e);
        }
        self.handler.abort();
    }
}
