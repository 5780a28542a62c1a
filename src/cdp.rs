//! Chrome DevTools Protocol host implementation

use crate::geometry::{Point, ViewportState};
use crate::host::{DocumentState, ElementHandle, Host, Visibility};
use crate::{Error, Result};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Attribute used to address suppressed fixed elements across evaluations
const MARK_ATTR: &str = "data-rfcapture-id";

/// Launch options for [`CdpHost`]
#[derive(Debug, Clone)]
pub struct CdpConfig {
    /// Browser window (and so viewport) size
    pub window_width: u32,
    pub window_height: u32,
    /// User agent string to send with requests
    pub user_agent: Option<String>,
    /// Wait after navigation before the page is considered ready
    pub load_settle_ms: u64,
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            window_width: 1280,
            window_height: 720,
            user_agent: None,
            load_settle_ms: 500,
        }
    }
}

/// Host backed by a headless Chrome tab (uses the `headless_chrome` crate)
///
/// This adapter launches a headless Chrome instance, manages a single tab,
/// and drives scrolling, rasterization and element visibility through page
/// script evaluation and `Page.captureScreenshot`.
pub struct CdpHost {
    browser: Browser,
    tab: Arc<Tab>,
    config: CdpConfig,
}

#[derive(Deserialize)]
struct ViewportJs {
    x: f64,
    y: f64,
    w: f64,
    h: f64,
    dpr: f64,
}

#[derive(Deserialize)]
struct ScrollJs {
    x: f64,
    y: f64,
}

#[derive(Deserialize)]
struct ElementJs {
    id: String,
    visibility: String,
}

#[derive(Deserialize)]
struct DocumentJs {
    x: f64,
    y: f64,
    overflow: String,
    behavior: String,
}

impl CdpHost {
    /// Launch headless Chrome with a single tab.
    pub fn launch(config: CdpConfig) -> Result<Self> {
        // Configure headless Chrome launch options
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some((config.window_width, config.window_height)))
            .build()
            .map_err(|e| Error::CdpError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::CdpError(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::CdpError(format!("Failed to create tab: {}", e)))?;

        if let Some(ua) = &config.user_agent {
            tab.set_user_agent(ua, None, None)
                .map_err(|e| Error::CdpError(format!("Failed to set user agent: {}", e)))?;
        }

        Ok(Self { browser, tab, config })
    }

    /// Navigate and wait for the page to stabilize.
    pub fn load_url(&mut self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| Error::CdpError(format!("Navigation failed: {}", e)))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| Error::CdpError(format!("Wait for navigation failed: {}", e)))?;

        std::thread::sleep(Duration::from_millis(self.config.load_settle_ms));
        Ok(())
    }

    /// Close the browser and terminate the child process.
    pub fn close(self) -> Result<()> {
        drop(self.tab);
        drop(self.browser);
        Ok(())
    }

    /// Evaluate `script` in the page and deserialize its JSON-string result.
    fn eval_json<T: for<'de> Deserialize<'de>>(&self, script: &str) -> Result<T> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| Error::CdpError(format!("Evaluation failed: {}", e)))?;
        let value = result
            .value
            .ok_or_else(|| Error::CdpError("No value returned from evaluation".into()))?;
        let text = value
            .as_str()
            .ok_or_else(|| Error::CdpError(format!("Expected a JSON string, got {}", value)))?;
        serde_json::from_str(text).map_err(|e| Error::CdpError(format!("Unexpected evaluation result: {}", e)))
    }

    fn eval(&self, script: &str) -> Result<()> {
        self.tab
            .evaluate(script, false)
            .map_err(|e| Error::CdpError(format!("Evaluation failed: {}", e)))?;
        Ok(())
    }
}

impl Host for CdpHost {
    fn viewport(&mut self) -> Result<ViewportState> {
        let v: ViewportJs = self.eval_json(
            "JSON.stringify({x: window.scrollX, y: window.scrollY, w: window.innerWidth, \
             h: window.innerHeight, dpr: window.devicePixelRatio || 1})",
        )?;
        Ok(ViewportState {
            scroll_x: v.x,
            scroll_y: v.y,
            inner_width: v.w,
            inner_height: v.h,
            device_pixel_ratio: v.dpr,
        })
    }

    fn set_scroll(&mut self, x: f64, y: f64) -> Result<()> {
        self.eval(&format!("window.scrollTo({}, {})", x, y))
    }

    fn scroll_position(&mut self) -> Result<Point> {
        let s: ScrollJs = self.eval_json("JSON.stringify({x: window.scrollX, y: window.scrollY})")?;
        Ok(Point::new(s.x, s.y))
    }

    fn request_viewport_raster(&mut self) -> Result<Vec<u8>> {
        let data = self
            .tab
            .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| Error::CaptureUnavailable(format!("Screenshot failed: {}", e)))?;
        if data.is_empty() {
            return Err(Error::CaptureUnavailable("Screenshot returned no data".into()));
        }
        Ok(data)
    }

    fn fixed_visible_elements(&mut self) -> Result<Vec<ElementHandle>> {
        let script = r#"(function(){
            var out = [];
            var n = 0;
            document.querySelectorAll('*').forEach(function(el){
                var s = window.getComputedStyle(el);
                if (s.position !== 'fixed' && s.position !== 'sticky') return;
                if (s.display === 'none' || s.visibility === 'hidden' || s.opacity === '0') return;
                var id = el.getAttribute('{{ATTR}}');
                if (!id) { id = 'rfc-' + (n++) + '-' + Date.now(); el.setAttribute('{{ATTR}}', id); }
                out.push({id: id, visibility: el.style.visibility || ''});
            });
            return JSON.stringify(out);
        })()"#
            .replace("{{ATTR}}", MARK_ATTR);
        let found: Vec<ElementJs> = self.eval_json(&script)?;
        debug!("found {} visible fixed/sticky elements", found.len());
        Ok(found
            .into_iter()
            .map(|e| ElementHandle {
                id: e.id,
                original_visibility: e.visibility,
            })
            .collect())
    }

    fn set_visibility(&mut self, element: &ElementHandle, visibility: Visibility) -> Result<()> {
        let value = match visibility {
            Visibility::Hidden => "hidden".to_string(),
            Visibility::Restore => element.original_visibility.clone(),
        };
        // serde_json quoting doubles as JS string escaping
        let id = serde_json::to_string(&element.id).map_err(|e| Error::Other(e.to_string()))?;
        let value = serde_json::to_string(&value).map_err(|e| Error::Other(e.to_string()))?;
        let cleanup = if visibility == Visibility::Restore {
            format!("el.removeAttribute('{}');", MARK_ATTR)
        } else {
            String::new()
        };
        self.eval(&format!(
            "(function(){{ var el = document.querySelector('[{}=' + JSON.stringify({}) + ']'); \
             if (el) {{ el.style.visibility = {}; {} }} }})()",
            MARK_ATTR, id, value, cleanup
        ))
    }

    fn document_state(&mut self) -> Result<DocumentState> {
        let d: DocumentJs = self.eval_json(
            "JSON.stringify({x: window.scrollX, y: window.scrollY, \
             overflow: document.documentElement.style.overflow || '', \
             behavior: document.documentElement.style.scrollBehavior || ''})",
        )?;
        Ok(DocumentState {
            scroll: Point::new(d.x, d.y),
            overflow: d.overflow,
            scroll_behavior: d.behavior,
        })
    }

    fn apply_capture_style(&mut self) -> Result<()> {
        self.eval(
            "document.documentElement.style.overflow = 'hidden'; \
             document.documentElement.style.scrollBehavior = 'auto';",
        )
    }

    fn restore_document(&mut self, state: &DocumentState) -> Result<()> {
        let overflow = serde_json::to_string(&state.overflow).map_err(|e| Error::Other(e.to_string()))?;
        let behavior = serde_json::to_string(&state.scroll_behavior).map_err(|e| Error::Other(e.to_string()))?;
        self.eval(&format!(
            "document.documentElement.style.overflow = {}; \
             document.documentElement.style.scrollBehavior = {}; \
             window.scrollTo({}, {});",
            overflow, behavior, state.scroll.x, state.scroll.y
        ))
        .map_err(|e| {
            warn!("Failed to restore document state: {}", e);
            e
        })
    }
}
