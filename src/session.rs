//! Capture sessions: plan, capture, composite, restore, encode, deliver

use std::time::Duration;

use image::RgbaImage;
use log::{debug, info, warn};

use crate::capture::{CancelToken, Checkpoint, FrameCapturer};
use crate::compositor::{Blit, BufferLimits, Compositor};
use crate::geometry::{effective_scale, Rect};
use crate::host::{DocumentState, ElementHandle, Host, Visibility};
use crate::output::{encode_jpeg, EncodedImage, ImageSink};
use crate::planner::{plan_tiles, TilePlan};
use crate::{CaptureConfig, Error, Result};

/// Lifecycle of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Preparing,
    Capturing { tile: usize },
    Compositing { tile: usize },
    Finalizing,
    Done,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Aborted)
    }
}

/// The stitched, not yet encoded result of a session
#[derive(Debug, Clone)]
pub struct Composited {
    pub image: RgbaImage,
    /// Device pixels per CSS pixel in `image`
    pub scale: f64,
    pub plan: TilePlan,
    /// What each tile contributed, in plan order
    pub blits: Vec<Option<Blit>>,
}

/// The delivered result of a session
#[derive(Debug, Clone)]
pub struct CaptureOutput {
    pub image: EncodedImage,
    pub scale: f64,
    pub tiles: usize,
    /// Tiles that overlapped the selection and were copied
    pub tiles_composited: usize,
    /// Whether the sink accepted the image
    pub delivered: bool,
}

/// One capture of one selection.
///
/// A session runs once; its state ends in `Done` or `Aborted`.
#[derive(Debug)]
pub struct CaptureSession {
    selection: Rect,
    config: CaptureConfig,
    state: SessionState,
    history: Vec<SessionState>,
    cancel: CancelToken,
}

impl CaptureSession {
    /// Create a session for `selection` (document coordinates).
    ///
    /// Fails with `InvalidSelection` when the selection is not finite or is
    /// smaller than `config.min_selection` on either axis.
    pub fn new(selection: Rect, config: CaptureConfig) -> Result<Self> {
        config.validate()?;
        if !selection.is_finite() {
            return Err(Error::InvalidSelection(format!("non-finite selection {:?}", selection)));
        }
        if selection.width < config.min_selection || selection.height < config.min_selection {
            return Err(Error::InvalidSelection(format!(
                "{}x{} is smaller than the minimum {}x{}",
                selection.width, selection.height, config.min_selection, config.min_selection
            )));
        }
        Ok(Self {
            selection,
            config,
            state: SessionState::Idle,
            history: vec![SessionState::Idle],
            cancel: CancelToken::new(),
        })
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn selection(&self) -> &Rect {
        &self.selection
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state the session has been in, oldest first
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    /// Handle that dismisses this session from another thread
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Capture, encode and deliver.
    ///
    /// Any capture, allocation or encode failure aborts the session and is
    /// returned as `CaptureFailed`; dismissal returns `Cancelled`. The page is
    /// restored in every case. A sink failure is logged and reported through
    /// `CaptureOutput::delivered` instead of failing the session.
    pub fn run<H, S>(&mut self, host: &mut H, sink: &mut S) -> Result<CaptureOutput>
    where
        H: Host + ?Sized,
        S: ImageSink + ?Sized,
    {
        let composited = self.stitch(host)?;

        let image = match encode_jpeg(&composited.image, self.config.jpeg_quality) {
            Ok(img) => img,
            Err(e) => {
                self.transition(SessionState::Aborted);
                return Err(e.into_capture_failed());
            }
        };

        let delivered = match sink.deliver(&image) {
            Ok(()) => true,
            Err(e) => {
                warn!("delivery of the {}x{} capture failed: {}", image.width, image.height, e);
                false
            }
        };

        self.transition(SessionState::Done);
        info!(
            "capture done: {}x{} jpeg, {} bytes, {} tiles",
            image.width,
            image.height,
            image.bytes.len(),
            composited.plan.len()
        );

        Ok(CaptureOutput {
            image,
            scale: composited.scale,
            tiles: composited.plan.len(),
            tiles_composited: composited.blits.iter().filter(|b| b.is_some()).count(),
            delivered,
        })
    }

    /// Capture and composite without encoding.
    pub fn run_raw<H>(&mut self, host: &mut H) -> Result<Composited>
    where
        H: Host + ?Sized,
    {
        let composited = self.stitch(host)?;
        self.transition(SessionState::Done);
        Ok(composited)
    }

    fn stitch<H>(&mut self, host: &mut H) -> Result<Composited>
    where
        H: Host + ?Sized,
    {
        if self.state != SessionState::Idle {
            return Err(Error::Other(format!("session already ran (state {:?})", self.state)));
        }
        match self.stitch_inner(host) {
            Ok(c) => Ok(c),
            Err(e) => {
                self.transition(SessionState::Aborted);
                if matches!(e, Error::Cancelled) {
                    info!("capture dismissed");
                } else {
                    warn!("capture aborted: {}", e);
                }
                Err(e.into_capture_failed())
            }
        }
    }

    fn stitch_inner<H>(&mut self, host: &mut H) -> Result<Composited>
    where
        H: Host + ?Sized,
    {
        let checkpoint = Checkpoint::new(self.cancel.clone(), self.config.session_timeout_ms);
        checkpoint.check()?;

        self.transition(SessionState::Preparing);
        let mut page = PreparedPage::prepare(host, self.config.hide_fixed_elements)?;

        let viewport = page.host.viewport()?;
        let ratio = viewport.pixel_ratio();
        let scale = effective_scale(&self.selection, ratio, self.config.max_dimension);
        if scale < ratio {
            warn!(
                "selection {}x{} too large at ratio {}; scaling down to {}",
                self.selection.width, self.selection.height, ratio, scale
            );
        }

        let plan = plan_tiles(&self.selection, viewport.inner_width, viewport.inner_height)?;
        let mut compositor = Compositor::new(self.selection, scale, self.config.buffer_limits())?;
        info!(
            "capturing {}x{} at ({}, {}): {} tiles ({}x{}), scale {}",
            self.selection.width,
            self.selection.height,
            self.selection.left,
            self.selection.top,
            plan.len(),
            plan.columns,
            plan.rows,
            scale
        );

        let mut blits = Vec::new();
        {
            let settle = Duration::from_millis(self.config.settle_delay_ms);
            let mut capturer = FrameCapturer::new(&mut *page.host, settle, checkpoint.clone());
            for tile in &plan {
                self.transition(SessionState::Capturing { tile: tile.index });
                let frame = capturer.capture(&tile)?;

                self.transition(SessionState::Compositing { tile: tile.index });
                let blit = compositor.blit(&frame);
                if blit.is_none() {
                    debug!("tile {} does not overlap the selection; skipped", tile.index);
                }
                blits.push(blit);
            }
        }

        self.transition(SessionState::Finalizing);
        if let Err(e) = page.restore() {
            warn!("failed to fully restore the page after capture: {}", e);
        }

        Ok(Composited {
            image: compositor.into_image(),
            scale,
            plan,
            blits,
        })
    }

    fn transition(&mut self, next: SessionState) {
        debug!("session {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
    }
}

/// Page prepared for capture; puts everything back when restored or dropped
struct PreparedPage<'h, H: Host + ?Sized> {
    host: &'h mut H,
    document: Option<DocumentState>,
    hidden: Vec<ElementHandle>,
}

impl<'h, H: Host + ?Sized> PreparedPage<'h, H> {
    fn prepare(host: &'h mut H, hide_fixed: bool) -> Result<Self> {
        let document = host.document_state()?;
        let mut page = Self {
            host,
            document: Some(document),
            hidden: Vec::new(),
        };
        page.host.apply_capture_style()?;

        if hide_fixed {
            let elements = page.host.fixed_visible_elements()?;
            debug!("hiding {} fixed/sticky elements", elements.len());
            for el in elements {
                page.hidden.push(el.clone());
                page.host.set_visibility(&el, Visibility::Hidden)?;
            }
        }
        Ok(page)
    }

    /// Restore hidden elements, then document style and scroll.
    ///
    /// Every step is attempted; the first error is returned. A second call
    /// is a no-op.
    fn restore(&mut self) -> Result<()> {
        let mut first_err = None;
        for el in self.hidden.drain(..).rev() {
            if let Err(e) = self.host.set_visibility(&el, Visibility::Restore) {
                first_err.get_or_insert(e);
            }
        }
        if let Some(doc) = self.document.take() {
            if let Err(e) = self.host.restore_document(&doc) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl<H: Host + ?Sized> Drop for PreparedPage<'_, H> {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!("failed to restore the page: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::synthetic::RasterFault;
    use crate::host::SyntheticPage;
    use crate::output::MemorySink;

    fn config() -> CaptureConfig {
        CaptureConfig {
            settle_delay_ms: 0,
            ..Default::default()
        }
    }

    #[test]
    fn tiny_selection_is_rejected() {
        let err = CaptureSession::new(Rect::new(0.0, 0.0, 19.0, 300.0), config()).unwrap_err();
        assert!(matches!(err, Error::InvalidSelection(_)));
    }

    #[test]
    fn state_machine_walks_every_tile() {
        let mut page = SyntheticPage::new(1000.0, 2000.0, 500.0, 500.0);
        let mut session = CaptureSession::new(Rect::new(0.0, 0.0, 1000.0, 1000.0), config()).unwrap();
        session.run(&mut page, &mut MemorySink::new()).unwrap();

        let h = session.history();
        assert_eq!(h.first(), Some(&SessionState::Idle));
        assert_eq!(h[1], SessionState::Preparing);
        assert_eq!(h[2], SessionState::Capturing { tile: 0 });
        assert_eq!(h[3], SessionState::Compositing { tile: 0 });
        assert_eq!(h[h.len() - 2], SessionState::Finalizing);
        assert_eq!(session.state(), SessionState::Done);
        assert_eq!(h.iter().filter(|s| matches!(s, SessionState::Capturing { .. })).count(), 4);
    }

    #[test]
    fn failure_aborts_and_restores() {
        let mut page = SyntheticPage::new(1000.0, 2000.0, 500.0, 500.0)
            .with_scroll(0.0, 123.0)
            .with_fixed_element("nav", 40.0)
            .with_raster_fault(1, RasterFault::Error);
        let mut session = CaptureSession::new(Rect::new(0.0, 0.0, 1000.0, 1000.0), config()).unwrap();
        let err = session.run(&mut page, &mut MemorySink::new()).unwrap_err();

        assert!(matches!(err.root_cause(), Error::CaptureUnavailable(_)));
        assert_eq!(session.state(), SessionState::Aborted);
        assert_eq!(page.element_visibility("nav"), Some(""));
        assert_eq!(page.current_scroll().y, 123.0);
        assert_eq!(page.overflow(), "");
        assert_eq!(page.raster_calls(), 2);
    }

    #[test]
    fn session_runs_once() {
        let mut page = SyntheticPage::new(500.0, 500.0, 500.0, 500.0);
        let mut session = CaptureSession::new(Rect::new(0.0, 0.0, 100.0, 100.0), config()).unwrap();
        session.run_raw(&mut page).unwrap();
        assert!(session.run_raw(&mut page).is_err());
    }

    #[test]
    fn pre_cancelled_session_never_touches_page() {
        let mut page = SyntheticPage::new(500.0, 500.0, 500.0, 500.0);
        let mut session = CaptureSession::new(Rect::new(0.0, 0.0, 100.0, 100.0), config()).unwrap();
        session.cancel_token().cancel();
        assert!(matches!(session.run_raw(&mut page), Err(Error::Cancelled)));
        assert!(page.scroll_requests().is_empty());
        assert_eq!(page.overflow(), "");
    }

    #[test]
    fn undeliverable_image_still_completes() {
        struct Closed;
        impl ImageSink for Closed {
            fn deliver(&mut self, _image: &EncodedImage) -> Result<()> {
                Err(Error::DeliveryError("closed".into()))
            }
        }
        let mut page = SyntheticPage::new(500.0, 500.0, 500.0, 500.0);
        let mut session = CaptureSession::new(Rect::new(0.0, 0.0, 100.0, 100.0), config()).unwrap();
        let out = session.run(&mut page, &mut Closed).unwrap();
        assert!(!out.delivered);
        assert_eq!(session.state(), SessionState::Done);
    }
}
