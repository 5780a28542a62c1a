use crate::geometry::Rect;
use crate::host::Host;
use crate::output::ImageSink;
use crate::{CancelToken, CaptureConfig, CaptureOutput, CaptureSession, Error, Result};
use std::sync::mpsc::{self, Sender};
use std::thread;
use tokio::sync::oneshot;

enum Command {
    Capture(Rect, CancelToken, oneshot::Sender<Result<CaptureOutput>>),
    SetConfig(CaptureConfig, oneshot::Sender<Result<()>>),
    Close(oneshot::Sender<Result<()>>),
}

/// An async-friendly capture service backed by a dedicated worker thread.
///
/// The worker thread owns the host and the delivery sink and runs one
/// session at a time, so callers can use an async interface while the page
/// viewport stays under exclusive control of a single session.
#[derive(Clone)]
pub struct Capturer {
    cmd_tx: Sender<Command>,
}

/// A capture in flight; dismiss it with [`PendingCapture::cancel`].
pub struct PendingCapture {
    cancel: CancelToken,
    rx: oneshot::Receiver<Result<CaptureOutput>>,
}

impl Capturer {
    /// Create a capturer (spawns a background thread that builds and owns
    /// the host).
    ///
    /// `make_host` runs on the worker thread, so the host itself does not
    /// need to be `Send`.
    pub async fn new<H, S, F>(make_host: F, sink: S, config: Option<CaptureConfig>) -> Result<Self>
    where
        H: Host + 'static,
        S: ImageSink + Send + 'static,
        F: FnOnce() -> Result<H> + Send + 'static,
    {
        let mut config = config.unwrap_or_default();
        config.validate()?;

        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx) = oneshot::channel::<Result<()>>();

        thread::spawn(move || {
            let mut sink = sink;
            // Initialize the host on the worker thread
            let mut host = match make_host() {
                Ok(h) => h,
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };

            let _ = init_tx.send(Ok(()));

            // Command loop
            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::Capture(selection, cancel, resp) => {
                        let res = CaptureSession::new(selection, config.clone())
                            .map(|s| s.with_cancel_token(cancel))
                            .and_then(|mut session| session.run(&mut host, &mut sink));
                        let _ = resp.send(res);
                    }
                    Command::SetConfig(next, resp) => {
                        let res = next.validate().map(|()| config = next);
                        let _ = resp.send(res);
                    }
                    Command::Close(resp) => {
                        let _ = resp.send(Ok(()));
                        break;
                    }
                }
            }
        });

        // Wait for the worker to report initialization success or failure
        let init_res = init_rx
            .await
            .map_err(|e| Error::Other(format!("Worker init canceled: {}", e)))?;
        init_res?;

        Ok(Self { cmd_tx })
    }

    /// Queue a capture of `selection` and return a handle to it.
    ///
    /// Captures queued on the same capturer run strictly one after another.
    pub fn begin(&self, selection: Rect) -> Result<PendingCapture> {
        let (tx, rx) = oneshot::channel();
        let cancel = CancelToken::new();
        self.cmd_tx
            .send(Command::Capture(selection, cancel.clone(), tx))
            .map_err(|_| Error::Other("capture worker has shut down".into()))?;
        Ok(PendingCapture { cancel, rx })
    }

    /// Capture `selection` and wait for the result.
    pub async fn capture(&self, selection: Rect) -> Result<CaptureOutput> {
        self.begin(selection)?.wait().await
    }

    /// Replace the configuration used by later captures.
    pub async fn set_config(&self, config: CaptureConfig) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::SetConfig(config, tx));
        rx.await
            .map_err(|e| Error::Other(format!("SetConfig canceled: {}", e)))?
    }

    /// Shutdown the background worker.
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Close(tx));
        rx.await
            .map_err(|e| Error::Other(format!("Close canceled: {}", e)))?
    }
}

impl PendingCapture {
    /// Dismiss the capture; it stops at its next suspend point and restores
    /// the page.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub async fn wait(self) -> Result<CaptureOutput> {
        self.rx
            .await
            .map_err(|e| Error::Other(format!("Capture canceled: {}", e)))?
    }
}
