//! Capture agent: the privileged "capture the visible viewport" capability.
//!
//! The agent runs on its own worker thread that owns a synchronous
//! [`ViewportCapturer`]. Callers hold a cheap, cloneable [`AgentHandle`] and
//! talk to it by request/response: each request carries a oneshot sender and
//! is answered with a [`CaptureResponse`].

use crate::message::{AgentRequest, CaptureResponse};
use crate::{Error, Result};
use log::{debug, warn};
use std::sync::mpsc::{self, Sender};
use std::thread;
use tokio::sync::oneshot;

/// Backend that can grab whatever is currently visible in the page's window.
///
/// Implementations must return an error (never an empty image) when the
/// platform denies or fails the capture.
pub trait ViewportCapturer: Send {
    fn capture_visible(&mut self) -> Result<Vec<u8>>;
}

impl<F> ViewportCapturer for F
where
    F: FnMut() -> Result<Vec<u8>> + Send,
{
    fn capture_visible(&mut self) -> Result<Vec<u8>> {
        (self)()
    }
}

enum Command {
    Request(AgentRequest, oneshot::Sender<CaptureResponse>),
    Shutdown(oneshot::Sender<()>),
}

/// Spawns and owns the agent worker.
pub struct CaptureAgent;

impl CaptureAgent {
    /// Start a worker thread around `capturer` and return a handle to it.
    pub fn spawn<C>(capturer: C) -> AgentHandle
    where
        C: ViewportCapturer + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();

        thread::spawn(move || {
            let mut capturer = capturer;
            let mut served = 0u64;

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::Request(AgentRequest::CaptureTab, resp) => {
                        served += 1;
                        let res = capturer.capture_visible();
                        if let Err(e) = &res {
                            warn!("Viewport capture #{} failed: {}", served, e);
                        }
                        // The requester may have given up; nothing to do then.
                        let _ = resp.send(CaptureResponse::from_result(res));
                    }
                    Command::Shutdown(resp) => {
                        let _ = resp.send(());
                        break;
                    }
                }
            }
            debug!("Capture agent stopped after {} requests", served);
        });

        AgentHandle { cmd_tx }
    }
}

/// Async handle used by the tiling driver to reach the agent.
#[derive(Clone)]
pub struct AgentHandle {
    cmd_tx: Sender<Command>,
}

impl AgentHandle {
    /// Ask the agent for one capture of the current viewport.
    pub async fn request(&self, req: AgentRequest) -> Result<CaptureResponse> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Request(req, tx))
            .map_err(|_| Error::AgentUnavailable("worker has shut down".into()))?;
        rx.await
            .map_err(|e| Error::AgentUnavailable(format!("capture canceled: {}", e)))
    }

    /// Capture the visible viewport, mapping a refusal to `Error::CaptureFailed`.
    pub async fn capture(&self) -> Result<Vec<u8>> {
        self.request(AgentRequest::CaptureTab).await?.into_result()
    }

    /// Stop the worker thread. Outstanding clones will see `AgentUnavailable`.
    pub async fn shutdown(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Shutdown(tx));
        rx.await
            .map_err(|e| Error::AgentUnavailable(format!("shutdown canceled: {}", e)))
    }
}
