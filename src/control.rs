//! Control surface model: what a status panel shows while a session runs.
//!
//! The surface only ever sees [`DriverEvent`]s; it never touches the page or
//! the agent. Rendering is left to the embedder ([`ControlSurface::line`] is
//! the plain-text form the CLI prints).

use crate::message::{ControlMessage, DriverEvent};
use crate::CaptureOptions;
use std::fmt;

/// Tone of the current status text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Success,
    Error,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusKind::Info => write!(f, "info"),
            StatusKind::Success => write!(f, "success"),
            StatusKind::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlSurface {
    pub status: String,
    pub kind: StatusKind,
    pub progress: u8,
    /// A session was requested and has not reported completion or failure
    pub busy: bool,
    /// Progress bar visible
    pub show_progress: bool,
}

impl Default for ControlSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlSurface {
    pub fn new() -> Self {
        Self {
            status: "Ready to capture".to_string(),
            kind: StatusKind::Info,
            progress: 0,
            busy: false,
            show_progress: false,
        }
    }

    /// Put the surface into its busy state and build the start command.
    pub fn begin(&mut self, options: CaptureOptions) -> ControlMessage {
        self.busy = true;
        self.show_progress = true;
        self.progress = 0;
        self.set_status("Initializing capture...", StatusKind::Info);
        ControlMessage::StartCapture { options }
    }

    /// Starting failed before the driver got the command.
    pub fn start_failed(&mut self, reason: &str) {
        self.set_status(&format!("Error: {}", reason), StatusKind::Error);
        self.busy = false;
        self.show_progress = false;
    }

    /// Fold one driver event into the view state.
    pub fn apply(&mut self, event: &DriverEvent) {
        match event {
            DriverEvent::Status { status, progress } => {
                self.set_status(status, StatusKind::Info);
                self.progress = *progress;
            }
            DriverEvent::UpdateProgress { progress } => {
                self.progress = *progress;
                self.set_status(&format!("Capturing... {}%", progress), StatusKind::Info);
            }
            DriverEvent::Complete { .. } => {
                self.set_status("Screenshot captured successfully!", StatusKind::Success);
                self.busy = false;
                self.show_progress = false;
                self.progress = 100;
            }
            DriverEvent::Error { error } => {
                self.set_status(&format!("Error: {}", error), StatusKind::Error);
                self.busy = false;
                self.show_progress = false;
            }
        }
    }

    /// Whether this event ends the session from the surface's point of view.
    pub fn is_terminal(event: &DriverEvent) -> bool {
        matches!(event, DriverEvent::Complete { .. } | DriverEvent::Error { .. })
    }

    /// Label for the start button
    pub fn button_label(&self) -> &'static str {
        if self.busy {
            "Capturing..."
        } else {
            "Capture Full Page"
        }
    }

    /// One-line textual rendering, e.g. `[info]  45% Captured section 4 of 8`
    pub fn line(&self) -> String {
        if self.show_progress {
            format!("[{}] {:>3}% {}", self.kind, self.progress, self.status)
        } else {
            format!("[{}] {}", self.kind, self.status)
        }
    }

    fn set_status(&mut self, text: &str, kind: StatusKind) {
        self.status = text.to_string();
        self.kind = kind;
    }
}
