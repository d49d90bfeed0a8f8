//! Message vocabulary exchanged between the control surface, the tiling
//! driver and the capture agent.
//!
//! In-process the types travel over channels as-is. The JSON form (tagged by
//! `action`) is what crosses a process or extension boundary; image bytes are
//! carried as base64 `data:` URLs there.

use crate::{CaptureOptions, Error, Result};
use base64::Engine as Base64Engine;
use serde::{Deserialize, Serialize};

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Control surface -> driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ControlMessage {
    StartCapture {
        #[serde(default)]
        options: CaptureOptions,
    },
}

/// Driver -> agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum AgentRequest {
    CaptureTab,
}

/// Agent -> driver: one tile's image, or why there is none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureResponse {
    Success(Vec<u8>),
    Failure(String),
}

impl CaptureResponse {
    pub fn from_result(res: Result<Vec<u8>>) -> Self {
        match res {
            Ok(bytes) => CaptureResponse::Success(bytes),
            Err(e) => CaptureResponse::Failure(e.to_string()),
        }
    }

    pub fn into_result(self) -> Result<Vec<u8>> {
        match self {
            CaptureResponse::Success(bytes) => Ok(bytes),
            CaptureResponse::Failure(reason) => Err(Error::CaptureFailed(reason)),
        }
    }

    /// Wire form: `{"dataUrl": "..."}` or `{"error": "..."}`.
    pub fn to_json(&self) -> Result<String> {
        let wire = match self {
            CaptureResponse::Success(bytes) => WireCaptureResponse {
                data_url: Some(encode_data_url(bytes)),
                error: None,
            },
            CaptureResponse::Failure(reason) => WireCaptureResponse {
                data_url: None,
                error: Some(reason.clone()),
            },
        };
        Ok(serde_json::to_string(&wire)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let wire: WireCaptureResponse = serde_json::from_str(s)?;
        match (wire.error, wire.data_url) {
            (Some(reason), _) => Ok(CaptureResponse::Failure(reason)),
            (None, Some(url)) => Ok(CaptureResponse::Success(decode_data_url(&url)?)),
            (None, None) => Err(Error::Other("capture response carries neither dataUrl nor error".into())),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCaptureResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    data_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Driver -> control surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum DriverEvent {
    #[serde(rename = "captureStatus")]
    Status { status: String, progress: u8 },
    /// Bare progress bump without narration
    UpdateProgress { progress: u8 },
    #[serde(rename = "captureComplete")]
    Complete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        artifact: Option<String>,
    },
    #[serde(rename = "captureError")]
    Error { error: String },
}

impl DriverEvent {
    pub fn status(status: impl Into<String>, progress: u8) -> Self {
        DriverEvent::Status { status: status.into(), progress: progress.min(100) }
    }

    /// Progress carried by this event, if any.
    pub fn progress(&self) -> Option<u8> {
        match self {
            DriverEvent::Status { progress, .. } | DriverEvent::UpdateProgress { progress } => Some(*progress),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Encode PNG bytes as a `data:` URL.
pub fn encode_data_url(bytes: &[u8]) -> String {
    let b64 = Base64Engine::encode(&base64::engine::general_purpose::STANDARD, bytes);
    format!("{}{}", PNG_DATA_URL_PREFIX, b64)
}

/// Decode a base64 `data:` URL of any image MIME type.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>> {
    let payload = url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
        .map(|(_, b64)| b64)
        .ok_or_else(|| Error::Other("not a base64 data URL".into()))?;
    Base64Engine::decode(&base64::engine::general_purpose::STANDARD, payload)
        .map_err(|e| Error::Other(format!("invalid base64 in data URL: {}", e)))
}
