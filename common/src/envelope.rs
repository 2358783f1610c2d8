//! `{payload: ...}` wrapper used on ingress and on outbound forwards
//!
//! The payload is either plain JSON or a Fernet token, depending on whether a
//! key was configured. A payload may carry a single signal or an array.

use crate::signal::Signal;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub payload: String,
}

#[derive(Clone)]
pub enum EnvelopeCodec {
    Plain,
    Fernet(Arc<fernet::Fernet>),
}

impl fmt::Debug for EnvelopeCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeCodec::Plain => write!(f, "EnvelopeCodec::Plain"),
            EnvelopeCodec::Fernet(_) => write!(f, "EnvelopeCodec::Fernet(<redacted>)"),
        }
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        EnvelopeCodec::Plain
    }
}

impl EnvelopeCodec {
    /// Build from an optional url-safe base64 Fernet key
    pub fn from_key(key: Option<&str>) -> Result<Self> {
        match key.map(str::trim).filter(|k| !k.is_empty()) {
            None => Ok(EnvelopeCodec::Plain),
            Some(key) => {
                let fernet = fernet::Fernet::new(key)
                    .ok_or_else(|| anyhow!("envelope key is not a valid Fernet key"))?;
                Ok(EnvelopeCodec::Fernet(Arc::new(fernet)))
            }
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, EnvelopeCodec::Fernet(_))
    }

    pub fn seal(&self, signal: &Signal) -> Result<Envelope> {
        let json = serde_json::to_string(signal).context("Failed to serialize signal")?;
        let payload = match self {
            EnvelopeCodec::Plain => json,
            EnvelopeCodec::Fernet(fernet) => fernet.encrypt(json.as_bytes()),
        };
        Ok(Envelope { payload })
    }

    /// Recover the signals carried by an envelope
    pub fn open(&self, envelope: &Envelope) -> Result<Vec<Signal>> {
        let plain = match self {
            EnvelopeCodec::Plain => envelope.payload.clone().into_bytes(),
            EnvelopeCodec::Fernet(fernet) => fernet
                .decrypt(&envelope.payload)
                .map_err(|_| anyhow!("envelope payload could not be decrypted"))?,
        };
        let value: Value = serde_json::from_slice(&plain).context("Envelope payload is not JSON")?;
        signals_from_value(value)
    }

    /// Decode a raw ingress message: either an envelope or bare signal JSON.
    /// Every decoded signal has passed [`Signal::validate`].
    pub fn decode(&self, raw: &[u8]) -> Result<Vec<Signal>> {
        let value: Value = serde_json::from_slice(raw).context("Ingress message is not JSON")?;
        let is_envelope = value
            .as_object()
            .map_or(false, |map| map.contains_key("payload"));
        if is_envelope {
            let envelope: Envelope = serde_json::from_value(value).context("Malformed envelope")?;
            self.open(&envelope)
        } else {
            signals_from_value(value)
        }
    }
}

/// A single object must be a valid signal. Array elements are admitted one by
/// one; elements that fail to parse or validate are logged and skipped.
fn signals_from_value(value: Value) -> Result<Vec<Signal>> {
    match value {
        Value::Array(items) => {
            let mut signals = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                match signal_from_value(item) {
                    Ok(signal) => signals.push(signal),
                    Err(e) => warn!("Skipping signal {} of batch: {:#}", index, e),
                }
            }
            Ok(signals)
        }
        other => Ok(vec![signal_from_value(other)?]),
    }
}

fn signal_from_value(value: Value) -> Result<Signal> {
    let signal: Signal = serde_json::from_value(value).context("Malformed signal")?;
    signal.validate()?;
    Ok(signal)
}
