//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Downstream emit boundary for wire envelopes."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use tokio::sync::broadcast;
use tracing::debug;

use crate::options::EmitOptions;
use crate::record::{WireEnvelope, WireRecord};
use crate::WireError;

/// Default capacity of the downstream broadcast channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Emits envelopes on behalf of one component to any number of receivers.
#[derive(Debug, Clone)]
pub struct WireSupport {
    emitter_pid: String,
    sender: broadcast::Sender<WireEnvelope>,
}

impl WireSupport {
    /// Create the boundary with the given broadcast capacity.
    pub fn new(emitter_pid: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            emitter_pid: emitter_pid.into(),
            sender,
        }
    }

    /// Identity stamped onto every envelope.
    pub fn emitter_pid(&self) -> &str {
        &self.emitter_pid
    }

    /// Attach a new downstream receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<WireEnvelope> {
        self.sender.subscribe()
    }

    /// Publish one record.
    ///
    /// An empty record is rejected unless the options allow empty envelopes.
    /// Returns the number of receivers that got the envelope.
    pub fn emit(&self, record: WireRecord, options: &EmitOptions) -> Result<usize, WireError> {
        if record.is_empty() && !options.emit_empty_envelopes {
            return Err(WireError::EmptyRecord);
        }
        let envelope = WireEnvelope::new(self.emitter_pid.clone(), vec![record]);
        match self.sender.send(envelope) {
            Ok(receivers) => Ok(receivers),
            Err(_) => {
                debug!(emitter = %self.emitter_pid, "no downstream receivers attached");
                Ok(0)
            }
        }
    }
}
