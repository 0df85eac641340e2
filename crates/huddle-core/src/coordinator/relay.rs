//! Point-to-point signaling relay.

use super::Coordinator;
use huddle_protocol::{ConnectionId, Relayed, ServerEvent, Signal};
use std::sync::Arc;
use tracing::{debug, trace};

/// Kind of negotiation message being relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    fn wrap(self, relayed: Relayed) -> ServerEvent {
        match self {
            SignalKind::Offer => ServerEvent::Offer(relayed),
            SignalKind::Answer => ServerEvent::Answer(relayed),
            SignalKind::IceCandidate => ServerEvent::IceCandidate(relayed),
        }
    }
}

impl Coordinator {
    /// Forward a negotiation payload to its target, stamped with the sender.
    ///
    /// The payload is not inspected and room membership is not checked; the
    /// target only has to be connected. Returns `false` if the target is
    /// unknown, in which case the payload is dropped.
    pub fn relay(&self, kind: SignalKind, from: &ConnectionId, signal: Signal) -> bool {
        let Signal { payload, to } = signal;
        let event = kind.wrap(Relayed {
            payload,
            from: from.clone(),
        });

        let delivered = self.registry.send(&to, Arc::new(event));
        if delivered {
            trace!(from = %from, to = %to, kind = ?kind, "Relayed signal");
        } else {
            debug!(from = %from, to = %to, kind = ?kind, "Signal target not connected");
        }
        delivered
    }
}
