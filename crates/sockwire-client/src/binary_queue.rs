use std::collections::VecDeque;

use bytes::Bytes;
use sockwire_frame::Packet;
use tracing::warn;

use crate::error::Result;

/// Binary packets waiting for their attachments.
#[derive(Debug, Default)]
pub(crate) struct BinaryQueue {
    waiting: VecDeque<Packet>,
}

impl BinaryQueue {
    pub(crate) fn push(&mut self, packet: Packet) {
        if !self.waiting.is_empty() {
            warn!(
                waiting = self.waiting.len(),
                "binary packet arrived while another is still incomplete"
            );
        }
        self.waiting.push_back(packet);
    }

    /// Hand `blob` to the most recent incomplete packet. Returns the packet
    /// once its last attachment arrives.
    pub(crate) fn attach(&mut self, blob: Bytes) -> Result<Option<Packet>> {
        let Some(index) = self.waiting.iter().rposition(|p| !p.is_complete()) else {
            warn!(len = blob.len(), "dropping binary frame with no packet waiting for it");
            return Ok(None);
        };
        let Some(packet) = self.waiting.get_mut(index) else {
            return Ok(None);
        };
        match packet.attach_binary(blob) {
            Ok(false) => Ok(None),
            Ok(true) => Ok(self.waiting.remove(index)),
            Err(err) => {
                // A packet whose placeholders cannot be filled never completes.
                self.waiting.remove(index);
                Err(err.into())
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.waiting.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.waiting.len()
    }
}
