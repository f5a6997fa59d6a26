//! # Audio Stage
//!
//! Pops captured loopback-audio packets (Opus-encoded, out-of-scope
//! collaborator) and forwards them to the transport's best-effort audio
//! path (SPEC_FULL §4.5.4, §4.8). Runs on its own high-priority worker
//! thread per the Supervisor's three-thread model.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::transport::PeerTransport;

/// One captured and already Opus-encoded audio packet.
pub struct AudioPacket {
    pub capture_ts_us: i64,
    pub samples: u16,
    pub payload: Vec<u8>,
}

/// Bounded producer/consumer queue between the out-of-scope audio capture
/// collaborator and this stage.
pub fn audio_channel(capacity: usize) -> (AudioSender, AudioReceiver) {
    let (tx, rx) = std::sync::mpsc::sync_channel(capacity);
    (AudioSender { tx }, AudioReceiver { rx })
}

#[derive(Clone)]
pub struct AudioSender {
    tx: std::sync::mpsc::SyncSender<AudioPacket>,
}

impl AudioSender {
    /// Non-blocking: an audio capture collaborator that can't enqueue
    /// because the stage is behind simply drops the packet, matching the
    /// "audio is best-effort" design note.
    pub fn try_send(&self, packet: AudioPacket) {
        let _ = self.tx.try_send(packet);
    }
}

pub struct AudioReceiver {
    rx: Receiver<AudioPacket>,
}

pub struct AudioStage {
    receiver: AudioReceiver,
}

impl AudioStage {
    pub fn new(receiver: AudioReceiver) -> Self {
        Self { receiver }
    }

    /// Pops one packet (blocking up to `timeout`) and forwards it. Returns
    /// `false` on timeout so the worker loop can re-check shutdown state.
    pub fn pump(&self, transport: &PeerTransport, timeout: Duration) -> bool {
        match self.receiver.rx.recv_timeout(timeout) {
            Ok(packet) => {
                transport.send_audio(packet.capture_ts_us, packet.samples, &packet.payload);
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_send_does_not_block_when_full() {
        let (tx, _rx) = audio_channel(1);
        tx.try_send(AudioPacket {
            capture_ts_us: 0,
            samples: 480,
            payload: vec![0; 16],
        });
        // Second send with capacity exhausted must not panic or block.
        tx.try_send(AudioPacket {
            capture_ts_us: 1,
            samples: 480,
            payload: vec![0; 16],
        });
    }
}
