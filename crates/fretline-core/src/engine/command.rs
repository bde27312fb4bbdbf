//! Lock-free command queue into the audio thread
//!
//! Anything that would need a lock or an allocation on the audio thread
//! (swapping the song, swapping a freshly built stretcher) is pushed through a
//! wait-free `rtrb` SPSC queue and applied at the start of the next
//! [`read_frame`](super::PlaybackEngine::read_frame). Single-word settings
//! (seek, tempo, pitch, pause) bypass the queue and live in
//! [`PlaybackControls`](super::PlaybackControls).

use basedrop::{Owned, Shared};

use crate::song::DecodedSong;
use crate::timestretch::TimeStretcher;

/// Queue capacity; commands are rare (song loads, device changes)
pub const COMMAND_QUEUE_CAPACITY: usize = 16;

/// Commands sent from control threads to the audio thread
///
/// Payloads are pointer-sized and their drop is deferred to the collector
/// thread, so replacing them on the audio thread never frees memory there.
pub enum EngineCommand {
    /// Start playing a (possibly still decoding) song from the beginning
    LoadSong { song: Shared<DecodedSong> },
    /// Drop the current song and return to silence
    UnloadSong,
    /// Switch output rate with a stretcher already built for it
    Configure {
        sample_rate: u32,
        stretcher: Owned<TimeStretcher>,
    },
}

impl std::fmt::Debug for EngineCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineCommand::LoadSong { song } => f
                .debug_struct("LoadSong")
                .field("total_samples", &song.total_samples())
                .finish(),
            EngineCommand::UnloadSong => write!(f, "UnloadSong"),
            EngineCommand::Configure { sample_rate, .. } => f
                .debug_struct("Configure")
                .field("sample_rate", sample_rate)
                .finish(),
        }
    }
}

/// Create the command channel
///
/// The producer stays with the control side, the consumer is owned by the
/// engine on the audio thread.
pub fn command_channel() -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::gc_handle;

    #[test]
    fn test_command_channel_roundtrip() {
        let (mut tx, mut rx) = command_channel();
        let song = Shared::new(&gc_handle(), DecodedSong::from_channels(&[0.0; 4], &[0.0; 4], 48000));

        tx.push(EngineCommand::LoadSong { song }).unwrap();
        tx.push(EngineCommand::UnloadSong).unwrap();

        assert!(matches!(rx.pop(), Ok(EngineCommand::LoadSong { .. })));
        assert!(matches!(rx.pop(), Ok(EngineCommand::UnloadSong)));
        assert!(rx.pop().is_err());
    }

    #[test]
    fn test_command_channel_reports_full() {
        let (mut tx, _rx) = command_channel();
        for _ in 0..COMMAND_QUEUE_CAPACITY {
            tx.push(EngineCommand::UnloadSong).unwrap();
        }
        assert!(tx.push(EngineCommand::UnloadSong).is_err());
    }
}
