//! Deferred deallocation for audio-thread resources
//!
//! A process-wide `basedrop` collector lives on its own thread. Songs and
//! stretchers are wrapped in `Shared<T>` / `Owned<T>` created from
//! [`gc_handle`]; when the audio thread drops one, the pointer is queued and
//! the memory is released later on the collector thread.
//!
//! ```ignore
//! use basedrop::Shared;
//! use fretline_core::engine::gc_handle;
//!
//! let song = Shared::new(&gc_handle(), DecodedSong::allocate(48000, 44100, 48000, 1.0));
//! ```

use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use basedrop::{Collector, Handle};

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// How often the collector thread frees queued allocations
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("fretline-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it has to be created on the thread that owns it
            let mut collector = Collector::new();
            if tx.send(collector.handle()).is_err() {
                return;
            }
            log::info!("Deferred-drop collector started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("failed to spawn the deferred-drop collector thread");

    rx.recv()
        .expect("deferred-drop collector exited before handing out its handle")
}

/// Handle for creating `Shared<T>` / `Owned<T>` allocations
///
/// The collector thread is started on first use.
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Shared;

    #[test]
    fn test_shared_drop_is_deferred() {
        let value = Shared::new(&gc_handle(), vec![0.0f32; 1024]);
        let clone = value.clone();
        drop(value);
        assert_eq!(clone.len(), 1024);
        drop(clone);
    }
}
