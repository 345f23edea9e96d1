//! State shared between the command, reporter, and audio-callback threads
//!
//! The timeline snapshot is published through an `ArcSwap`: writers install
//! a fully built snapshot under release ordering, the audio callback loads
//! it under acquire and sees either the old or the new value in full, never
//! a torn state. The edited playhead is an f64 carried in an `AtomicU64` so
//! the callback can advance it without locking.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};

use crate::edl::model::TimelineSnapshot;
use crate::playback::transport::Transport;

/// Engine state visible to every thread
pub struct EngineShared {
    /// Current timeline snapshot (immutable value, atomically replaced)
    snapshot: ArcSwap<TimelineSnapshot>,
    /// Original-time playhead, gain, rate, source buffer
    pub transport: Transport,
    /// Transport running flag; written by the command thread only
    playing: AtomicBool,
    /// Edited playhead in seconds, f64 bits; written by the audio callback
    /// and on seek/stop/EDL swap
    edited_bits: AtomicU64,
    /// Set by the audio callback when it runs out of segments; consumed by
    /// the reporter tick
    ended_pending: AtomicBool,
    /// Cleared on shutdown to stop the reporter and command loops
    running: AtomicBool,
}

impl EngineShared {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            snapshot: ArcSwap::from_pointee(TimelineSnapshot::empty()),
            transport: Transport::new(),
            playing: AtomicBool::new(false),
            edited_bits: AtomicU64::new(0f64.to_bits()),
            ended_pending: AtomicBool::new(false),
            running: AtomicBool::new(true),
        })
    }

    /// Lock-free snapshot load for the audio callback
    pub fn snapshot(&self) -> Guard<Arc<TimelineSnapshot>> {
        self.snapshot.load()
    }

    /// Full-ownership snapshot load for command/reporter paths
    pub fn snapshot_full(&self) -> Arc<TimelineSnapshot> {
        self.snapshot.load_full()
    }

    /// Atomically publish a new snapshot
    pub fn install_snapshot(&self, snapshot: TimelineSnapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }

    pub fn playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    /// Edited playhead in seconds
    pub fn edited_sec(&self) -> f64 {
        f64::from_bits(self.edited_bits.load(Ordering::Acquire))
    }

    pub fn set_edited_sec(&self, edited_sec: f64) {
        self.edited_bits.store(edited_sec.max(0.0).to_bits(), Ordering::Release);
    }

    /// Flag end-of-timeline from the audio callback
    pub fn flag_ended(&self) {
        self.ended_pending.store(true, Ordering::Release);
    }

    /// Consume a pending end-of-timeline flag
    pub fn take_ended(&self) -> bool {
        self.ended_pending.swap(false, Ordering::AcqRel)
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
    }
}
