//! Playback controller: command handling, state machine, position reporting
//!
//! The controller owns the engine's control plane. Commands from stdin are
//! dispatched here one at a time with the controller lock held; the ~30 Hz
//! reporter tick takes the same lock to reconcile the transport position
//! against segment boundaries and publish `position` events. The audio
//! callback never touches this lock — it sees only the shared atomics and
//! the snapshot pointer.

use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::audio::decode;
use crate::audio::source::SourceBuffer;
use crate::edl::mapper;
use crate::edl::model::{TimelineMode, TimelineSnapshot};
use crate::error::Error;
use crate::events::{Event, EventEmitter};
use crate::playback::shared::EngineShared;
use crate::protocol::{Command, EdlPayload};

/// Reporter interval; ~30 Hz
pub const TICK_INTERVAL_MS: u64 = 33;

/// Boundary tolerance for the reconciliation loop, in original seconds
const BOUNDARY_EPSILON_SEC: f64 = 1e-6;

/// Boundary advances allowed per tick before declaring a stall
const MAX_BOUNDARY_ADVANCES: u32 = 10;

/// Fallback engine rate when the device/reader reports nothing usable
const FALLBACK_SAMPLE_RATE: u32 = 48_000;

/// Playback lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayState {
    Unloaded,
    Idle,
    Playing,
    Ended,
}

/// Control-plane state guarded by the controller lock
struct ControllerInner {
    state: PlayState,
    /// Media id echoed in every event
    media_id: String,
    /// Duration of the loaded file in seconds
    duration_sec: f64,
    /// Revision of the currently installed snapshot
    revision: i64,
}

/// The engine's control surface
pub struct Controller {
    shared: Arc<EngineShared>,
    emitter: Arc<EventEmitter>,
    /// Output device rate new source buffers are converted to
    engine_rate: u32,
    inner: Mutex<ControllerInner>,
}

impl Controller {
    pub fn new(shared: Arc<EngineShared>, emitter: Arc<EventEmitter>, engine_rate: u32) -> Self {
        let engine_rate = if engine_rate > 0 { engine_rate } else { FALLBACK_SAMPLE_RATE };
        Self {
            shared,
            emitter,
            engine_rate,
            inner: Mutex::new(ControllerInner {
                state: PlayState::Unloaded,
                media_id: String::new(),
                duration_sec: 0.0,
                revision: 0,
            }),
        }
    }

    pub fn shared(&self) -> &Arc<EngineShared> {
        &self.shared
    }

    /// Dispatch one protocol command. Failures become `error` events.
    pub fn handle_command(&self, command: Command) {
        let result = match command {
            Command::Load { id, path } => self.load(id, &path),
            Command::Play => self.play(),
            Command::Pause => self.pause(),
            Command::Stop => self.stop(),
            Command::Seek { time_sec } => self.seek(time_sec),
            Command::SetRate { rate } => {
                self.shared.transport.set_rate(rate);
                Ok(())
            }
            Command::SetVolume { value } => {
                self.shared.transport.set_gain(value);
                Ok(())
            }
            Command::QueryState => self.query_state(),
            Command::UpdateEdl(payload) => self.update_edl(&payload),
            Command::UpdateEdlFromFile { path } => self.update_edl_from_file(&path),
        };

        if let Err(e) = result {
            self.emitter.emit_error(e.to_string());
        }
    }

    /// Open a media file, install it, and reset to the identity timeline.
    fn load(&self, id: String, path: &str) -> crate::Result<()> {
        let mut inner = self.inner.lock().expect("controller poisoned");
        info!("load id={} path={}", id, path);

        let decoded = decode::decode_file(Path::new(path))?;

        // prepare() substitutes 48 kHz when the reader reports no rate;
        // the loaded event echoes what it settled on
        let buffer = Arc::new(SourceBuffer::prepare(decoded, self.engine_rate)?);
        let reported_rate = buffer.source_sample_rate();
        let reported_channels = buffer.source_channels();
        let duration = buffer.duration_sec();

        self.shared.transport.install(buffer);
        self.shared.install_snapshot(TimelineSnapshot::identity(inner.revision, duration));
        self.shared.set_edited_sec(0.0);
        self.shared.set_playing(false);
        self.shared.take_ended();

        inner.media_id = id;
        inner.duration_sec = duration;
        inner.state = PlayState::Idle;

        info!("loaded {:.3}s at {}Hz", duration, reported_rate);

        self.emitter.emit(&Event::Loaded {
            id: inner.media_id.clone(),
            duration_sec: duration,
            sample_rate: reported_rate,
            channels: reported_channels,
        });
        self.emit_state(&inner);
        Ok(())
    }

    fn play(&self) -> crate::Result<()> {
        let mut inner = self.inner.lock().expect("controller poisoned");
        if inner.state == PlayState::Unloaded {
            return Err(Error::NoAudio);
        }

        if inner.state == PlayState::Ended {
            // Ended -> Idle on play: rewind before starting
            self.rewind_to_edited(0.0);
        }

        inner.state = PlayState::Playing;
        self.shared.take_ended();
        self.shared.set_playing(true);
        self.emit_state(&inner);
        Ok(())
    }

    fn pause(&self) -> crate::Result<()> {
        let mut inner = self.inner.lock().expect("controller poisoned");
        if inner.state == PlayState::Unloaded {
            return Err(Error::NoAudio);
        }

        self.shared.set_playing(false);
        if inner.state == PlayState::Playing {
            inner.state = PlayState::Idle;
        }
        self.emit_state(&inner);
        Ok(())
    }

    fn stop(&self) -> crate::Result<()> {
        let mut inner = self.inner.lock().expect("controller poisoned");
        if inner.state == PlayState::Unloaded {
            return Err(Error::NoAudio);
        }

        self.shared.set_playing(false);
        self.shared.take_ended();
        self.shared.set_edited_sec(0.0);
        self.shared.transport.set_position_frames(0.0);
        inner.state = PlayState::Idle;

        self.emit_state(&inner);
        self.emit_position(&inner);
        Ok(())
    }

    fn seek(&self, edited_sec: f64) -> crate::Result<()> {
        let mut inner = self.inner.lock().expect("controller poisoned");
        if inner.state == PlayState::Unloaded {
            return Err(Error::NoAudio);
        }

        let target = if edited_sec.is_finite() { edited_sec.max(0.0) } else { 0.0 };
        self.rewind_to_edited(target);
        if inner.state == PlayState::Ended {
            inner.state = PlayState::Idle;
        }

        debug!("seek edited={} -> original={}", target, self.shared.transport.position_seconds());
        self.emit_position(&inner);
        Ok(())
    }

    fn query_state(&self) -> crate::Result<()> {
        let inner = self.inner.lock().expect("controller poisoned");
        self.emit_state(&inner);
        self.emit_position(&inner);
        Ok(())
    }

    /// Build and atomically install a new timeline snapshot.
    ///
    /// The transport's original-time playhead is preserved across the swap;
    /// the edited playhead is recomputed through the new mapping.
    fn update_edl(&self, payload: &EdlPayload) -> crate::Result<()> {
        let mut inner = self.inner.lock().expect("controller poisoned");

        if payload.clips.is_empty() {
            return Err(Error::EdlParse("empty clips array".into()));
        }

        let mut snapshot = TimelineSnapshot::from_payload(payload);
        if snapshot.is_empty() {
            return Err(Error::EdlInvalid);
        }

        // A contiguous cut without any supplied originals cannot be mapped
        // back into the source; play the whole file instead.
        if snapshot.mode == TimelineMode::Contiguous && !snapshot.has_explicit_originals() {
            warn!(
                revision = payload.revision,
                "contiguous EDL without originals, falling back to full-file timeline"
            );
            snapshot = TimelineSnapshot::identity(payload.revision, inner.duration_sec);
            snapshot.mode = TimelineMode::Standard;
            if snapshot.is_empty() {
                return Err(Error::EdlInvalid);
            }
        }

        let word_count = snapshot.word_count();
        let spacer_count = snapshot.spacer_count();
        let total_segments = snapshot.segments.len();
        let mode = snapshot.mode;

        // Preserve original position, remap the edited view
        let original_pos = self.shared.transport.position_seconds();
        let edited = mapper::original_to_edited(&snapshot, original_pos);

        inner.revision = snapshot.revision;
        self.shared.install_snapshot(snapshot);
        self.shared.set_edited_sec(edited);

        info!(
            revision = inner.revision,
            words = word_count,
            spacers = spacer_count,
            total = total_segments,
            mode = ?mode,
            "EDL applied"
        );

        self.emitter.emit(&Event::EdlApplied {
            id: inner.media_id.clone(),
            revision: inner.revision,
            word_count,
            spacer_count,
            total_segments,
            mode,
        });
        Ok(())
    }

    /// Read an EDL payload from a hand-off file, apply it, delete the file.
    fn update_edl_from_file(&self, path: &str) -> crate::Result<()> {
        if path.is_empty() {
            return Err(Error::MissingEdlPath);
        }

        let contents = std::fs::read_to_string(path).map_err(|_| Error::EdlFileUnreadable)?;
        let payload = crate::protocol::parse_edl_payload(&contents)?;

        self.update_edl(&payload)?;

        // The hand-off contract: the file belongs to us once parsed. A
        // failed delete is worth reporting but must not undo the EDL.
        if let Err(e) = std::fs::remove_file(path) {
            warn!("failed to delete EDL hand-off file {}: {}", path, e);
            self.emitter.emit_error(format!("Failed to delete EDL file: {}", path));
        }
        Ok(())
    }

    /// Reporter tick: reconcile the transport against segment boundaries,
    /// refresh the edited playhead, publish `position`.
    pub fn tick(&self) {
        let mut inner = self.inner.lock().expect("controller poisoned");

        // End-of-timeline raised by the audio callback
        if self.shared.take_ended() {
            self.end_playback(&mut inner);
            return;
        }

        if inner.state != PlayState::Playing || !self.shared.playing() {
            return;
        }

        let snapshot = self.shared.snapshot_full();
        if snapshot.is_empty() {
            if self.shared.transport.position_seconds() >= inner.duration_sec {
                self.end_playback(&mut inner);
            }
            return;
        }

        let mut pos = self.shared.transport.position_seconds();
        let mut advances = 0u32;

        loop {
            if advances >= MAX_BOUNDARY_ADVANCES {
                // Reconciliation is looping over degenerate boundaries;
                // terminate playback rather than spin forever
                warn!("boundary reconciliation stalled at original={}", pos);
                self.end_playback(&mut inner);
                return;
            }

            match mapper::segment_containing(&snapshot, pos) {
                None => {
                    // Outside every segment: jump forward or finish
                    match mapper::next_segment_after(&snapshot, pos) {
                        Some(next) => {
                            pos = snapshot.segments[next].original_start;
                            self.shared.transport.set_position_seconds(pos);
                            advances += 1;
                            debug!("reporter jump to segment {} original={}", next, pos);
                        }
                        None => {
                            self.end_playback(&mut inner);
                            return;
                        }
                    }
                }
                Some(idx) => {
                    let seg = &snapshot.segments[idx];
                    if pos >= seg.original_end - BOUNDARY_EPSILON_SEC {
                        if idx + 1 < snapshot.segments.len() {
                            pos = snapshot.segments[idx + 1].original_start;
                            self.shared.transport.set_position_seconds(pos);
                            advances += 1;
                        } else {
                            self.end_playback(&mut inner);
                            return;
                        }
                    } else {
                        break;
                    }
                }
            }
        }

        let edited = mapper::original_to_edited(&snapshot, pos);
        self.shared.set_edited_sec(edited);
        self.emit_position(&inner);
    }

    /// Fatal device failure after startup: stop everything, drop back to
    /// Unloaded, report.
    pub fn device_failed(&self) {
        let mut inner = self.inner.lock().expect("controller poisoned");
        self.shared.set_playing(false);
        self.shared.take_ended();
        inner.state = PlayState::Unloaded;
        warn!("audio device failed, engine unloaded");
        self.emitter.emit_error("Audio device error");
    }

    /// Transition to Ended: stop the transport, announce `ended`.
    fn end_playback(&self, inner: &mut ControllerInner) {
        self.shared.set_playing(false);
        self.shared.take_ended();
        inner.state = PlayState::Ended;
        info!("playback ended");
        self.emitter.emit(&Event::Ended { id: inner.media_id.clone() });
    }

    /// Position both playheads at an edited-timeline target.
    fn rewind_to_edited(&self, edited_sec: f64) {
        let snapshot = self.shared.snapshot_full();
        let original = mapper::edited_to_original(&snapshot, edited_sec);
        self.shared.transport.set_position_seconds(original);
        self.shared.set_edited_sec(edited_sec);
    }

    fn emit_state(&self, inner: &ControllerInner) {
        self.emitter.emit(&Event::State {
            id: inner.media_id.clone(),
            playing: inner.state == PlayState::Playing,
        });
    }

    /// `editedSec` is the shared playhead; `originalSec` is the transport's
    /// own original-time position (not a lossy round trip through the
    /// mapper).
    fn emit_position(&self, inner: &ControllerInner) {
        self.emitter.emit(&Event::Position {
            id: inner.media_id.clone(),
            edited_sec: self.shared.edited_sec(),
            original_sec: self.shared.transport.position_seconds(),
        });
    }
}
