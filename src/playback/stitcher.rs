//! Realtime EDL stitching source
//!
//! [`EdlStitcher::fill`] is the audio producer: called from the device
//! callback with an interleaved output buffer, it walks the current timeline
//! snapshot, reads the transport at each segment's original-audio offset,
//! and advances the edited playhead by the segment's edited/original
//! duration ratio. Segment boundaries are crossed inside a single callback
//! when needed; edited-time gaps between segments are skipped.
//!
//! Invariants on this path: no locks, no allocation, no I/O. The snapshot
//! comes from an `ArcSwap` load, the source PCM is in memory.

use std::sync::Arc;

use crate::edl::model::{Segment, TimelineSnapshot};
use crate::playback::shared::EngineShared;

/// Segment-end tolerance in edited seconds
const BOUNDARY_TOLERANCE_SEC: f64 = 0.001;

/// Clamp for the edited/original advance ratio; keeps pathological
/// timelines from overshooting the playhead
const RATIO_MIN: f64 = 0.01;
const RATIO_MAX: f64 = 100.0;

/// Boundary hops allowed within one callback before bailing out
const MAX_BOUNDARY_HOPS: u32 = 10;

/// Realtime audio producer over the shared engine state.
///
/// The cached segment index makes the common case (same segment as last
/// callback) O(1); seeks, EDL swaps, and boundary crossings fall back to a
/// linear rescan.
pub struct EdlStitcher {
    shared: Arc<EngineShared>,
    cached_revision: i64,
    cached_index: usize,
}

impl EdlStitcher {
    pub fn new(shared: Arc<EngineShared>) -> Self {
        Self { shared, cached_revision: -1, cached_index: 0 }
    }

    /// Fill `out` (interleaved, `channels` per frame) with the next block of
    /// stitched audio. Zero-fills when idle, unloaded, or past the final
    /// segment.
    pub fn fill(&mut self, out: &mut [f32], channels: usize) {
        out.fill(0.0);
        if channels == 0 || !self.shared.playing() {
            return;
        }

        let snapshot = self.shared.snapshot();
        let audio = self.shared.transport.audio_guard();
        let Some(buffer) = audio.as_ref() else { return };
        if snapshot.is_empty() {
            return;
        }

        let sr = buffer.sample_rate() as f64;
        if sr < 1.0 {
            return;
        }

        let total_frames = out.len() / channels;
        let mut frames_done = 0usize;
        let mut edited = self.shared.edited_sec();
        let mut hops = 0u32;

        while frames_done < total_frames {
            let Some(idx) = self.locate(&snapshot, edited) else {
                // Past the final segment: silence out the rest, report once
                self.shared.flag_ended();
                break;
            };
            let seg = &snapshot.segments[idx];
            if edited < seg.edited_start {
                // Edited-time gap before this segment: skip it
                edited = seg.edited_start;
            }

            let odur = seg.original_duration();
            let edur = seg.edited_duration();

            // Source position for the current edited offset
            let frac = ((edited - seg.edited_start) / edur).clamp(0.0, 1.0);
            let original_sec = seg.original_start + frac * odur;
            let original_frame = original_sec * sr;

            let rate = self.shared.transport.rate() as f64;
            let source_frames_left = (seg.original_end * sr - original_frame).max(0.0);
            let out_frames_left = (source_frames_left / rate).ceil() as usize;

            let chunk = (total_frames - frames_done).min(out_frames_left);
            if chunk > 0 {
                let consumed = self.render_chunk(
                    buffer,
                    original_frame,
                    &mut out[frames_done * channels..(frames_done + chunk) * channels],
                    channels,
                );
                frames_done += chunk;

                let ratio = (edur / odur).clamp(RATIO_MIN, RATIO_MAX);
                edited += (consumed / sr) * ratio;
                self.shared.transport.set_position_frames(original_frame + consumed);
            }

            // Boundary: within tolerance of the segment's edited end
            if edited >= seg.edited_end - BOUNDARY_TOLERANCE_SEC {
                hops += 1;
                if hops > MAX_BOUNDARY_HOPS {
                    break;
                }
                if idx + 1 < snapshot.segments.len() {
                    let next = &snapshot.segments[idx + 1];
                    edited = next.edited_start;
                    self.shared.transport.set_position_frames(next.original_start * sr);
                    self.cached_index = idx + 1;
                } else {
                    self.shared.flag_ended();
                    break;
                }
            } else if chunk == 0 {
                // No frames producible and not at a boundary: bail rather
                // than spin
                break;
            }
        }

        self.shared.set_edited_sec(edited);
    }

    /// Read one chunk through the transport. Split out so the borrow of the
    /// output slice stays local.
    fn render_chunk(
        &self,
        buffer: &crate::audio::source::SourceBuffer,
        start_frame: f64,
        out: &mut [f32],
        channels: usize,
    ) -> f64 {
        debug_assert!(channels >= 1);
        if channels == 2 {
            return self.shared.transport.read_into(buffer, start_frame, out);
        }

        // Non-stereo devices: render per frame, mapping the stereo pair onto
        // however many channels the device has.
        let rate = self.shared.transport.rate() as f64;
        let gain = self.shared.transport.gain();
        let frames = out.len() / channels;
        let mut pos = start_frame;
        for i in 0..frames {
            let (l, r) = buffer.frame_lerp(pos);
            let (l, r) = (l * gain, r * gain);
            let base = i * channels;
            if channels == 1 {
                out[base] = (l + r) * 0.5;
            } else {
                out[base] = l;
                out[base + 1] = r;
            }
            pos += rate;
        }
        pos - start_frame
    }

    /// Locate the segment for an edited position: cached index first, then a
    /// linear scan. Returns the containing segment, or the next segment when
    /// `edited` falls in a gap, or None past the end.
    fn locate(&mut self, snapshot: &TimelineSnapshot, edited: f64) -> Option<usize> {
        let segments = &snapshot.segments;

        if snapshot.revision == self.cached_revision {
            if let Some(seg) = segments.get(self.cached_index) {
                if contains_edited(seg, edited) {
                    return Some(self.cached_index);
                }
            }
        } else {
            self.cached_revision = snapshot.revision;
            self.cached_index = 0;
        }

        let found = segments
            .iter()
            .position(|s| contains_edited(s, edited) || edited < s.edited_start);
        if let Some(idx) = found {
            self.cached_index = idx;
        }
        found
    }
}

#[inline]
fn contains_edited(seg: &Segment, edited: f64) -> bool {
    edited >= seg.edited_start && edited < seg.edited_end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::SourceBuffer;
    use crate::edl::model::{SegmentKind, TimelineMode};
    use std::sync::Arc;

    const SR: u32 = 1000; // small rate keeps fixtures readable

    fn seg(es: f64, ee: f64, os: f64, oe: f64) -> Segment {
        Segment {
            kind: SegmentKind::Word,
            edited_start: es,
            edited_end: ee,
            original_start: os,
            original_end: oe,
            text: String::new(),
            explicit_original: true,
        }
    }

    fn snapshot(revision: i64, segments: Vec<Segment>) -> TimelineSnapshot {
        let total = segments.iter().map(|s| s.edited_duration()).sum();
        TimelineSnapshot { revision, segments, mode: TimelineMode::Standard, total_edited_duration: total }
    }

    /// Source whose left-channel value equals its frame index, so output
    /// samples identify exactly which source frames were read.
    fn ramp_engine(frames: usize) -> (Arc<EngineShared>, EdlStitcher) {
        let samples: Vec<f32> = (0..frames).flat_map(|i| [i as f32, i as f32]).collect();
        let shared = EngineShared::new();
        shared.transport.install(Arc::new(SourceBuffer::from_stereo_samples(samples, SR)));
        let stitcher = EdlStitcher::new(Arc::clone(&shared));
        (shared, stitcher)
    }

    #[test]
    fn silent_when_not_playing() {
        let (_shared, mut stitcher) = ramp_engine(100);
        let mut out = vec![7.0f32; 8];
        stitcher.fill(&mut out, 2);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn silent_when_timeline_empty() {
        let (shared, mut stitcher) = ramp_engine(100);
        shared.set_playing(true);
        let mut out = vec![7.0f32; 8];
        stitcher.fill(&mut out, 2);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn identity_timeline_reads_sequentially() {
        let (shared, mut stitcher) = ramp_engine(1000);
        shared.install_snapshot(snapshot(1, vec![seg(0.0, 1.0, 0.0, 1.0)]));
        shared.set_playing(true);

        let mut out = vec![0.0f32; 20];
        stitcher.fill(&mut out, 2);

        // frames 0..10 of the ramp
        for i in 0..10 {
            assert_eq!(out[i * 2], i as f32);
        }
        assert!((shared.edited_sec() - 0.01).abs() < 1e-9);
        assert_eq!(shared.transport.position_frames(), 10.0);
    }

    #[test]
    fn reordered_segments_stitch_across_boundary() {
        // Edited [0,0.01) <- original [0.5,0.51), edited [0.01,0.02) <- original [0.1,0.11)
        let (shared, mut stitcher) = ramp_engine(1000);
        shared.install_snapshot(snapshot(
            1,
            vec![seg(0.0, 0.01, 0.5, 0.51), seg(0.01, 0.02, 0.1, 0.11)],
        ));
        shared.set_playing(true);

        // 20 output frames = both segments exactly
        let mut out = vec![0.0f32; 40];
        stitcher.fill(&mut out, 2);

        // First 10 frames from original frame 500.., next 10 from 100..
        assert_eq!(out[0], 500.0);
        assert_eq!(out[18], 509.0);
        assert_eq!(out[20], 100.0);
        assert_eq!(out[38], 109.0);
    }

    #[test]
    fn gap_stretched_segment_advances_edited_at_ratio() {
        // Edited [0, 0.2) maps to original [0, 0.1): ratio 2x
        let (shared, mut stitcher) = ramp_engine(1000);
        shared.install_snapshot(snapshot(1, vec![seg(0.0, 0.2, 0.0, 0.1)]));
        shared.set_playing(true);

        // Read 0.05s of source audio (50 frames)
        let mut out = vec![0.0f32; 100];
        stitcher.fill(&mut out, 2);

        // Edited advanced 2x the source time
        assert!((shared.edited_sec() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn ended_flagged_after_final_segment() {
        let (shared, mut stitcher) = ramp_engine(1000);
        shared.install_snapshot(snapshot(1, vec![seg(0.0, 0.01, 0.0, 0.01)]));
        shared.set_playing(true);

        let mut out = vec![0.0f32; 60];
        stitcher.fill(&mut out, 2);

        assert!(shared.take_ended());
        // Remainder past the segment is silence
        assert_eq!(out[25], 0.0);
        assert_eq!(out[59], 0.0);
    }

    #[test]
    fn edited_gap_is_skipped_not_rendered() {
        // Segments at edited [0,0.01) and [0.05,0.08); the gap produces no audio
        let (shared, mut stitcher) = ramp_engine(1000);
        shared.install_snapshot(snapshot(
            1,
            vec![seg(0.0, 0.01, 0.0, 0.01), seg(0.05, 0.08, 0.2, 0.23)],
        ));
        shared.set_playing(true);

        let mut out = vec![0.0f32; 40];
        stitcher.fill(&mut out, 2);

        // 10 frames from segment one, then straight into original frame 200
        assert_eq!(out[0], 0.0);
        assert_eq!(out[20], 200.0);
        assert!(!shared.take_ended());
    }

    #[test]
    fn snapshot_swap_is_picked_up_mid_stream() {
        let (shared, mut stitcher) = ramp_engine(1000);
        shared.install_snapshot(snapshot(1, vec![seg(0.0, 1.0, 0.0, 1.0)]));
        shared.set_playing(true);

        let mut out = vec![0.0f32; 20];
        stitcher.fill(&mut out, 2);

        // Swap to a timeline that reads from original 0.5s instead
        shared.install_snapshot(snapshot(2, vec![seg(0.0, 1.0, 0.5, 1.0)]));
        shared.set_edited_sec(0.0);

        stitcher.fill(&mut out, 2);
        assert_eq!(out[0], 500.0);
    }

    #[test]
    fn mono_device_gets_downmix() {
        let (shared, mut stitcher) = ramp_engine(100);
        shared.install_snapshot(snapshot(1, vec![seg(0.0, 0.1, 0.0, 0.1)]));
        shared.set_playing(true);

        let mut out = vec![0.0f32; 10];
        stitcher.fill(&mut out, 1);
        // Ramp has identical channels, so the downmix equals the ramp
        assert_eq!(out[3], 3.0);
    }
}
