//! Timeline snapshot model and EDL ingestion
//!
//! An EDL payload (clips of word/spacer segments) is flattened into an
//! immutable [`TimelineSnapshot`]: segments in edited-time order, each with a
//! resolved original-audio interval. Snapshots are replaced atomically; they
//! are never mutated after construction, which is what lets the audio
//! callback read them without locking.

use serde::Serialize;
use tracing::debug;

use crate::protocol::EdlPayload;

/// Minimum usable segment duration; anything shorter is dropped at ingestion
pub const MIN_DURATION_SEC: f64 = 1e-4;

/// Upper clamp for every time value (guards against absurd payloads)
pub const MAX_TIME_SEC: f64 = 24.0 * 60.0 * 60.0;

/// Adjacent-clip gap below which clips count as abutting
const CONTIGUOUS_GAP_SEC: f64 = 0.01;

/// Clamp a time value to `[0, 24 h]`, substituting `fallback` when non-finite.
pub fn sanitize_time(value: f64, fallback: f64) -> f64 {
    if !value.is_finite() {
        return fallback;
    }
    value.clamp(0.0, MAX_TIME_SEC)
}

/// A duration, or 0.0 when non-finite or below the usable minimum.
pub fn sanitize_duration(value: f64) -> f64 {
    if !value.is_finite() || value < MIN_DURATION_SEC {
        return 0.0;
    }
    value
}

/// Segment kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Word,
    Spacer,
}

/// Flattened edited-timeline atom.
///
/// `original_start`/`original_end` are always resolved at ingestion: taken
/// verbatim from the payload segment, interpolated from the enclosing clip's
/// original interval, or defaulted to the edited interval itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub edited_start: f64,
    pub edited_end: f64,
    pub original_start: f64,
    pub original_end: f64,
    /// Word text; empty for spacers
    pub text: String,
    /// Whether the original interval was supplied (segment or clip level)
    /// rather than defaulted from the edited interval
    pub explicit_original: bool,
}

impl Segment {
    pub fn edited_duration(&self) -> f64 {
        self.edited_end - self.edited_start
    }

    pub fn original_duration(&self) -> f64 {
        self.original_end - self.original_start
    }

    pub fn contains_original(&self, original_sec: f64) -> bool {
        original_sec >= self.original_start && original_sec < self.original_end
    }
}

/// Advisory timeline tag: `contiguous` when the first clips abut in edited
/// time (a reordered-but-gapless cut), otherwise `standard`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineMode {
    Standard,
    Contiguous,
}

/// Immutable view of one EDL revision, in edited-time order
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineSnapshot {
    /// Producer-supplied monotone revision
    pub revision: i64,
    pub segments: Vec<Segment>,
    pub mode: TimelineMode,
    pub total_edited_duration: f64,
}

impl TimelineSnapshot {
    /// Empty timeline (engine state before any load)
    pub fn empty() -> Self {
        Self {
            revision: 0,
            segments: Vec::new(),
            mode: TimelineMode::Standard,
            total_edited_duration: 0.0,
        }
    }

    /// Single full-file segment mapping edited time to itself.
    ///
    /// Installed on `load` and as the fallback when a contiguous EDL carries
    /// no usable originals. Duration ≤ 0 yields an empty timeline.
    pub fn identity(revision: i64, duration_sec: f64) -> Self {
        let duration = sanitize_duration(sanitize_time(duration_sec, 0.0));
        let mut snapshot = Self::empty();
        snapshot.revision = revision;
        if duration > 0.0 {
            snapshot.segments.push(Segment {
                kind: SegmentKind::Word,
                edited_start: 0.0,
                edited_end: duration,
                original_start: 0.0,
                original_end: duration,
                text: String::new(),
                explicit_original: true,
            });
            snapshot.total_edited_duration = duration;
        }
        snapshot
    }

    /// Flatten an EDL payload into a snapshot.
    ///
    /// Invalid clips and segments are dropped, never errored: a clip with a
    /// degenerate edited interval is skipped wholesale, a segment with
    /// non-finite times or duration under 100 µs disappears. Surviving
    /// segments are sorted by edited start (ties by edited end).
    pub fn from_payload(payload: &EdlPayload) -> Self {
        let mode = detect_mode(payload);
        let mut segments = Vec::new();

        for clip in &payload.clips {
            let clip_start = sanitize_time(clip.start_sec, 0.0);
            let clip_end = sanitize_time(clip.end_sec, clip_start);
            let clip_dur = sanitize_duration(clip_end - clip_start);
            if clip_dur <= 0.0 {
                debug!(clip = %clip.id, "dropping clip with degenerate edited interval");
                continue;
            }

            let clip_segments_before = segments.len();

            // Clip originals are kept only as a valid pair
            let clip_original = match (clip.original_start_sec, clip.original_end_sec) {
                (Some(os), Some(oe)) if os.is_finite() && oe.is_finite() => {
                    let os = sanitize_time(os, clip_start);
                    let oe = sanitize_time(oe, os);
                    let dur = sanitize_duration(oe - os);
                    (dur > 0.0).then_some((os, os + dur))
                }
                _ => None,
            };

            for seg in &clip.segments {
                if !seg.start_sec.is_finite() || !seg.end_sec.is_finite() {
                    continue;
                }
                // Segment times are clip-relative
                let rel_start = sanitize_time(seg.start_sec, 0.0);
                let rel_end = sanitize_time(seg.end_sec, rel_start);
                let seg_dur = sanitize_duration(rel_end - rel_start);
                if seg_dur <= 0.0 {
                    continue;
                }

                let edited_start = sanitize_time(clip_start + rel_start, clip_start);
                let edited_end = edited_start + seg_dur;

                let segment_original = match (seg.original_start_sec, seg.original_end_sec) {
                    (Some(os), Some(oe)) if os.is_finite() && oe.is_finite() => {
                        let os = sanitize_time(os, 0.0);
                        let oe = sanitize_time(oe, os);
                        let dur = sanitize_duration(oe - os);
                        (dur > 0.0).then_some((os, os + dur))
                    }
                    _ => None,
                };

                // Resolution order: segment originals verbatim, else
                // proportional interpolation within the clip's original
                // interval, else the edited interval itself.
                let (original_start, original_end, explicit) = match (segment_original, clip_original)
                {
                    (Some((os, oe)), _) => (os, oe, true),
                    (None, Some((clip_os, clip_oe))) => {
                        let clip_odur = clip_oe - clip_os;
                        let r0 = (rel_start / clip_dur).clamp(0.0, 1.0);
                        let r1 = (rel_end / clip_dur).clamp(0.0, 1.0);
                        let os = clip_os + r0 * clip_odur;
                        let oe = clip_os + r1 * clip_odur;
                        if sanitize_duration(oe - os) > 0.0 {
                            (os, oe, true)
                        } else {
                            (edited_start, edited_end, false)
                        }
                    }
                    (None, None) => (edited_start, edited_end, false),
                };

                segments.push(Segment {
                    kind: if seg.kind == "spacer" { SegmentKind::Spacer } else { SegmentKind::Word },
                    edited_start,
                    edited_end,
                    original_start,
                    original_end,
                    text: seg.text.clone(),
                    explicit_original: explicit,
                });
            }

            debug!(
                clip = %clip.id,
                speaker = %clip.speaker,
                segments = segments.len() - clip_segments_before,
                duration = clip_dur,
                "ingested clip"
            );
        }

        segments.sort_by(|a, b| {
            a.edited_start
                .partial_cmp(&b.edited_start)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    a.edited_end
                        .partial_cmp(&b.edited_end)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });

        let total_edited_duration = segments.iter().map(Segment::edited_duration).sum();

        debug!(
            revision = payload.revision,
            clips = payload.clips.len(),
            segments = segments.len(),
            mode = ?mode,
            total_edited_duration,
            "flattened EDL payload"
        );

        Self { revision: payload.revision, segments, mode, total_edited_duration }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of word segments
    pub fn word_count(&self) -> usize {
        self.segments.iter().filter(|s| s.kind == SegmentKind::Word).count()
    }

    /// Number of spacer segments
    pub fn spacer_count(&self) -> usize {
        self.segments.iter().filter(|s| s.kind == SegmentKind::Spacer).count()
    }

    /// True when at least one segment carried a supplied original interval
    pub fn has_explicit_originals(&self) -> bool {
        self.segments.iter().any(|s| s.explicit_original)
    }
}

/// Contiguous iff at least two of the first five adjacent clip gaps are
/// below 10 ms in edited time; a two-clip timeline qualifies on its single
/// gap.
fn detect_mode(payload: &EdlPayload) -> TimelineMode {
    if payload.clips.len() < 2 {
        return TimelineMode::Standard;
    }

    let examined = payload.clips.len().min(5) - 1;
    let mut matches = 0;
    for i in 1..payload.clips.len().min(5) {
        let gap = payload.clips[i].start_sec - payload.clips[i - 1].end_sec;
        if gap.is_finite() && gap.abs() < CONTIGUOUS_GAP_SEC {
            matches += 1;
        }
    }

    if matches >= examined.min(2) {
        TimelineMode::Contiguous
    } else {
        TimelineMode::Standard
    }
}
