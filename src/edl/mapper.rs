//! Bidirectional time mapping between the edited and original timelines
//!
//! Pure functions over a [`TimelineSnapshot`]'s segment list. All walks are
//! in edited order; because originals may be reordered, "before segment i in
//! iteration order" does not imply "earlier in original time", and
//! `original_to_edited` is defined up to the first segment containing the
//! query point.

use crate::edl::model::{sanitize_time, Segment, TimelineSnapshot};

/// Map an edited-timeline position to its original-audio position.
///
/// Walks segments accumulating edited duration; inside the segment that
/// covers `edited_sec`, interpolates linearly into the segment's original
/// interval. Boundary ties resolve to the earlier segment's original end.
/// Past the covered range: the last segment's original end. Empty timeline:
/// identity.
pub fn edited_to_original(snapshot: &TimelineSnapshot, edited_sec: f64) -> f64 {
    let segments = &snapshot.segments;
    if segments.is_empty() {
        return sanitize_time(edited_sec, 0.0);
    }

    let target = sanitize_time(edited_sec, 0.0);
    let mut acc_edited = 0.0;
    for seg in segments {
        let edur = seg.edited_duration();
        if target <= acc_edited + edur {
            let r = ((target - acc_edited) / edur).clamp(0.0, 1.0);
            return seg.original_start + r * seg.original_duration();
        }
        acc_edited += edur;
    }

    segments[segments.len() - 1].original_end
}

/// Map an original-audio position to its edited-timeline position.
///
/// First segment (in edited order) whose original interval contains the
/// query wins; a query before a segment's original start maps to that
/// segment's edited start (accumulated edited time). Past everything: the
/// total edited duration.
pub fn original_to_edited(snapshot: &TimelineSnapshot, original_sec: f64) -> f64 {
    let segments = &snapshot.segments;
    if segments.is_empty() {
        return sanitize_time(original_sec, 0.0);
    }

    let pos = sanitize_time(original_sec, 0.0);
    let mut acc_edited = 0.0;
    for seg in segments {
        let odur = seg.original_duration();
        if pos < seg.original_start {
            return acc_edited;
        }
        if pos < seg.original_end {
            let r = ((pos - seg.original_start) / odur).clamp(0.0, 1.0);
            return acc_edited + r * seg.edited_duration();
        }
        acc_edited += seg.edited_duration();
    }

    acc_edited
}

/// Index of the segment whose original interval contains `original_sec`.
pub fn segment_containing(snapshot: &TimelineSnapshot, original_sec: f64) -> Option<usize> {
    let pos = sanitize_time(original_sec, 0.0);
    snapshot.segments.iter().position(|s| s.contains_original(pos))
}

/// First segment (edited order) whose original interval starts after
/// `original_sec`.
pub fn next_segment_after(snapshot: &TimelineSnapshot, original_sec: f64) -> Option<usize> {
    let pos = sanitize_time(original_sec, 0.0);
    snapshot
        .segments
        .iter()
        .position(|s: &Segment| s.original_start > pos)
}
