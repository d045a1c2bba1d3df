use crate::pipeline::types::{FrameRef, TranscriptSegment};

/// For each frame, joins the text of every transcript segment whose
/// [start_time, end_time] span contains the frame's timestamp (inclusive on
/// both ends). Frames covered by no segment map to an empty string.
///
/// Library-level contract for per-frame lookups; the batching pipeline goes
/// through [`spoken_text_in_window`] instead.
///
/// O(frames x segments); both collections stay in the tens to low hundreds.
pub fn spoken_text_for(frames: &[FrameRef], transcript: &[TranscriptSegment]) -> Vec<String> {
    frames
        .iter()
        .map(|frame| {
            let mut parts: Vec<&str> = Vec::new();
            for segment in transcript {
                if segment.start_time <= frame.timestamp && frame.timestamp <= segment.end_time {
                    parts.push(segment.text.as_str());
                }
            }
            parts.join(" ")
        })
        .collect()
}

/// Joins the text of every segment overlapping the half-open window
/// [start, end); used for batch-level prompt context.
pub fn spoken_text_in_window(
    transcript: &[TranscriptSegment],
    start: f64,
    end: f64,
) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in transcript {
        if segment.start_time < end && segment.end_time >= start {
            parts.push(segment.text.as_str());
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}
