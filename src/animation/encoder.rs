//! Temporal encoder: turns a stream of frames into keyframe and delta records.

use std::fmt;

use log::debug;

use super::{Clock, Container, DeltaRecord, FrameRecord, KeyframeRecord};
use crate::schema::{EncoderConfig, Frame};

/// Encoder session errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncoderError {
    #[error("Encoder is idle; call start() before pushing frames")]
    NotEncoding,
    #[error("Timestamp must be finite and non-negative, got {0}")]
    InvalidTimestamp(f64),
    #[error("Timestamp {got} ms precedes previous frame at {previous} ms")]
    NonMonotonic { previous: f64, got: f64 },
}

/// Why a frame was stored whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyframeReason {
    /// Nothing to diff against.
    First,
    /// `keyframe_interval` deltas since the last keyframe.
    Interval,
    /// Grid size, charset, mode or color layout changed.
    Layout,
}

/// Decide whether `next` must be a keyframe.
pub fn keyframe_reason(
    last: Option<&Frame>,
    next: &Frame,
    frames_since_keyframe: u32,
    keyframe_interval: u32,
) -> Option<KeyframeReason> {
    match last {
        None => Some(KeyframeReason::First),
        Some(_) if frames_since_keyframe >= keyframe_interval => Some(KeyframeReason::Interval),
        Some(last) if !last.same_layout(next) => Some(KeyframeReason::Layout),
        Some(_) => None,
    }
}

fn changed_cells<T: Copy + PartialEq>(prev: &[T], next: &[T]) -> Vec<(usize, T)> {
    prev.iter()
        .zip(next)
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .map(|(i, (_, b))| (i, *b))
        .collect()
}

/// Sparse patch turning `prev` into `next`. Both frames must share a layout.
pub fn diff_frames(prev: &Frame, next: &Frame, timestamp: f64) -> DeltaRecord {
    let color_diffs = match (prev.colors(), next.colors()) {
        (Some(a), Some(b)) => changed_cells(a, b),
        _ => Vec::new(),
    };
    DeltaRecord {
        timestamp,
        color_diffs,
        index_diffs: changed_cells(prev.char_indices(), next.char_indices()),
        text_diffs: Vec::new(),
    }
}

/// Counters for one encode session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncoderStats {
    /// Keyframes emitted.
    pub keyframes: usize,
    /// Keyframes forced by a layout change.
    pub layout_keyframes: usize,
    /// Deltas emitted.
    pub deltas: usize,
    /// Total patch entries across all deltas.
    pub patched_cells: usize,
}

impl fmt::Display for EncoderStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} keyframes ({} from layout changes), {} deltas, {} patched cells",
            self.keyframes, self.layout_keyframes, self.deltas, self.patched_cells
        )
    }
}

#[derive(Debug, Default)]
struct Session {
    records: Vec<FrameRecord>,
    last_frame: Option<Frame>,
    frames_since_keyframe: u32,
    origin_ms: Option<f64>,
    stats: EncoderStats,
}

/// Keyframe/delta encoder.
///
/// Usage:
/// ```ignore
/// let mut encoder = TemporalEncoder::new(EncoderConfig::default());
/// encoder.start();
/// for (t, frame) in frames {
///     encoder.push_at(&frame, t)?;
/// }
/// let container = encoder.stop(None)?;
/// ```
#[derive(Debug, Default)]
pub struct TemporalEncoder {
    config: EncoderConfig,
    session: Option<Session>,
}

impl TemporalEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// True between `start` and `stop`.
    pub fn is_encoding(&self) -> bool {
        self.session.is_some()
    }

    /// Begin a session, discarding any unfinished one.
    pub fn start(&mut self) {
        if let Some(old) = self.session.take() {
            debug!(
                "discarding unfinished encode session with {} records",
                old.records.len()
            );
        }
        self.session = Some(Session::default());
    }

    /// Records emitted in the current session.
    pub fn len(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counters for the current session.
    pub fn stats(&self) -> Option<EncoderStats> {
        self.session.as_ref().map(|s| s.stats)
    }

    /// Encode `frame` stamped with the session clock (first push is t = 0).
    pub fn push<C: Clock + ?Sized>(
        &mut self,
        frame: &Frame,
        clock: &C,
    ) -> Result<&FrameRecord, EncoderError> {
        let session = self.session.as_mut().ok_or(EncoderError::NotEncoding)?;
        let now = clock.now_ms();
        let origin = *session.origin_ms.get_or_insert(now);
        self.push_at(frame, now - origin)
    }

    /// Encode `frame` at an explicit timestamp in milliseconds.
    pub fn push_at(&mut self, frame: &Frame, timestamp: f64) -> Result<&FrameRecord, EncoderError> {
        let interval = self.config.keyframe_interval;
        let session = self.session.as_mut().ok_or(EncoderError::NotEncoding)?;

        if !timestamp.is_finite() || timestamp < 0.0 {
            return Err(EncoderError::InvalidTimestamp(timestamp));
        }
        if let Some(previous) = session.records.last().map(FrameRecord::timestamp)
            && timestamp < previous
        {
            return Err(EncoderError::NonMonotonic {
                previous,
                got: timestamp,
            });
        }

        let reason = keyframe_reason(
            session.last_frame.as_ref(),
            frame,
            session.frames_since_keyframe,
            interval,
        );
        let record = match (reason, session.last_frame.as_ref()) {
            (None, Some(last)) => {
                let delta = diff_frames(last, frame, timestamp);
                session.frames_since_keyframe += 1;
                session.stats.deltas += 1;
                session.stats.patched_cells += delta.patch_count();
                FrameRecord::Delta(delta)
            }
            (reason, _) => {
                debug!("keyframe at {timestamp} ms ({reason:?})");
                session.frames_since_keyframe = 0;
                session.stats.keyframes += 1;
                if reason == Some(KeyframeReason::Layout) {
                    session.stats.layout_keyframes += 1;
                }
                FrameRecord::Keyframe(KeyframeRecord {
                    timestamp,
                    frame: frame.clone(),
                })
            }
        };

        session.last_frame = Some(frame.clone());
        let index = session.records.len();
        session.records.push(record);
        Ok(&session.records[index])
    }

    /// Finish the session and return its container.
    pub fn stop(&mut self, duration_ms: Option<f64>) -> Result<Container, EncoderError> {
        let session = self.session.take().ok_or(EncoderError::NotEncoding)?;
        debug!("encode session finished: {}", session.stats);
        let mut container = Container::new(session.records);
        container.meta.duration = duration_ms;
        Ok(container)
    }

    /// Encode a whole timestamped sequence in one session.
    pub fn encode_sequence<'a, I>(&mut self, frames: I) -> Result<Container, EncoderError>
    where
        I: IntoIterator<Item = (f64, &'a Frame)>,
    {
        self.start();
        for (timestamp, frame) in frames {
            if let Err(e) = self.push_at(frame, timestamp) {
                self.session = None;
                return Err(e);
            }
        }
        self.stop(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::ManualClock;
    use crate::schema::{ColorMode, FrameStyle};

    fn frame(width: usize, height: usize, seed: u32) -> Frame {
        let cells = width * height;
        Frame::new(
            width,
            height,
            vec![' ', '.', '*', '#'],
            (0..cells as u32).map(|i| (i + seed) % 4).collect(),
            Some((0..cells as i32).map(|i| i * seed as i32).collect()),
            FrameStyle {
                color_mode: ColorMode::Color,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_keyframe_interval() {
        let mut encoder = TemporalEncoder::new(EncoderConfig {
            keyframe_interval: 30,
        });
        let frames: Vec<Frame> = (0..31).map(|i| frame(4, 3, i)).collect();
        let container = encoder
            .encode_sequence(frames.iter().enumerate().map(|(i, f)| (i as f64 * 10.0, f)))
            .unwrap();

        assert_eq!(container.meta.frame_count, 31);
        for (i, record) in container.frames.iter().enumerate() {
            assert_eq!(record.is_keyframe(), i == 0 || i == 30, "record {i}");
        }
    }

    #[test]
    fn test_layout_change_forces_keyframe() {
        let mut encoder = TemporalEncoder::new(EncoderConfig {
            keyframe_interval: 100,
        });
        encoder.start();
        encoder.push_at(&frame(4, 3, 0), 0.0).unwrap();
        assert!(!encoder.push_at(&frame(4, 3, 1), 10.0).unwrap().is_keyframe());
        assert!(encoder.push_at(&frame(3, 4, 1), 20.0).unwrap().is_keyframe());
        assert!(!encoder.push_at(&frame(3, 4, 2), 30.0).unwrap().is_keyframe());

        let stats = encoder.stats().unwrap();
        assert_eq!(stats.keyframes, 2);
        assert_eq!(stats.layout_keyframes, 1);
        assert_eq!(stats.deltas, 2);
    }

    #[test]
    fn test_delta_lists_only_changes() {
        let a = frame(2, 2, 0);
        let b = Frame::new(
            2,
            2,
            a.charset().to_vec(),
            vec![0, 3, 2, 3],
            Some(vec![0, 0, 0, 7]),
            a.style(),
        )
        .unwrap();
        let delta = diff_frames(&a, &b, 16.0);
        assert_eq!(delta.index_diffs, vec![(1, 3)]);
        assert_eq!(delta.color_diffs, vec![(3, 7)]);
        assert!(delta.text_diffs.is_empty());

        let same = diff_frames(&a, &a, 32.0);
        assert!(same.is_empty());
    }

    #[test]
    fn test_zero_interval_is_all_keyframes() {
        let mut encoder = TemporalEncoder::new(EncoderConfig {
            keyframe_interval: 0,
        });
        let f = frame(2, 2, 0);
        let container = encoder
            .encode_sequence([(0.0, &f), (1.0, &f), (2.0, &f)])
            .unwrap();
        assert_eq!(container.keyframe_count(), 3);
    }

    #[test]
    fn test_idle_guard() {
        let mut encoder = TemporalEncoder::default();
        let f = frame(1, 1, 0);
        assert_eq!(
            encoder.push_at(&f, 0.0).unwrap_err(),
            EncoderError::NotEncoding
        );
        assert_eq!(encoder.stop(None).unwrap_err(), EncoderError::NotEncoding);

        encoder.start();
        encoder.push_at(&f, 0.0).unwrap();
        let container = encoder.stop(Some(500.0)).unwrap();
        assert_eq!(container.meta.duration, Some(500.0));
        assert!(!encoder.is_encoding());
        assert_eq!(
            encoder.push_at(&f, 1.0).unwrap_err(),
            EncoderError::NotEncoding
        );
    }

    #[test]
    fn test_start_clears_previous_session() {
        let mut encoder = TemporalEncoder::default();
        encoder.start();
        encoder.push_at(&frame(2, 2, 0), 0.0).unwrap();
        encoder.push_at(&frame(2, 2, 1), 5.0).unwrap();

        encoder.start();
        assert!(encoder.is_empty());
        // No last frame survives: first push is a keyframe again.
        assert!(encoder.push_at(&frame(2, 2, 1), 0.0).unwrap().is_keyframe());
    }

    #[test]
    fn test_rejects_bad_timestamps() {
        let mut encoder = TemporalEncoder::default();
        encoder.start();
        let f = frame(1, 1, 0);
        encoder.push_at(&f, 100.0).unwrap();
        assert_eq!(
            encoder.push_at(&f, 50.0).unwrap_err(),
            EncoderError::NonMonotonic {
                previous: 100.0,
                got: 50.0
            }
        );
        assert!(matches!(
            encoder.push_at(&f, f64::NAN).unwrap_err(),
            EncoderError::InvalidTimestamp(_)
        ));
        assert_eq!(encoder.len(), 1);
    }

    #[test]
    fn test_clock_stamps_relative_to_first_push() {
        let clock = ManualClock::new(5_000.0);
        let mut encoder = TemporalEncoder::default();
        encoder.start();
        let f = frame(1, 1, 0);
        assert_eq!(encoder.push(&f, &clock).unwrap().timestamp(), 0.0);
        clock.advance(33.0);
        assert_eq!(encoder.push(&f, &clock).unwrap().timestamp(), 33.0);
    }

    #[test]
    fn test_retained_frame_is_a_copy() {
        let mut encoder = TemporalEncoder::default();
        encoder.start();
        {
            let first = frame(2, 2, 0);
            encoder.push_at(&first, 0.0).unwrap();
        }
        // The caller's frame is gone; diffing still works against the retained copy.
        let record = encoder.push_at(&frame(2, 2, 0), 1.0).unwrap();
        let FrameRecord::Delta(delta) = record else {
            panic!("expected delta");
        };
        assert!(delta.is_empty());
    }
}
