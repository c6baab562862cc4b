//! Temporal decoder: replays keyframes and deltas into one reconstructed frame.

use log::{debug, warn};

use super::{Compression, Container, ContainerError, DeltaRecord, FrameRecord, text_position_to_cell};
use crate::schema::Frame;

/// Receives the reconstructed frame after each playback tick.
pub trait FrameSink {
    fn render(&mut self, frame: &Frame);
}

impl<F: FnMut(&Frame)> FrameSink for F {
    fn render(&mut self, frame: &Frame) {
        self(frame)
    }
}

/// Decoder lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Empty,
    Loaded,
    Playing,
    Paused,
}

/// Identifies one playback loop; tokens from earlier `play` calls go stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackToken(u64);

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Record `index` is current and was handed to the sink.
    Rendered { index: usize },
    /// A pending pause was honored; nothing rendered.
    Paused,
    /// The token belongs to a cancelled loop.
    Stale,
    /// Playing, but the first record is not due yet; nothing rendered.
    Waiting,
    /// The still image was delivered; the loop should stop scheduling.
    Finished,
    /// Not playing.
    Idle,
}

impl TickOutcome {
    /// Whether the scheduler should request another tick.
    pub fn should_continue(self) -> bool {
        matches!(self, TickOutcome::Rendered { .. } | TickOutcome::Waiting)
    }
}

/// Patch `frame` in place. Returns the number of entries skipped as out of range.
pub fn apply_delta(frame: &mut Frame, delta: &DeltaRecord) -> usize {
    let mut skipped = 0;

    for &(cell, color) in &delta.color_diffs {
        if !frame.set_color(cell, color) {
            skipped += 1;
        }
    }
    for &(cell, index) in &delta.index_diffs {
        if !frame.set_char_index(cell, index) {
            skipped += 1;
        }
    }
    for &(pos, symbol) in &delta.text_diffs {
        let target = text_position_to_cell(pos, frame.width(), frame.height()).zip(
            frame
                .charset()
                .iter()
                .position(|&c| c == symbol)
                .map(|i| i as u32),
        );
        match target {
            Some((cell, index)) if frame.set_char_index(cell, index) => {}
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(
            "delta at {} ms: skipped {skipped} of {} patches outside the frame",
            delta.timestamp,
            delta.patch_count()
        );
    }
    skipped
}

/// Stateful reconstruction and timed playback of a [`Container`].
///
/// Usage:
/// ```ignore
/// let mut decoder = TemporalDecoder::new();
/// decoder.load(container)?;
/// let token = decoder.play(clock.now_ms());
/// while decoder.tick(token, clock.now_ms(), &mut |f: &Frame| draw(f)).should_continue() {
///     wait_for_next_frame();
/// }
/// ```
#[derive(Debug, Default)]
pub struct TemporalDecoder {
    container: Option<Container>,
    duration: f64,
    reconstructed: Option<Frame>,
    last_applied: Option<usize>,
    state: PlaybackState,
    generation: u64,
    start_ms: f64,
    paused_at: f64,
    pause_requested: bool,
}

impl TemporalDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a container after validating it.
    ///
    /// On failure the decoder keeps whatever it had loaded before.
    pub fn load(&mut self, container: Container) -> Result<(), ContainerError> {
        container.validate()?;
        self.duration = container.duration();
        debug!(
            "loaded container: {} records ({} keyframes), {:.0} ms",
            container.len(),
            container.keyframe_count(),
            self.duration
        );
        self.container = Some(container);
        self.generation += 1;
        self.state = PlaybackState::Loaded;
        self.paused_at = 0.0;
        self.pause_requested = false;
        self.reset();
        Ok(())
    }

    pub fn load_str(&mut self, json: &str) -> Result<(), ContainerError> {
        let container = Container::from_json(json)?;
        self.load(container)
    }

    pub fn load_bytes(&mut self, bytes: &[u8], hint: Compression) -> Result<(), ContainerError> {
        let container = Container::from_bytes(bytes, hint)?;
        self.load(container)
    }

    /// Drop the container and return to `Empty`.
    pub fn unload(&mut self) -> Option<Container> {
        self.generation += 1;
        self.state = PlaybackState::Empty;
        self.pause_requested = false;
        self.reset();
        self.container.take()
    }

    pub fn container(&self) -> Option<&Container> {
        self.container.as_ref()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Loop length in milliseconds (0 when empty).
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// The reconstructed frame, if any record has been applied.
    pub fn current(&self) -> Option<&Frame> {
        self.reconstructed.as_ref()
    }

    /// Index of the last applied record.
    pub fn last_applied(&self) -> Option<usize> {
        self.last_applied
    }

    /// Discard the reconstruction; the next seek replays from record 0.
    pub fn reset(&mut self) {
        self.reconstructed = None;
        self.last_applied = None;
    }

    /// Highest record index with `timestamp <= elapsed`.
    fn target_index(&self, elapsed: f64) -> Option<usize> {
        let frames = &self.container.as_ref()?.frames;
        frames
            .iter()
            .take_while(|r| r.timestamp() <= elapsed)
            .count()
            .checked_sub(1)
    }

    /// Reconstruct the frame current at `elapsed` ms.
    pub fn seek(&mut self, elapsed: f64) -> Option<&Frame> {
        let target = self.target_index(elapsed)?;

        if self.last_applied.is_some_and(|last| target < last) {
            debug!("seek to {elapsed} ms rewinds past record {target}; replaying");
            self.reset();
        }

        let first = self.last_applied.map_or(0, |last| last + 1);
        if first <= target
            && let Some(container) = self.container.as_ref()
        {
            for record in &container.frames[first..=target] {
                match record {
                    FrameRecord::Keyframe(k) => self.reconstructed = Some(k.frame.clone()),
                    FrameRecord::Delta(d) => match self.reconstructed.as_mut() {
                        Some(frame) => {
                            apply_delta(frame, d);
                        }
                        None => debug!("delta at {} ms with no keyframe; ignored", d.timestamp),
                    },
                }
            }
            self.last_applied = Some(target);
        }
        self.reconstructed.as_ref()
    }

    /// Start or resume playback at wall-clock `now_ms`.
    ///
    /// Any earlier loop's token goes stale. Resuming from `Paused` continues
    /// from the paused offset.
    pub fn play(&mut self, now_ms: f64) -> Option<PlaybackToken> {
        if self.container.is_none() {
            return None;
        }
        let offset = if self.state == PlaybackState::Paused {
            self.paused_at
        } else {
            0.0
        };
        self.generation += 1;
        self.start_ms = now_ms - offset;
        self.pause_requested = false;
        self.state = PlaybackState::Playing;
        Some(PlaybackToken(self.generation))
    }

    /// Request a pause; honored at the top of the next tick.
    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.pause_requested = true;
        }
    }

    /// Stop immediately, staling the current token and rewinding to the start.
    pub fn stop(&mut self) {
        if self.container.is_some() {
            self.generation += 1;
            self.state = PlaybackState::Loaded;
            self.pause_requested = false;
            self.paused_at = 0.0;
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Advance the playback loop identified by `token` to `now_ms`.
    pub fn tick<S: FrameSink + ?Sized>(
        &mut self,
        token: PlaybackToken,
        now_ms: f64,
        sink: &mut S,
    ) -> TickOutcome {
        if token.0 != self.generation {
            return TickOutcome::Stale;
        }
        if self.state != PlaybackState::Playing {
            return TickOutcome::Idle;
        }
        let elapsed = (now_ms - self.start_ms).max(0.0);
        if self.pause_requested {
            self.pause_requested = false;
            self.paused_at = elapsed;
            self.state = PlaybackState::Paused;
            return TickOutcome::Paused;
        }

        if self.container.as_ref().is_some_and(Container::is_still) {
            if let Some(frame) = self.seek(f64::INFINITY) {
                sink.render(frame);
            }
            self.state = PlaybackState::Loaded;
            return TickOutcome::Finished;
        }

        let position = if self.duration > 0.0 {
            elapsed.rem_euclid(self.duration)
        } else {
            0.0
        };
        match self.seek(position) {
            Some(frame) => {
                sink.render(frame);
                match self.last_applied {
                    Some(index) => TickOutcome::Rendered { index },
                    None => TickOutcome::Waiting,
                }
            }
            None => TickOutcome::Waiting,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{KeyframeRecord, TemporalEncoder};
    use crate::schema::{ColorMode, EncoderConfig, FrameStyle};

    fn frame(indices: Vec<u32>) -> Frame {
        Frame::new(
            2,
            2,
            vec!['a', 'b', 'c'],
            indices.clone(),
            Some(indices.iter().map(|&i| i as i32 * 10).collect()),
            FrameStyle {
                color_mode: ColorMode::Color,
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn three_frames() -> Vec<Frame> {
        vec![
            frame(vec![0, 0, 0, 0]),
            frame(vec![1, 0, 0, 0]),
            frame(vec![1, 2, 2, 0]),
        ]
    }

    fn encoded(timestamps: [f64; 3], interval: u32) -> Container {
        let frames = three_frames();
        TemporalEncoder::new(EncoderConfig {
            keyframe_interval: interval,
        })
        .encode_sequence(timestamps.into_iter().zip(frames.iter()))
        .unwrap()
    }

    #[test]
    fn test_seek_reconstructs_each_record() {
        let frames = three_frames();
        let mut decoder = TemporalDecoder::new();
        decoder.load(encoded([0.0, 100.0, 250.0], 30)).unwrap();

        assert_eq!(decoder.seek(0.0), Some(&frames[0]));
        assert_eq!(decoder.seek(99.0), Some(&frames[0]));
        assert_eq!(decoder.seek(100.0), Some(&frames[1]));
        assert_eq!(decoder.seek(260.0), Some(&frames[2]));
        assert_eq!(decoder.last_applied(), Some(2));
    }

    #[test]
    fn test_wrap_rebuilds_from_keyframe() {
        let frames = three_frames();
        let container = encoded([0.0, 100.0, 250.0], 30).with_duration(300.0);
        let mut decoder = TemporalDecoder::new();
        decoder.load(container).unwrap();

        let token = decoder.play(1_000.0).unwrap();
        let mut seen = Vec::new();
        let mut sink = |f: &Frame| seen.push(f.clone());

        assert_eq!(
            decoder.tick(token, 1_280.0, &mut sink),
            TickOutcome::Rendered { index: 2 }
        );
        // 320 mod 300 = 20: must come from the first keyframe, not the state at 280.
        assert_eq!(
            decoder.tick(token, 1_320.0, &mut sink),
            TickOutcome::Rendered { index: 0 }
        );
        assert_eq!(seen, vec![frames[2].clone(), frames[0].clone()]);
    }

    #[test]
    fn test_play_cancels_previous_loop() {
        let mut decoder = TemporalDecoder::new();
        decoder.load(encoded([0.0, 10.0, 20.0], 30)).unwrap();
        let first = decoder.play(0.0).unwrap();
        let second = decoder.play(5.0).unwrap();
        let mut sink = |_: &Frame| {};
        assert_eq!(decoder.tick(first, 10.0, &mut sink), TickOutcome::Stale);
        assert!(decoder.tick(second, 10.0, &mut sink).should_continue());
    }

    #[test]
    fn test_pause_is_observed_on_next_tick_and_resumes() {
        let mut decoder = TemporalDecoder::new();
        decoder.load(encoded([0.0, 100.0, 250.0], 30).with_duration(300.0)).unwrap();
        let token = decoder.play(0.0).unwrap();
        let mut renders = 0;
        let mut sink = |_: &Frame| renders += 1;

        decoder.tick(token, 50.0, &mut sink);
        decoder.pause();
        assert!(decoder.is_playing());
        assert_eq!(decoder.tick(token, 120.0, &mut sink), TickOutcome::Paused);
        assert_eq!(decoder.state(), PlaybackState::Paused);
        assert_eq!(decoder.tick(token, 130.0, &mut sink), TickOutcome::Idle);

        // Resume an hour later: playback continues from the 120 ms offset.
        let token = decoder.play(3_600_000.0).unwrap();
        assert_eq!(
            decoder.tick(token, 3_600_000.0 + 140.0, &mut sink),
            TickOutcome::Rendered { index: 2 }
        );
        assert_eq!(renders, 2);
    }

    #[test]
    fn test_still_renders_once() {
        let mut decoder = TemporalDecoder::new();
        decoder.load(Container::still(frame(vec![2, 1, 0, 0]))).unwrap();
        let token = decoder.play(0.0).unwrap();
        let mut renders = 0;
        let mut sink = |_: &Frame| renders += 1;

        assert_eq!(decoder.tick(token, 0.0, &mut sink), TickOutcome::Finished);
        assert_eq!(decoder.tick(token, 500.0, &mut sink), TickOutcome::Idle);
        assert_eq!(renders, 1);
    }

    #[test]
    fn test_waits_for_late_first_record() {
        let container = Container::new(vec![
            FrameRecord::Keyframe(KeyframeRecord {
                timestamp: 50.0,
                frame: frame(vec![0; 4]),
            }),
            FrameRecord::Delta(DeltaRecord {
                timestamp: 100.0,
                index_diffs: vec![(0, 1)],
                ..Default::default()
            }),
        ])
        .with_duration(200.0);
        let mut decoder = TemporalDecoder::new();
        decoder.load(container).unwrap();
        let token = decoder.play(0.0).unwrap();
        let mut renders = 0;
        let mut sink = |_: &Frame| renders += 1;

        let outcome = decoder.tick(token, 10.0, &mut sink);
        assert_eq!(outcome, TickOutcome::Waiting);
        assert!(outcome.should_continue());
        assert_eq!(
            decoder.tick(token, 60.0, &mut sink),
            TickOutcome::Rendered { index: 0 }
        );
        // 210 wraps to 10, before the first record again.
        let outcome = decoder.tick(token, 210.0, &mut sink);
        assert_eq!(outcome, TickOutcome::Waiting);
        assert!(outcome.should_continue());
        assert_eq!(
            decoder.tick(token, 320.0, &mut sink),
            TickOutcome::Rendered { index: 1 }
        );
        assert_eq!(renders, 2);
    }

    #[test]
    fn test_still_with_late_timestamp_renders_once() {
        let still = frame(vec![2, 1, 0, 0]);
        let container = Container::new(vec![FrameRecord::Keyframe(KeyframeRecord {
            timestamp: 50.0,
            frame: still.clone(),
        })]);
        let mut decoder = TemporalDecoder::new();
        decoder.load(container).unwrap();
        let token = decoder.play(0.0).unwrap();
        let mut seen = Vec::new();
        let mut sink = |f: &Frame| seen.push(f.clone());

        assert_eq!(decoder.tick(token, 1_000.0, &mut sink), TickOutcome::Finished);
        assert_eq!(seen, vec![still]);
    }

    #[test]
    fn test_failed_load_keeps_previous_container() {
        let mut decoder = TemporalDecoder::new();
        decoder.load(encoded([0.0, 1.0, 2.0], 30)).unwrap();
        assert!(decoder.load_str("ASCV-old").is_err());
        assert!(decoder.load(Container::new(Vec::new())).is_err());
        assert_eq!(decoder.state(), PlaybackState::Loaded);
        assert_eq!(decoder.container().map(Container::len), Some(3));
    }

    #[test]
    fn test_apply_delta_skips_out_of_range() {
        let mut f = frame(vec![0, 0, 0, 0]);
        let delta = DeltaRecord {
            timestamp: 1.0,
            color_diffs: vec![(0, 7), (9, 7)],
            index_diffs: vec![(1, 2), (2, 9)],
            ..Default::default()
        };
        assert_eq!(apply_delta(&mut f, &delta), 2);
        assert_eq!(f.char_indices(), &[0, 2, 0, 0]);
        assert_eq!(f.colors().unwrap()[0], 7);
    }

    #[test]
    fn test_text_deltas_skip_row_separator() {
        let mut f = frame(vec![0, 0, 0, 0]);
        // width 2: positions 0,1 row 0, 2 is '\n', 3,4 row 1
        let delta = DeltaRecord {
            timestamp: 1.0,
            text_diffs: vec![(1, 'c'), (2, 'b'), (3, 'b')],
            ..Default::default()
        };
        assert_eq!(apply_delta(&mut f, &delta), 1);
        assert_eq!(f.text(), "ac\nba\n");
    }

    #[test]
    fn test_version_one_container_plays() {
        let doc = r##"{"meta":{"version":1,"frameCount":2},"frames":[
            {"t":0,"type":"f","d":{"charIndices":[0,0,0,0],"width":2,"height":2,"charset":" #"}},
            {"t":50,"type":"d","td":[0,"#",4,"#"]}]}"##;
        let mut decoder = TemporalDecoder::new();
        decoder.load_str(doc).unwrap();
        assert_eq!(decoder.seek(60.0).unwrap().text(), "# \n #\n");
    }

    #[test]
    fn test_seek_before_first_record() {
        let container = Container::new(vec![FrameRecord::Keyframe(KeyframeRecord {
            timestamp: 50.0,
            frame: frame(vec![0; 4]),
        })]);
        let mut decoder = TemporalDecoder::new();
        decoder.load(container).unwrap();
        assert!(decoder.seek(10.0).is_none());
        assert!(decoder.seek(50.0).is_some());
    }
}
