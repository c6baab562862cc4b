//! WebAssembly bindings for ascv.
//!
//! Provides thin wrappers around the assembler, encoder and decoder for browser environments.

use wasm_bindgen::prelude::*;

use crate::{
    animation::{
        Compression, Container, FrameSink, PlaybackToken, TemporalDecoder, TemporalEncoder,
        TickOutcome,
    },
    compute::FrameAssembler,
    schema::{ConversionConfig, EncoderConfig, Frame},
};

/// Initialize WASM module with panic hook and logging.
#[wasm_bindgen(start)]
pub fn init() {
    // Set panic hook for better error messages in browser
    console_error_panic_hook::set_once();

    // Initialize WASM logger
    wasm_logger::init(wasm_logger::Config::default());
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn parse_config(config_json: &str) -> Result<FrameAssembler, JsValue> {
    let config: ConversionConfig = serde_json::from_str(config_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid config JSON: {e}")))?;
    FrameAssembler::new(config).map_err(js_error)
}

fn frame_to_js(frame: &Frame) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(frame)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {e}")))
}

/// Converts canvas `ImageData` buffers to frames.
#[wasm_bindgen]
pub struct WasmConverter {
    assembler: FrameAssembler,
}

#[wasm_bindgen]
impl WasmConverter {
    /// Create a converter from a JSON `ConversionConfig`.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<WasmConverter, JsValue> {
        Ok(WasmConverter {
            assembler: parse_config(config_json)?,
        })
    }

    /// Sample size `[width, height]` the caller should draw the source at.
    #[wasm_bindgen(js_name = sampleSize)]
    pub fn sample_size(&self, source_width: u32, source_height: u32) -> Vec<u32> {
        let (w, h) = self.assembler.config().sample_size(source_width, source_height);
        vec![w as u32, h as u32]
    }

    /// Convert an RGBA buffer already drawn at `sampleSize`.
    #[wasm_bindgen]
    pub fn convert(&self, width: usize, height: usize, data: &[u8]) -> Result<JsValue, JsValue> {
        let frame = self
            .assembler
            .assemble_rgba(width, height, data)
            .map_err(js_error)?;
        frame_to_js(&frame)
    }

    /// Convert a full-size RGBA buffer, resampling it first.
    #[wasm_bindgen(js_name = convertSource)]
    pub fn convert_source(
        &self,
        width: usize,
        height: usize,
        data: &[u8],
    ) -> Result<JsValue, JsValue> {
        let frame = self
            .assembler
            .convert_source(width, height, data)
            .map_err(js_error)?;
        frame_to_js(&frame)
    }
}

/// Records converted frames into a container.
#[wasm_bindgen]
pub struct WasmEncoder {
    assembler: FrameAssembler,
    encoder: TemporalEncoder,
}

#[wasm_bindgen]
impl WasmEncoder {
    /// Create from JSON `ConversionConfig` and `EncoderConfig`.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str, encoder_json: &str) -> Result<WasmEncoder, JsValue> {
        let encoder_config: EncoderConfig = serde_json::from_str(encoder_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid encoder JSON: {e}")))?;
        Ok(WasmEncoder {
            assembler: parse_config(config_json)?,
            encoder: TemporalEncoder::new(encoder_config),
        })
    }

    #[wasm_bindgen]
    pub fn start(&mut self) {
        self.encoder.start();
    }

    #[wasm_bindgen(js_name = isEncoding)]
    pub fn is_encoding(&self) -> bool {
        self.encoder.is_encoding()
    }

    /// Convert and encode one sample at `timestamp` ms. Returns true for a keyframe.
    #[wasm_bindgen]
    pub fn push(
        &mut self,
        width: usize,
        height: usize,
        data: &[u8],
        timestamp: f64,
    ) -> Result<bool, JsValue> {
        let frame = self
            .assembler
            .assemble_rgba(width, height, data)
            .map_err(js_error)?;
        let record = self.encoder.push_at(&frame, timestamp).map_err(js_error)?;
        Ok(record.is_keyframe())
    }

    /// Session counters as a summary line.
    #[wasm_bindgen(js_name = getStats)]
    pub fn get_stats(&self) -> Option<String> {
        self.encoder.stats().map(|s| s.to_string())
    }

    /// Finish and return the container bytes, gzip wrapped when `gzip` is set.
    #[wasm_bindgen]
    pub fn stop(&mut self, duration: Option<f64>, gzip: bool) -> Result<Vec<u8>, JsValue> {
        let container = self.encoder.stop(duration).map_err(js_error)?;
        let compression = if gzip {
            Compression::Gzip
        } else {
            Compression::None
        };
        Ok(container.to_bytes(compression).map_err(js_error)?.bytes)
    }
}

/// Calls a JS function with each rendered frame.
struct JsSink<'a> {
    callback: &'a js_sys::Function,
    error: Option<JsValue>,
}

impl FrameSink for JsSink<'_> {
    fn render(&mut self, frame: &Frame) {
        let result = frame_to_js(frame)
            .and_then(|value| self.callback.call1(&JsValue::NULL, &value));
        if let Err(e) = result {
            self.error = Some(e);
        }
    }
}

/// Plays a container back through a JS callback.
#[wasm_bindgen]
pub struct WasmDecoder {
    decoder: TemporalDecoder,
    token: Option<PlaybackToken>,
}

#[wasm_bindgen]
impl WasmDecoder {
    #[wasm_bindgen(constructor)]
    pub fn new() -> WasmDecoder {
        WasmDecoder {
            decoder: TemporalDecoder::new(),
            token: None,
        }
    }

    /// Load container bytes (plain or gzip JSON).
    #[wasm_bindgen]
    pub fn load(&mut self, bytes: &[u8]) -> Result<(), JsValue> {
        let container = Container::from_bytes(bytes, Compression::None).map_err(js_error)?;
        self.decoder.load(container).map_err(js_error)?;
        self.token = None;
        Ok(())
    }

    #[wasm_bindgen(js_name = frameCount)]
    pub fn frame_count(&self) -> usize {
        self.decoder.container().map_or(0, Container::len)
    }

    #[wasm_bindgen]
    pub fn duration(&self) -> f64 {
        self.decoder.duration()
    }

    /// Frame current at `elapsed` ms, or undefined before the first record.
    #[wasm_bindgen]
    pub fn seek(&mut self, elapsed: f64) -> Result<JsValue, JsValue> {
        match self.decoder.seek(elapsed) {
            Some(frame) => frame_to_js(frame),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    /// Start or resume at `now` (e.g. `performance.now()`).
    #[wasm_bindgen]
    pub fn play(&mut self, now: f64) {
        self.token = self.decoder.play(now);
    }

    #[wasm_bindgen]
    pub fn pause(&mut self) {
        self.decoder.pause();
    }

    #[wasm_bindgen]
    pub fn stop(&mut self) {
        self.decoder.stop();
        self.token = None;
    }

    /// Advance playback; `callback` receives the frame. Returns true while the
    /// caller should keep requesting animation frames.
    #[wasm_bindgen]
    pub fn tick(&mut self, now: f64, callback: &js_sys::Function) -> Result<bool, JsValue> {
        let Some(token) = self.token else {
            return Ok(false);
        };
        let mut sink = JsSink {
            callback,
            error: None,
        };
        let outcome = self.decoder.tick(token, now, &mut sink);
        if let Some(e) = sink.error {
            return Err(e);
        }
        if matches!(outcome, TickOutcome::Finished | TickOutcome::Stale) {
            self.token = None;
        }
        Ok(outcome.should_continue())
    }
}

impl Default for WasmDecoder {
    fn default() -> Self {
        Self::new()
    }
}
