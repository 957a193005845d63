//! Progress-callback trait for per-line narration events.
//!
//! Pass a `&dyn NarrationProgressCallback` to [`crate::tts::narrate`] to hear
//! about each dialogue line as it is synthesised. Lines may be in flight
//! concurrently, so implementations must be `Send + Sync` and guard shared
//! state with atomics or a `Mutex`.
//!
//! # Example
//!
//! ```rust
//! use studygen::NarrationProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl NarrationProgressCallback for Counter {
//!     fn on_line_complete(&self, index: usize, total_lines: usize, audio_bytes: usize) {
//!         let done = self.0.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("line {index} ({audio_bytes} bytes), {done}/{total_lines} done");
//!     }
//! }
//! ```

/// Called by narration as it processes each dialogue line.
///
/// Every method has a no-op default. `index` is the 0-based position of the
/// line in the script.
pub trait NarrationProgressCallback: Send + Sync {
    /// Called once before the first line is sent.
    fn on_narration_start(&self, total_lines: usize) {
        let _ = total_lines;
    }

    /// Called just before a line is sent to the speech backend.
    fn on_line_start(&self, index: usize, total_lines: usize) {
        let _ = (index, total_lines);
    }

    /// Called when a line has been synthesised.
    fn on_line_complete(&self, index: usize, total_lines: usize, audio_bytes: usize) {
        let _ = (index, total_lines, audio_bytes);
    }

    /// Called when a line could not be synthesised.
    fn on_line_error(&self, index: usize, total_lines: usize, error: &str) {
        let _ = (index, total_lines, error);
    }

    /// Called once after every line has been attempted.
    fn on_narration_complete(&self, total_lines: usize, success_count: usize) {
        let _ = (total_lines, success_count);
    }
}

/// Ignores every event.
pub struct NoopProgressCallback;

impl NarrationProgressCallback for NoopProgressCallback {}
