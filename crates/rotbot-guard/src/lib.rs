//! Multi-layer safety filtering for every channel.
//!
//! All checks are regex/keyword/heuristic based — no model call sits on the
//! hot path. Three layers share one compiled pattern compendium:
//!
//! - input screening with per-user probe rate limiting ([`InputFilter`])
//! - output redaction and heavy-violation replacement ([`filter_output`])
//! - log sanitation ([`sanitize_for_logging`])

mod input;
mod output;
mod patterns;
mod sanitize;
mod tracker;

pub use input::{InputFilter, InputVerdict, ThreatLevel};
pub use output::{filter_output, OutputVerdict, REFUSAL_TEXT};
pub use sanitize::sanitize_for_logging;
pub use tracker::{ProbeTracker, PROBE_BLOCK_DURATION_SECS, PROBE_THRESHOLD, PROBE_WINDOW_SECS};
