//! Marker framing: unique start/end markers and extraction of a command's output from a
//! normalized buffer snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use crate::terminal::PromptDetector;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Prefix of the line carrying the exit status.
const EXIT_CODE_PREFIX: &str = "exit_code:";

/// How many lines after the end marker may hold the exit status.
const EXIT_CODE_WINDOW: usize = 5;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Markers of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    pub start: String,
    pub end: String,

    /// Printed once the hook has been removed again.
    pub done: String,
}

/// Hands out markers from a strictly increasing microsecond clock.
#[derive(Debug, Default)]
pub struct MarkerClock {
    last: AtomicU64,
}

/// A completed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Text between the markers.
    pub output: String,

    /// Exit status reported after the end marker.
    pub exit_code: Option<i32>,

    /// Prompt that preceded the command.
    pub prompt: Option<String>,
}

/// Progress of a command as seen in one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameScan {
    /// The start marker has not been printed yet.
    NotStarted,

    /// The start marker is visible, the end marker is not.
    Started,

    /// Both markers are visible.
    Complete(Frame),
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Markers {
    /// Markers stamped with the given microsecond timestamp.
    pub fn from_micros(micros: u64) -> Self {
        Self {
            start: format!("__EXEC_S_{}__", micros),
            end: format!("__EXEC_E_{}__", micros),
            done: format!("__EXEC_D_{}__", micros),
        }
    }
}

impl MarkerClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next pair of markers. Never repeats, even for calls within the same microsecond.
    pub fn next(&self) -> Markers {
        let now = Utc::now().timestamp_micros().max(0) as u64;
        let stamp = match self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last + 1))
            }) {
            Ok(last) | Err(last) => now.max(last + 1),
        };
        Markers::from_micros(stamp)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Locate the command's frame in a normalized snapshot.
///
/// The start line is the last line beginning with the start marker, so stale frames from
/// earlier runs are skipped. The echoed command line contains the marker too, but never at the
/// start of the line. `lead` is the text the dispatched line starts with up to the marker
/// (e.g. `echo "`), used to split the prompt off the echoed command.
pub fn scan(text: &str, markers: &Markers, lead: &str, prompts: &PromptDetector) -> FrameScan {
    let lines: Vec<&str> = text.split('\n').collect();

    let Some(start_idx) = lines
        .iter()
        .rposition(|l| l.trim_start().starts_with(&markers.start))
    else {
        return FrameScan::NotStarted;
    };

    let Some(end_rel) = lines[start_idx + 1..]
        .iter()
        .position(|l| l.contains(&markers.end))
    else {
        return FrameScan::Started;
    };
    let end_idx = start_idx + 1 + end_rel;

    let exit_code = lines[end_idx + 1..]
        .iter()
        .take(EXIT_CODE_WINDOW)
        .find_map(|l| parse_exit_code(l));

    // The status line follows the marker in a separate write; wait for it unless the shell has
    // clearly moved on.
    if exit_code.is_none() && lines[end_idx + 1..].iter().all(|l| l.trim().is_empty()) {
        return FrameScan::Started;
    }

    let mut body: Vec<&str> = lines[start_idx + 1..end_idx]
        .iter()
        .copied()
        .filter(|l| !l.contains(&markers.start) && !l.contains(&markers.end))
        .collect();

    // Output without a trailing newline shares its last line with the end marker.
    if let Some((tail, _)) = lines[end_idx].split_once(&markers.end) {
        if !tail.trim().is_empty() {
            body.push(tail);
        }
    }

    FrameScan::Complete(Frame {
        output: body.join("\n").trim().to_string(),
        exit_code,
        prompt: find_prompt(&lines[..start_idx], markers, lead, prompts),
    })
}

/// Output of a command that never finished: everything after its start marker.
///
/// Falls back to the text after the first line mentioning the marker (the echoed command), and
/// to the whole snapshot when the marker is nowhere to be seen.
pub fn extract_partial(text: &str, markers: &Markers) -> String {
    let lines: Vec<&str> = text.split('\n').collect();

    let from = lines
        .iter()
        .rposition(|l| l.trim_start().starts_with(&markers.start))
        .or_else(|| lines.iter().position(|l| l.contains(&markers.start)));

    match from {
        Some(idx) => lines[idx + 1..]
            .iter()
            .copied()
            .filter(|l| !l.contains(&markers.start) && !l.contains(&markers.end))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string(),
        None => text.trim().to_string(),
    }
}

/// Parse `exit_code: N`, ignoring anything after the number (such as a prompt drawn on the
/// same line).
pub fn parse_exit_code(line: &str) -> Option<i32> {
    let rest = line.trim_start().strip_prefix(EXIT_CODE_PREFIX)?.trim_start();
    let digits = rest
        .char_indices()
        .take_while(|&(i, c)| c.is_ascii_digit() || (i == 0 && c == '-'))
        .map(|(_, c)| c)
        .collect::<String>();
    digits.parse().ok()
}

/// Prompt text from the echoed command line nearest to the start marker.
fn find_prompt(
    before: &[&str],
    markers: &Markers,
    lead: &str,
    prompts: &PromptDetector,
) -> Option<String> {
    let echoed = before.iter().rev().find(|l| l.contains(&markers.start))?;

    let head = format!("{}{}", lead, markers.start);
    let cut = echoed
        .find(&head)
        .or_else(|| echoed.find(&markers.start))
        .map(|idx| echoed[..idx].trim());

    match cut {
        Some(prompt) if !prompt.is_empty() => Some(prompt.to_string()),
        _ => prompts.prompt_of(echoed),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
