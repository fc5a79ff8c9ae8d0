//! Shell family detection from terminal output.

use crate::terminal::strip_ansi;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Prefix of the line the detection script prints.
pub const REPORT_PREFIX: &str = "SHELL_TYPE=";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Single-line script that prints `SHELL_TYPE=<id>` for the running shell.
///
/// Checks run in priority order: bash, zsh, a POSIX `sh` (by invocation name or a set `PS1`),
/// and `unknown` otherwise.
pub fn detection_script() -> String {
    format!(
        "if [ -n \"$BASH_VERSION\" ]; then echo \"{p}bash\"; \
         elif [ -n \"$ZSH_VERSION\" ]; then echo \"{p}zsh\"; \
         elif [ \"$0\" = \"sh\" ] || [ \"$0\" = \"-sh\" ] || [ -n \"$PS1\" ]; then echo \"{p}sh\"; \
         else echo \"{p}unknown\"; fi",
        p = REPORT_PREFIX
    )
}

/// Identify the shell from a buffer snapshot.
///
/// The most recent report wins, so reports from earlier executions are shadowed by the latest
/// one. Returns `"unknown"` when no report is present.
pub fn detect_type(snapshot: &str) -> String {
    let text = strip_ansi(snapshot);
    text.lines()
        .rev()
        .map(str::trim)
        .find_map(|line| line.strip_prefix(REPORT_PREFIX))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

/// Count the detection reports present in a buffer snapshot.
pub fn count_reports(snapshot: &str) -> usize {
    strip_ansi(snapshot)
        .lines()
        .filter(|line| line.trim().starts_with(REPORT_PREFIX))
        .count()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_bash() {
        assert_eq!(detect_type("$ \nSHELL_TYPE=bash\n$ "), "bash");
    }

    #[test]
    fn test_latest_report_wins() {
        let snapshot = "SHELL_TYPE=zsh\nsome output\nSHELL_TYPE=bash\n$ ";
        assert_eq!(detect_type(snapshot), "bash");
    }

    #[test]
    fn test_detect_with_escapes() {
        let snapshot = "\x1b[?2004l\r\x1b[32mSHELL_TYPE=zsh\x1b[0m\r\n% ";
        assert_eq!(detect_type(snapshot), "zsh");
    }

    #[test]
    fn test_no_report_is_unknown() {
        assert_eq!(detect_type(""), "unknown");
        assert_eq!(detect_type("$ ls\nfile.txt\n$ "), "unknown");
        assert_eq!(detect_type("SHELL_TYPE=\n"), "unknown");
    }

    #[test]
    fn test_report_must_start_line() {
        assert_eq!(detect_type("echo SHELL_TYPE=bash\n"), "unknown");
    }

    #[test]
    fn test_count_reports() {
        assert_eq!(count_reports("x\nSHELL_TYPE=sh\r\ny\nSHELL_TYPE=bash\n"), 2);
        assert_eq!(count_reports("nothing here"), 0);
    }

    #[test]
    fn test_script_is_single_line() {
        let script = detection_script();
        assert!(!script.contains('\n'));
        assert!(script.contains("$BASH_VERSION"));
        assert!(script.contains("$ZSH_VERSION"));
        // The script's own text never reads as a report.
        assert_eq!(count_reports(&script), 0);
    }
}
