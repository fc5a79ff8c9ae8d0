//! ANSI escape code handling.

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// State machine for stripping ANSI codes.
#[derive(Debug, Default)]
enum StripState {
    #[default]
    Normal,
    Escape,
    /// ESC followed by a charset designator; the next char names the set.
    Charset,
    Csi,
    /// OSC, DCS, SOS, PM and APC strings, terminated by BEL or ST.
    String,
    StringEscape,
    /// A carriage return not yet known to be part of CRLF.
    CarriageReturn,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Strip ANSI escape codes from terminal text, preserving line breaks.
///
/// CRLF pairs collapse to LF so that marker lines compare cleanly. A lone
/// carriage return is kept as-is. Malformed or truncated sequences are dropped
/// up to the point where the input ends.
pub fn strip_ansi(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut state = StripState::Normal;

    for c in input.chars() {
        if let StripState::CarriageReturn = state {
            state = StripState::Normal;
            if c != '\n' {
                result.push('\r');
            }
        }

        match state {
            StripState::Normal | StripState::CarriageReturn => match c {
                '\x1b' => state = StripState::Escape,
                '\r' => state = StripState::CarriageReturn,
                // 8-bit CSI
                '\u{9b}' => state = StripState::Csi,
                '\x07' | '\x00' => {}
                _ => result.push(c),
            },
            StripState::Escape => {
                state = match c {
                    '[' => StripState::Csi,
                    ']' | 'P' | 'X' | '^' | '_' => StripState::String,
                    '(' | ')' | '*' | '+' | '-' | '.' | '/' | '#' | '%' => StripState::Charset,
                    _ => StripState::Normal,
                }
            }
            StripState::Charset => state = StripState::Normal,
            StripState::Csi => {
                // Final byte of a CSI sequence lies in 0x40..=0x7e
                if ('\x40'..='\x7e').contains(&c) {
                    state = StripState::Normal;
                }
            }
            StripState::String => {
                if c == '\x07' {
                    state = StripState::Normal;
                } else if c == '\x1b' {
                    state = StripState::StringEscape;
                }
            }
            StripState::StringEscape => {
                state = if c == '\\' {
                    StripState::Normal
                } else {
                    StripState::String
                };
            }
        }
    }

    if let StripState::CarriageReturn = state {
        result.push('\r');
    }

    result
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_ansi() {
        assert_eq!(strip_ansi("hello world"), "hello world");
    }

    #[test]
    fn test_strip_colors() {
        assert_eq!(strip_ansi("\x1b[31mred\x1b[0m"), "red");
        assert_eq!(strip_ansi("\x1b[38;2;10;20;30mrgb\x1b[m"), "rgb");
    }

    #[test]
    fn test_strip_private_modes() {
        assert_eq!(strip_ansi("\x1b[?2004h$ \x1b[?2004l"), "$ ");
        assert_eq!(strip_ansi("\x1b[?25lhidden cursor\x1b[?25h"), "hidden cursor");
    }

    #[test]
    fn test_strip_osc_bel_and_st() {
        assert_eq!(strip_ansi("\x1b]0;title\x07content"), "content");
        assert_eq!(strip_ansi("\x1b]633;A\x1b\\content"), "content");
    }

    #[test]
    fn test_strip_dcs() {
        assert_eq!(strip_ansi("a\x1bPq#0;2;0;0;0\x1b\\b"), "ab");
    }

    #[test]
    fn test_charset_designation() {
        assert_eq!(strip_ansi("\x1b(Bplain"), "plain");
    }

    #[test]
    fn test_crlf_collapses() {
        assert_eq!(strip_ansi("line1\r\nline2\r\n"), "line1\nline2\n");
    }

    #[test]
    fn test_lone_carriage_return_kept() {
        assert_eq!(strip_ansi("50%\r100%"), "50%\r100%");
        assert_eq!(strip_ansi("trailing\r"), "trailing\r");
    }

    #[test]
    fn test_preserve_newlines() {
        let input = "line1\n\x1b[32mline2\x1b[0m\nline3";
        assert_eq!(strip_ansi(input), "line1\nline2\nline3");
    }

    #[test]
    fn test_truncated_sequence() {
        assert_eq!(strip_ansi("ok\x1b[3"), "ok");
    }
}
