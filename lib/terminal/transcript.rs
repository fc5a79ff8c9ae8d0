//! Line-oriented transcript of terminal output.
//!
//! The local host keeps one transcript per terminal and serializes it on demand. It is not a
//! full screen model: vertical cursor motion is ignored and output written while the alternate
//! screen is active is discarded, which keeps the transcript close to what a scrollback shows.

use std::collections::VecDeque;

use vte::{Params, Parser, Perform};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const TAB_WIDTH: usize = 8;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Terminal output folded into lines, with VT sequences interpreted.
pub struct Transcript {
    parser: Parser,
    lines: LineBuffer,
}

/// Completed lines plus the line under the cursor.
#[derive(Debug)]
struct LineBuffer {
    done: VecDeque<String>,
    current: Vec<char>,
    col: usize,
    limit: usize,
    alternate: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Transcript {
    /// Create a transcript keeping at most `limit` completed lines.
    pub fn new(limit: usize) -> Self {
        Self {
            parser: Parser::new(),
            lines: LineBuffer {
                done: VecDeque::new(),
                current: Vec::new(),
                col: 0,
                limit: limit.max(1),
                alternate: false,
            },
        }
    }

    /// Feed raw PTY output.
    pub fn process(&mut self, data: &[u8]) {
        for byte in data {
            self.parser.advance(&mut self.lines, *byte);
        }
    }

    /// Render every retained line, including the partial line under the cursor.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines.done {
            out.push_str(line);
            out.push('\n');
        }
        out.extend(self.lines.current.iter());
        out
    }

    /// Number of completed lines retained.
    pub fn len(&self) -> usize {
        self.lines.done.len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.lines.done.is_empty() && self.lines.current.is_empty()
    }
}

impl LineBuffer {
    fn put(&mut self, c: char) {
        if self.current.len() < self.col {
            self.current.resize(self.col, ' ');
        }
        if self.col < self.current.len() {
            self.current[self.col] = c;
        } else {
            self.current.push(c);
        }
        self.col += 1;
    }

    fn commit(&mut self) {
        let line: String = self.current.drain(..).collect();
        self.done.push_back(line.trim_end().to_string());
        while self.done.len() > self.limit {
            self.done.pop_front();
        }
        self.col = 0;
    }

    fn erase_line(&mut self, mode: u16) {
        match mode {
            0 => self.current.truncate(self.col),
            1 => {
                let end = (self.col + 1).min(self.current.len());
                for c in &mut self.current[..end] {
                    *c = ' ';
                }
            }
            2 => self.current.clear(),
            _ => {}
        }
    }

    fn param(params: &Params, idx: usize, default: u16) -> u16 {
        params
            .iter()
            .nth(idx)
            .and_then(|p| p.first().copied())
            .filter(|&v| v != 0)
            .unwrap_or(default)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Perform for LineBuffer {
    fn print(&mut self, c: char) {
        if !self.alternate {
            self.put(c);
        }
    }

    fn execute(&mut self, byte: u8) {
        if self.alternate {
            return;
        }
        match byte {
            0x08 => self.col = self.col.saturating_sub(1),
            0x09 => self.col = (self.col / TAB_WIDTH + 1) * TAB_WIDTH,
            0x0A..=0x0C => self.commit(),
            0x0D => self.col = 0,
            _ => {}
        }
    }

    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], _ignore: bool, action: char) {
        if intermediates.first() == Some(&b'?') {
            if matches!(action, 'h' | 'l') {
                let alternate = params
                    .iter()
                    .filter_map(|p| p.first().copied())
                    .any(|mode| matches!(mode, 47 | 1047 | 1049));
                if alternate {
                    self.alternate = action == 'h';
                }
            }
            return;
        }
        if self.alternate {
            return;
        }

        match action {
            'C' => self.col += Self::param(params, 0, 1) as usize,
            'D' => self.col = self.col.saturating_sub(Self::param(params, 0, 1) as usize),
            'G' => self.col = Self::param(params, 0, 1) as usize - 1,
            'K' => self.erase_line(params.iter().next().and_then(|p| p.first().copied()).unwrap_or(0)),
            'P' => {
                let n = Self::param(params, 0, 1) as usize;
                if self.col < self.current.len() {
                    let end = (self.col + n).min(self.current.len());
                    self.current.drain(self.col..end);
                }
            }
            '@' => {
                let n = Self::param(params, 0, 1) as usize;
                if self.col < self.current.len() {
                    for _ in 0..n {
                        self.current.insert(self.col, ' ');
                    }
                }
            }
            _ => {}
        }
    }
}

impl std::fmt::Debug for Transcript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcript")
            .field("lines", &self.lines.done.len())
            .field("alternate", &self.lines.alternate)
            .finish()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(data: &str) -> Transcript {
        let mut transcript = Transcript::new(100);
        transcript.process(data.as_bytes());
        transcript
    }

    #[test]
    fn test_plain_lines() {
        let t = feed("hello\r\nworld\r\n$ ");
        assert_eq!(t.render(), "hello\nworld\n$ ");
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_colors_dropped() {
        let t = feed("\x1b[32mgreen\x1b[0m\r\n");
        assert_eq!(t.render(), "green\n");
    }

    #[test]
    fn test_carriage_return_overwrites() {
        let t = feed("50%\r100%\r\n");
        assert_eq!(t.render(), "100%\n");
    }

    #[test]
    fn test_readline_redraw() {
        // Prompt, a typo, then readline rewrites the line and clears the tail.
        let t = feed("$ ech\x08\x08\x08\x1b[Kecho hi\r\nhi\r\n");
        assert_eq!(t.render(), "$ echo hi\nhi\n");
    }

    #[test]
    fn test_backspace_erase() {
        let t = feed("abc\x08\x1b[K\r\n");
        assert_eq!(t.render(), "ab\n");
    }

    #[test]
    fn test_alternate_screen_discarded() {
        let t = feed("before\r\n\x1b[?1049hvim stuff\r\n\x1b[?1049lafter\r\n");
        assert_eq!(t.render(), "before\nafter\n");
    }

    #[test]
    fn test_limit() {
        let mut t = Transcript::new(2);
        t.process(b"a\r\nb\r\nc\r\n");
        assert_eq!(t.render(), "b\nc\n");
    }

    #[test]
    fn test_tab_expansion() {
        let t = feed("a\tb\r\n");
        assert_eq!(t.render(), "a       b\n");
    }
}
