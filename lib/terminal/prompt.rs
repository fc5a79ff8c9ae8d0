//! Shell prompt recognition.

use regex::Regex;

use crate::types::Result;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Recognises the prompt portion of a terminal line using a configurable pattern.
///
/// The pattern's first capture group (or the whole match when it has none) is the prompt.
#[derive(Debug, Clone)]
pub struct PromptDetector {
    pattern: Regex,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl PromptDetector {
    /// Create a new prompt detector with the given pattern.
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)?;
        Ok(Self { pattern: regex })
    }

    /// Extract the prompt at the start of a line, e.g. `user@host:~$` from
    /// `user@host:~$ ls -la`.
    pub fn prompt_of(&self, line: &str) -> Option<String> {
        let caps = self.pattern.captures(line)?;
        let matched = caps.get(1).or_else(|| caps.get(0))?;
        let prompt = matched.as_str().trim();
        (!prompt.is_empty()).then(|| prompt.to_string())
    }

    /// Get the pattern string.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for PromptDetector {
    fn default() -> Self {
        Self {
            pattern: Regex::new(r"^(.*?[$#%>])\s").expect("default prompt pattern is valid"),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bash_prompt() {
        let detector = PromptDetector::default();
        assert_eq!(
            detector.prompt_of("user@host:~$ ls -la").as_deref(),
            Some("user@host:~$")
        );
    }

    #[test]
    fn test_root_and_zsh_prompts() {
        let detector = PromptDetector::default();
        assert_eq!(detector.prompt_of("root@box:/# whoami").as_deref(), Some("root@box:/#"));
        assert_eq!(detector.prompt_of("host% make").as_deref(), Some("host%"));
    }

    #[test]
    fn test_no_prompt() {
        let detector = PromptDetector::default();
        assert_eq!(detector.prompt_of("plain output"), None);
        assert_eq!(detector.prompt_of(""), None);
    }

    #[test]
    fn test_custom_pattern() {
        let detector = PromptDetector::new(r"^>>>").unwrap();
        assert_eq!(detector.prompt_of(">>> print(1)").as_deref(), Some(">>>"));
        assert_eq!(detector.prompt_of("$ ls"), None);
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(PromptDetector::new("(").is_err());
    }
}
