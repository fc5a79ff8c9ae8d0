//! Shell-family hook scripts and the registry that resolves them.
//!
//! Every script is produced as a single line so it can be fed to `read -r` and `eval`'d
//! without ever being echoed as a command line.

use std::collections::HashMap;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A shell family with a known way of reporting command completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellKind {
    /// Hooks `PROMPT_COMMAND`; recognises its command through `history 1`.
    Bash,

    /// Hooks `precmd_functions`; recognises its command through `fc -ln -1`.
    Zsh,

    /// Wraps `PS1` in a command substitution guarded by a flag file.
    Sh,

    /// Detection failed; behaves exactly like [`ShellKind::Sh`].
    Unknown,
}

/// Maps detected shell identifiers to shell families.
#[derive(Debug, Clone)]
pub struct ShellRegistry {
    strategies: HashMap<String, ShellKind>,
    fallback: ShellKind,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ShellKind {
    /// All built-in families.
    pub const ALL: [ShellKind; 4] = [Self::Bash, Self::Zsh, Self::Sh, Self::Unknown];

    /// Identifier printed by the detection script.
    pub fn id(self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Zsh => "zsh",
            Self::Sh => "sh",
            Self::Unknown => "unknown",
        }
    }

    /// Script that arms a one-shot hook printing `end_marker` and `exit_code: N` at the first
    /// prompt following the command tagged with `start_marker`.
    pub fn setup_script(self, start_marker: &str, end_marker: &str) -> String {
        match self {
            Self::Bash => format!(
                "__EXEC_MARKER_EMITTED=0; \
                 __exec_post_command() {{ local exit_code=$?; \
                 if [ \"$__EXEC_MARKER_EMITTED\" -eq 0 ]; then \
                 local last_cmd; last_cmd=$(HISTTIMEFORMAT='' history 1); \
                 if [[ \"$last_cmd\" == *\"{start}\"* ]]; then \
                 __EXEC_MARKER_EMITTED=1; echo \"{end}\"; echo \"exit_code: $exit_code\"; \
                 fi; fi; return $exit_code; }}; \
                 if [ -z \"${{__EXEC_OLD_PROMPT_COMMAND+x}}\" ]; then \
                 __EXEC_OLD_PROMPT_COMMAND=\"$PROMPT_COMMAND\"; \
                 PROMPT_COMMAND=\"__exec_post_command${{PROMPT_COMMAND:+;$PROMPT_COMMAND}}\"; fi",
                start = start_marker,
                end = end_marker,
            ),
            Self::Zsh => format!(
                "__EXEC_MARKER_EMITTED=0; \
                 __exec_post_command() {{ local exit_code=$?; \
                 if [[ \"$__EXEC_MARKER_EMITTED\" -eq 0 ]]; then \
                 local last_cmd; last_cmd=$(fc -ln -1); \
                 if [[ \"$last_cmd\" == *\"{start}\"* ]]; then \
                 __EXEC_MARKER_EMITTED=1; echo \"{end}\"; echo \"exit_code: $exit_code\"; \
                 fi; fi; }}; \
                 precmd_functions=(__exec_post_command ${{precmd_functions:#__exec_post_command}})",
                start = start_marker,
                end = end_marker,
            ),
            Self::Sh | Self::Unknown => format!(
                "__EXEC_CMD_FLAG=\"${{TMPDIR:-/tmp}}/exec_cmd_$$\"; rm -f \"$__EXEC_CMD_FLAG\"; \
                 __exec_post_command() {{ __exec_status=$?; \
                 if [ -f \"$__EXEC_CMD_FLAG\" ]; then rm -f \"$__EXEC_CMD_FLAG\"; \
                 echo \"{end}\"; echo \"exit_code: $__exec_status\"; fi; }}; \
                 if [ -z \"${{__EXEC_OLD_PS1+x}}\" ]; then \
                 __EXEC_OLD_PS1=\"$PS1\"; PS1='$(__exec_post_command)'\"$PS1\"; fi",
                end = end_marker,
            ),
        }
    }

    /// Script that removes every trace of [`ShellKind::setup_script`].
    ///
    /// Saved prompt state is restored only when a saved copy exists, so running cleanup
    /// without a prior setup, or twice, leaves the session untouched. Setup in turn saves the
    /// prompt state only when no saved copy exists, so a hook is never saved as user state.
    pub fn cleanup_script(self) -> String {
        match self {
            Self::Bash => "if [ -n \"${__EXEC_OLD_PROMPT_COMMAND+x}\" ]; then \
                 PROMPT_COMMAND=\"$__EXEC_OLD_PROMPT_COMMAND\"; fi; \
                 unset __EXEC_OLD_PROMPT_COMMAND __EXEC_MARKER_EMITTED __exec_ds __exec_ss; \
                 unset -f __exec_post_command 2>/dev/null"
                .to_string(),
            Self::Zsh => "precmd_functions=(${precmd_functions:#__exec_post_command}); \
                 unset __EXEC_MARKER_EMITTED __exec_ds __exec_ss; \
                 unfunction __exec_post_command 2>/dev/null"
                .to_string(),
            Self::Sh | Self::Unknown => "if [ -n \"${__EXEC_OLD_PS1+x}\" ]; then \
                 PS1=\"$__EXEC_OLD_PS1\"; unset __EXEC_OLD_PS1; fi; \
                 if [ -n \"$__EXEC_CMD_FLAG\" ]; then rm -f \"$__EXEC_CMD_FLAG\"; fi; \
                 unset __EXEC_CMD_FLAG __exec_status __exec_ds __exec_ss; \
                 unset -f __exec_post_command 2>/dev/null"
                .to_string(),
        }
    }

    /// Text placed immediately before the start-marker echo.
    pub fn command_prefix(self) -> &'static str {
        match self {
            Self::Bash | Self::Zsh => "",
            Self::Sh | Self::Unknown => "touch \"$__EXEC_CMD_FLAG\"; ",
        }
    }
}

impl ShellRegistry {
    /// Create a registry with the built-in families and common aliases.
    pub fn new() -> Self {
        let mut registry = Self {
            strategies: HashMap::new(),
            fallback: ShellKind::Unknown,
        };
        for kind in ShellKind::ALL {
            registry.register(kind);
        }
        registry.alias("dash", ShellKind::Sh);
        registry.alias("ash", ShellKind::Sh);
        registry.alias("ksh", ShellKind::Sh);
        registry
    }

    /// Register a family under its own identifier.
    pub fn register(&mut self, kind: ShellKind) {
        self.strategies.insert(kind.id().to_string(), kind);
    }

    /// Register an additional identifier for an existing family.
    pub fn alias(&mut self, name: &str, kind: ShellKind) {
        self.strategies.insert(normalize(name), kind);
    }

    /// Resolve a detected identifier, falling back to [`ShellKind::Unknown`].
    pub fn get(&self, shell_id: &str) -> ShellKind {
        self.strategies
            .get(&normalize(shell_id))
            .copied()
            .unwrap_or(self.fallback)
    }

    /// The family used when an identifier is not registered.
    pub fn fallback(&self) -> ShellKind {
        self.fallback
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for ShellRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ShellKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn normalize(id: &str) -> String {
    id.trim().to_lowercase()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const START: &str = "__EXEC_S_1700000000000001__";
    const END: &str = "__EXEC_E_1700000000000001__";

    #[test]
    fn test_lookup_normalizes() {
        let registry = ShellRegistry::new();
        assert_eq!(registry.get("bash"), ShellKind::Bash);
        assert_eq!(registry.get("  ZSH \r"), ShellKind::Zsh);
        assert_eq!(registry.get("dash"), ShellKind::Sh);
    }

    #[test]
    fn test_lookup_falls_back() {
        let registry = ShellRegistry::new();
        assert_eq!(registry.get("fish"), ShellKind::Unknown);
        assert_eq!(registry.get(""), ShellKind::Unknown);
        assert_eq!(registry.fallback(), ShellKind::Unknown);
    }

    #[test]
    fn test_scripts_are_single_line() {
        for kind in ShellKind::ALL {
            assert!(!kind.setup_script(START, END).contains('\n'), "{}", kind);
            assert!(!kind.cleanup_script().contains('\n'), "{}", kind);
        }
    }

    #[test]
    fn test_setup_emits_end_marker_and_exit_code() {
        for kind in ShellKind::ALL {
            let script = kind.setup_script(START, END);
            assert!(script.contains(&format!("echo \"{}\"", END)), "{}", kind);
            assert!(script.contains("exit_code: $"), "{}", kind);
        }
    }

    #[test]
    fn test_history_shells_match_start_marker() {
        assert!(ShellKind::Bash.setup_script(START, END).contains("history 1"));
        assert!(ShellKind::Bash.setup_script(START, END).contains(START));
        assert!(ShellKind::Zsh.setup_script(START, END).contains("fc -ln -1"));
        assert!(ShellKind::Zsh.setup_script(START, END).contains(START));
    }

    #[test]
    fn test_hooks_are_guarded() {
        assert!(ShellKind::Bash
            .setup_script(START, END)
            .contains("__EXEC_MARKER_EMITTED=1"));
        assert!(ShellKind::Zsh
            .setup_script(START, END)
            .contains("__EXEC_MARKER_EMITTED=1"));
        // The flag file is consumed when the hook fires.
        assert!(ShellKind::Sh
            .setup_script(START, END)
            .contains("then rm -f \"$__EXEC_CMD_FLAG\"; echo"));
    }

    #[test]
    fn test_cleanup_restores_prompt_state() {
        assert!(ShellKind::Bash
            .cleanup_script()
            .contains("PROMPT_COMMAND=\"$__EXEC_OLD_PROMPT_COMMAND\""));
        assert!(ShellKind::Zsh
            .cleanup_script()
            .contains("${precmd_functions:#__exec_post_command}"));
        assert!(ShellKind::Sh.cleanup_script().contains("PS1=\"$__EXEC_OLD_PS1\""));
    }

    #[test]
    fn test_cleanup_unsets_helpers() {
        for kind in ShellKind::ALL {
            assert!(kind.cleanup_script().contains("__exec_post_command"), "{}", kind);
        }
    }

    #[test]
    fn test_cleanup_unsets_reader_variables() {
        for kind in ShellKind::ALL {
            assert!(kind.cleanup_script().contains("__exec_ds __exec_ss"), "{}", kind);
        }
    }

    #[test]
    fn test_setup_saves_prompt_state_once() {
        assert!(ShellKind::Bash
            .setup_script(START, END)
            .contains("if [ -z \"${__EXEC_OLD_PROMPT_COMMAND+x}\" ]; then"));
        assert!(ShellKind::Sh
            .setup_script(START, END)
            .contains("if [ -z \"${__EXEC_OLD_PS1+x}\" ]; then"));
        // The hook is never listed twice.
        assert!(ShellKind::Zsh
            .setup_script(START, END)
            .contains("(__exec_post_command ${precmd_functions:#__exec_post_command})"));
    }

    #[test]
    fn test_command_prefix() {
        assert_eq!(ShellKind::Bash.command_prefix(), "");
        assert_eq!(ShellKind::Zsh.command_prefix(), "");
        assert!(ShellKind::Sh.command_prefix().starts_with("touch"));
        assert_eq!(
            ShellKind::Unknown.command_prefix(),
            ShellKind::Sh.command_prefix()
        );
    }

    #[test]
    fn test_unknown_matches_sh() {
        assert_eq!(
            ShellKind::Unknown.setup_script(START, END),
            ShellKind::Sh.setup_script(START, END)
        );
        assert_eq!(ShellKind::Unknown.cleanup_script(), ShellKind::Sh.cleanup_script());
    }
}
