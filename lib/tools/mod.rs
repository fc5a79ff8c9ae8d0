//! MCP tool implementations.

mod abort_command;
mod close_terminal;
mod exec_command;
mod get_command_output;
mod get_terminal_buffer;
mod interrupt_command;
mod list_sessions;
mod open_terminal;
mod reply;

pub use abort_command::{handle_abort_command, AbortCommandInput, AbortCommandOutput};
pub use close_terminal::{handle_close_terminal, CloseTerminalInput, CloseTerminalOutput};
pub use exec_command::{handle_exec_command, ExecCommandInput};
pub use get_command_output::{
    handle_get_command_output, GetCommandOutputInput, GetCommandOutputOutput,
};
pub use get_terminal_buffer::{
    buffer_window, handle_get_terminal_buffer, BufferWindow, GetTerminalBufferInput,
    GetTerminalBufferOutput,
};
pub use interrupt_command::{
    handle_interrupt_command, InterruptCommandInput, InterruptCommandOutput,
};
pub use list_sessions::{handle_list_sessions, ListSessionsOutput, SessionSummary};
pub use open_terminal::{handle_open_terminal, OpenTerminalInput, OpenTerminalOutput};
pub use reply::{ReplyStatus, ToolReply};
