//! MCP server implementation.

use std::sync::Arc;

use rmcp::handler::server::wrapper::Parameters;
use rmcp::{
    handler::server::tool::ToolRouter, model::ServerCapabilities, model::ServerInfo,
    model::{Implementation, ProtocolVersion},
    tool, tool_handler, tool_router, ErrorData as McpError, Json, ServerHandler,
};

use crate::config::GlobalConfig;
use crate::exec::{ExecEngine, ExecOutcome};
use crate::host::{LocalHost, OpenOptions};
use crate::tools::{
    handle_abort_command, handle_close_terminal, handle_exec_command, handle_get_command_output,
    handle_get_terminal_buffer, handle_interrupt_command, handle_list_sessions,
    handle_open_terminal, AbortCommandInput, AbortCommandOutput, CloseTerminalInput,
    CloseTerminalOutput, ExecCommandInput, GetCommandOutputInput, GetCommandOutputOutput,
    GetTerminalBufferInput, GetTerminalBufferOutput, InterruptCommandInput,
    InterruptCommandOutput, ListSessionsOutput, OpenTerminalInput, OpenTerminalOutput, ToolReply,
};
use crate::types;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Terminal exec MCP server.
#[derive(Clone)]
pub struct Server {
    tool_router: ToolRouter<Self>,
    engine: Arc<ExecEngine>,
    host: Arc<LocalHost>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Server {
    /// Create a server with its own local host.
    pub fn with_config(config: GlobalConfig) -> types::Result<Self> {
        config.validate()?;
        let host = Arc::new(LocalHost::new(config.local.clone()));
        let engine = Arc::new(ExecEngine::new(host.clone(), config.exec)?);
        Ok(Self {
            tool_router: Self::tool_router(),
            engine,
            host,
        })
    }

    /// Open the startup terminal if the configuration asks for one.
    pub fn open_initial_terminal(&self) -> types::Result<()> {
        if self.host.config().open_on_start {
            let opened = self.host.open(OpenOptions::default())?;
            tracing::info!(tab = %opened.key, program = %opened.program, "startup terminal ready");
        }
        Ok(())
    }

    /// Get the execution engine.
    pub fn engine(&self) -> &Arc<ExecEngine> {
        &self.engine
    }

    /// Get the local host.
    pub fn host(&self) -> &Arc<LocalHost> {
        &self.host
    }

    /// Abort running commands and terminate every terminal.
    pub async fn shutdown(&self) {
        self.engine.tracker().abort_all();
        let host = self.host.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || host.shutdown()).await {
            tracing::warn!(error = %e, "terminal shutdown task failed");
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations: Tool Router
//--------------------------------------------------------------------------------------------------

#[tool_router]
impl Server {
    /// List terminal sessions.
    #[tool(
        name = "list_sessions",
        description = "List all terminal sessions with their ids, titles, focus state and any running command."
    )]
    async fn list_sessions(&self) -> Result<Json<ToolReply<ListSessionsOutput>>, McpError> {
        handle_list_sessions(self.engine.clone()).await
    }

    /// Execute a command and wait for it to finish.
    #[tool(
        name = "exec_command",
        description = "Execute a shell command in a terminal session and return its output, exit code and prompt. Uses the focused session when tabId is omitted. Output longer than 250 lines is truncated; use get_command_output with the returned outputId to page through it."
    )]
    async fn exec_command(
        &self,
        params: Parameters<ExecCommandInput>,
    ) -> Result<Json<ToolReply<ExecOutcome>>, McpError> {
        handle_exec_command(self.engine.clone(), params).await
    }

    /// Abort a running command.
    #[tool(
        name = "abort_command",
        description = "Stop waiting for a running command. Without tabId every running command is aborted. The program itself keeps running; use interrupt_command to send Ctrl+C."
    )]
    async fn abort_command(
        &self,
        params: Parameters<AbortCommandInput>,
    ) -> Result<Json<ToolReply<AbortCommandOutput>>, McpError> {
        handle_abort_command(self.engine.clone(), params).await
    }

    /// Send Ctrl+C to a session.
    #[tool(
        name = "interrupt_command",
        description = "Send Ctrl+C to a terminal session to interrupt the program running in it."
    )]
    async fn interrupt_command(
        &self,
        params: Parameters<InterruptCommandInput>,
    ) -> Result<Json<ToolReply<InterruptCommandOutput>>, McpError> {
        handle_interrupt_command(self.engine.clone(), params).await
    }

    /// Page through stored command output.
    #[tool(
        name = "get_command_output",
        description = "Read the full output of a previous exec_command by outputId, a page of lines at a time."
    )]
    async fn get_command_output(
        &self,
        params: Parameters<GetCommandOutputInput>,
    ) -> Result<Json<ToolReply<GetCommandOutputOutput>>, McpError> {
        handle_get_command_output(self.engine.clone(), params).await
    }

    /// Read a session's buffer.
    #[tool(
        name = "get_terminal_buffer",
        description = "Read lines from a terminal session's buffer, counted from the bottom (startLine 1 is the last non-blank line). endLine -1 returns up to 200 lines."
    )]
    async fn get_terminal_buffer(
        &self,
        params: Parameters<GetTerminalBufferInput>,
    ) -> Result<Json<ToolReply<GetTerminalBufferOutput>>, McpError> {
        handle_get_terminal_buffer(self.engine.clone(), params).await
    }

    /// Open a new terminal.
    #[tool(
        name = "open_terminal",
        description = "Open a new terminal running a shell (or any program), optionally split beside an existing session. The new terminal takes focus."
    )]
    async fn open_terminal(
        &self,
        params: Parameters<OpenTerminalInput>,
    ) -> Result<Json<ToolReply<OpenTerminalOutput>>, McpError> {
        handle_open_terminal(self.engine.clone(), self.host.clone(), params).await
    }

    /// Close a terminal.
    #[tool(
        name = "close_terminal",
        description = "Close a terminal session and terminate its process."
    )]
    async fn close_terminal(
        &self,
        params: Parameters<CloseTerminalInput>,
    ) -> Result<Json<ToolReply<CloseTerminalOutput>>, McpError> {
        handle_close_terminal(self.engine.clone(), self.host.clone(), params).await
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations: Server Handler
//--------------------------------------------------------------------------------------------------

#[tool_handler]
impl ServerHandler for Server {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Terminal command execution server. Run shell commands with exec_command and \
                 receive their output and exit code. Find sessions with list_sessions, stop \
                 waiting with abort_command, send Ctrl+C with interrupt_command, page long \
                 output with get_command_output and inspect a terminal with get_terminal_buffer."
                    .to_string(),
            ),
        }
    }
}
