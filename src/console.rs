//! Interactive command loop.
//!
//! Reads commands from stdin and frames from the connection, strictly one at
//! a time, and prints what the engine reports.

use std::io::Write;

use anyhow::Result;
use jdb_config::Config;
use jdb_engine::command::HELP;
use jdb_engine::{
    Command, CommandError, DeleteTarget, EngineEvent, ProtocolEngine, Resolution, Resume, StopKind,
};
use jdb_proto::Endianness;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use crate::transport::{self, ChannelTransport, FrameReceiver};

/// Whether the loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Debugger front end bound to one output sink.
pub struct Console<W: Write> {
    engine: ProtocolEngine<ChannelTransport>,
    inbound: Option<FrameReceiver>,
    config: Config,
    out: W,
}

impl<W: Write> Console<W> {
    pub fn new(config: Config, out: W) -> Self {
        Self {
            engine: ProtocolEngine::new(),
            inbound: None,
            config,
            out,
        }
    }

    #[cfg(test)]
    pub fn engine(&self) -> &ProtocolEngine<ChannelTransport> {
        &self.engine
    }

    #[cfg(test)]
    pub fn output(&self) -> &W {
        &self.out
    }

    /// Run until `quit` or end of input.
    pub async fn run<R>(&mut self, input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        self.prompt()?;
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        debug!("stdin closed");
                        break;
                    };
                    if self.handle_line(&line).await? == Flow::Quit {
                        break;
                    }
                    self.prompt()?;
                }
                frame = next_frame(&mut self.inbound) => match frame {
                    Some(frame) => self.handle_frame(&frame)?,
                    None => {
                        self.inbound = None;
                        self.engine.close();
                        writeln!(self.out, "Connection closed.")?;
                    }
                },
            }
        }
        self.engine.close();
        Ok(())
    }

    fn prompt(&mut self) -> Result<()> {
        write!(self.out, "(jdb) ")?;
        self.out.flush()?;
        Ok(())
    }

    /// Execute one console line.
    pub async fn handle_line(&mut self, line: &str) -> Result<Flow> {
        if line.trim().is_empty() {
            return Ok(Flow::Continue);
        }
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(err) => {
                writeln!(self.out, "Error: {err}")?;
                return Ok(Flow::Continue);
            }
        };
        debug!(?command, "console command");

        let flow = match command {
            Command::Connect(address) => {
                self.connect(address.as_deref()).await?;
                Flow::Continue
            }
            Command::Quit => Flow::Quit,
            other => {
                if let Err(err) = self.execute(other) {
                    writeln!(self.out, "Error: {err}")?;
                }
                Flow::Continue
            }
        };
        self.sync_connection()?;
        Ok(flow)
    }

    /// Open a connection using the configured address, optionally
    /// overridden by `host[:port]`.
    pub async fn connect(&mut self, address: Option<&str>) -> Result<()> {
        let mut connection = self.config.connection.clone();
        if let Some(address) = address {
            if let Err(err) = connection.apply_address(address) {
                writeln!(self.out, "Error: {err}")?;
                return Ok(());
            }
        }
        let address = connection.address();

        let (transport, inbound) = match transport::connect(&address).await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(%address, "connect failed: {err}");
                writeln!(self.out, "Connect to {address} failed: {err}")?;
                return Ok(());
            }
        };
        self.engine.open(transport);
        self.inbound = Some(inbound);
        for spec in &self.config.debugger.breakpoints {
            self.engine.add_pending(spec);
        }
        info!(%address, "connected");
        writeln!(self.out, "Connected to {address}")?;
        Ok(())
    }

    fn execute(&mut self, command: Command) -> Result<(), CommandError> {
        match command {
            Command::Help => self.print(HELP),
            Command::Break { spec, pending } => {
                match self.engine.set_breakpoint(&spec, pending)? {
                    Resolution::Activated(activations) => {
                        for activation in activations {
                            self.print(format_args!(
                                "Breakpoint {} at {}",
                                activation.index, activation.description
                            ));
                        }
                    }
                    Resolution::Pending(entry) => {
                        let index = self.engine.pending_breakpoints().len().saturating_sub(1);
                        self.print(format_args!("Pending breakpoint {index} at {entry}"));
                    }
                    Resolution::NotFound => {
                        return Err(CommandError::BreakpointNotFound(spec));
                    }
                }
            }
            Command::Delete(DeleteTarget::Index(index)) => {
                self.engine.delete_breakpoint(index)?;
                self.print(format_args!("Breakpoint {index} deleted"));
            }
            Command::Delete(DeleteTarget::All) => match self.engine.delete_all()? {
                0 => self.print("No active breakpoints."),
                n => self.print(format_args!("{n} breakpoints deleted")),
            },
            Command::PendingDelete(index) => {
                let entry = self.engine.delete_pending(index)?;
                self.print(format_args!("Pending breakpoint {index} ({entry}) deleted"));
            }
            Command::List => self.list(),
            Command::Stop => self.engine.stop()?,
            Command::Continue => self.engine.resume(Resume::Continue)?,
            Command::Step => self.engine.resume(Resume::Step)?,
            Command::Next => self.engine.resume(Resume::Next)?,
            Command::Eval(expression) => self.engine.eval(&expression)?,
            Command::Backtrace(depth) => {
                let depth = depth.unwrap_or(self.config.debugger.backtrace_depth);
                self.engine.get_backtrace(depth)?;
            }
            Command::Exception(enable) => self.engine.exception_config(enable)?,
            Command::Source => {
                let source = self
                    .engine
                    .current_source()
                    .filter(|source| !source.is_empty())
                    .map(str::to_string);
                match source {
                    Some(source) => self.print(source.trim_end()),
                    None => self.print("No source available."),
                }
            }
            Command::Dump => {
                let dump = self.engine.dump();
                self.print(dump.trim_end());
            }
            Command::Connect(_) | Command::Quit => {}
        }
        Ok(())
    }

    fn list(&mut self) {
        let active = self.engine.active_breakpoints();
        let pending: Vec<String> = self
            .engine
            .pending_breakpoints()
            .iter()
            .map(ToString::to_string)
            .collect();
        if active.is_empty() && pending.is_empty() {
            self.print("No breakpoints");
            return;
        }
        for (index, description) in active {
            self.print(format_args!("{index}: {description}"));
        }
        for (index, spec) in pending.iter().enumerate() {
            self.print(format_args!("pending {index}: {spec}"));
        }
    }

    /// Feed one inbound frame to the engine and report its events.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<()> {
        let events = match self.engine.process(frame) {
            Ok(events) => events,
            Err(err) => {
                self.inbound = None;
                writeln!(self.out, "Connection aborted: {err}")?;
                return Ok(());
            }
        };
        for event in events {
            self.report(event)?;
        }
        self.sync_connection()
    }

    fn report(&mut self, event: EngineEvent) -> Result<()> {
        match event {
            EngineEvent::Configured(config) => {
                let order = match config.endianness {
                    Endianness::Little => "little",
                    Endianness::Big => "big",
                };
                writeln!(
                    self.out,
                    "Debugger configured: max message size {}, pointer width {}, {order} endian",
                    config.max_message_size,
                    config.pointer_width.bytes()
                )?;
                if let Some(enable) = self.config.debugger.stop_at_exception {
                    let result = self.engine.exception_config(enable);
                    self.report_error(result)?;
                }
            }
            EngineEvent::ParseUnitCompleted {
                source_name,
                handles,
            } => {
                let name = if source_name.is_empty() {
                    "<unknown>"
                } else {
                    source_name.as_str()
                };
                writeln!(self.out, "Parsed {name} ({} functions)", handles.len())?;
            }
            EngineEvent::ParseAborted => writeln!(self.out, "Parse error, source discarded")?,
            EngineEvent::PendingResolved { spec, indices } => {
                let indices: Vec<String> = indices.iter().map(u32::to_string).collect();
                writeln!(
                    self.out,
                    "Pending breakpoint {spec} resolved as breakpoint {}",
                    indices.join(", ")
                )?;
            }
            EngineEvent::FunctionReleased(handle) => debug!(%handle, "function released"),
            EngineEvent::Stopped { kind, location } => {
                match kind {
                    StopKind::Breakpoint => writeln!(self.out, "Stopped {location}")?,
                    StopKind::Exception => {
                        writeln!(self.out, "Exception throw detected, stopped {location}")?;
                    }
                }
                if self.config.debugger.backtrace_on_stop {
                    let depth = self.config.debugger.backtrace_depth;
                    let result = self.engine.get_backtrace(depth);
                    self.report_error(result)?;
                }
            }
            EngineEvent::Backtrace(frames) => {
                if frames.is_empty() {
                    writeln!(self.out, "Backtrace is empty")?;
                }
                for (depth, location) in frames.iter().enumerate() {
                    writeln!(self.out, "Frame {depth}: {location}")?;
                }
            }
            EngineEvent::EvalResult(text) => writeln!(self.out, "{text}")?,
            EngineEvent::EvalError(text) => writeln!(self.out, "Uncaught exception: {text}")?,
        }
        Ok(())
    }

    fn report_error(&mut self, result: Result<(), CommandError>) -> Result<()> {
        if let Err(err) = result {
            writeln!(self.out, "Error: {err}")?;
        }
        Ok(())
    }

    /// Drop the inbound channel once the engine has closed the connection.
    fn sync_connection(&mut self) -> Result<()> {
        if !self.engine.is_open() && self.inbound.take().is_some() {
            writeln!(self.out, "Connection closed.")?;
        }
        Ok(())
    }

    fn print(&mut self, text: impl std::fmt::Display) {
        if let Err(err) = writeln!(self.out, "{text}") {
            warn!("console write failed: {err}");
        }
    }
}

async fn next_frame(inbound: &mut Option<FrameReceiver>) -> Option<Vec<u8>> {
    match inbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use futures::StreamExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::WebSocketStream;

    const WAIT: Duration = Duration::from_secs(5);

    fn console() -> Console<Vec<u8>> {
        Console::new(Config::default(), Vec::new())
    }

    fn text(console: &Console<Vec<u8>>) -> String {
        String::from_utf8_lossy(console.output()).into_owned()
    }

    /// A debugger endpoint that accepts one WebSocket client.
    async fn engine_endpoint() -> (String, JoinHandle<WebSocketStream<TcpStream>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio_tungstenite::accept_async(socket).await.unwrap()
        });
        (address, server)
    }

    #[tokio::test]
    async fn bad_lines_are_reported_not_fatal() {
        let mut console = console();
        assert_eq!(console.handle_line("frobnicate").await.unwrap(), Flow::Continue);
        assert_eq!(console.handle_line("continue").await.unwrap(), Flow::Continue);
        assert_eq!(console.handle_line("").await.unwrap(), Flow::Continue);
        let out = text(&console);
        assert!(out.contains("Error: unknown command"), "{out}");
        assert!(out.contains("Error: not connected"), "{out}");
    }

    #[tokio::test]
    async fn pending_breakpoints_can_be_queued_offline() {
        let mut console = console();
        console.handle_line("fbreak main.js:3").await.unwrap();
        console.handle_line("fbreak init").await.unwrap();
        console.handle_line("list").await.unwrap();
        console.handle_line("pendingdel 0").await.unwrap();
        let out = text(&console);
        assert!(out.contains("Pending breakpoint 0 at 3"), "{out}");
        assert!(out.contains("Pending breakpoint 1 at init"), "{out}");
        assert!(out.contains("pending 1: init"), "{out}");
        assert_eq!(console.engine().pending_breakpoints().len(), 1);
    }

    #[tokio::test]
    async fn quit_ends_the_loop() {
        let mut console = console();
        assert_eq!(console.handle_line("q").await.unwrap(), Flow::Quit);
    }

    #[tokio::test]
    async fn session_over_websocket() {
        let (address, server) = engine_endpoint().await;
        let port = address.rsplit_once(':').unwrap().1.to_string();

        let mut config = Config::default();
        config.connection.host = "127.0.0.1".into();
        config.debugger.stop_at_exception = Some(true);
        let mut console = Console::new(config, Vec::new());
        console.handle_line(&format!("connect :{port}")).await.unwrap();
        let mut socket = timeout(WAIT, server).await.unwrap().unwrap();
        assert!(console.engine().is_open());

        // Configuration: 64-byte frames, 2-byte pointers, little endian.
        console.handle_frame(&[1, 64, 2, 1]).unwrap();
        let sent = timeout(WAIT, socket.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(sent, Message::binary(vec![3, 1]));

        socket.close(None).await.unwrap();
        let out = text(&console);
        assert!(out.contains("Connected to 127.0.0.1:"), "{out}");
        assert!(out.contains("pointer width 2, little endian"), "{out}");
    }

    #[tokio::test]
    async fn refused_connection_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut console = console();
        console
            .handle_line(&format!("connect 127.0.0.1:{port}"))
            .await
            .unwrap();
        assert!(!console.engine().is_open());
        assert!(text(&console).contains("failed"));
    }

    #[tokio::test]
    async fn fatal_frame_closes_the_connection() {
        let (address, server) = engine_endpoint().await;

        let mut console = console();
        console
            .handle_line(&format!("connect {address}"))
            .await
            .unwrap();
        let _socket = timeout(WAIT, server).await.unwrap().unwrap();

        console.handle_frame(&[7, 1, 2]).unwrap();
        assert!(!console.engine().is_open());
        assert!(text(&console).contains("Connection aborted"));
    }

    #[tokio::test]
    async fn run_reads_commands_until_quit() {
        let mut console = console();
        let input: &[u8] = b"help\nlist\nquit\nlist\n";
        timeout(WAIT, console.run(input)).await.unwrap().unwrap();
        let out = text(&console);
        assert!(out.contains("connect [host[:port]]"));
        assert_eq!(out.matches("No breakpoints").count(), 1);
    }
}
