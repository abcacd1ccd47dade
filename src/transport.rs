//! WebSocket transport.
//!
//! The engine serves the debugger at `ws://host:port/jerry-debugger` and
//! every protocol frame travels as one binary message. A reader task
//! forwards inbound frames on a channel; a writer task drains outbound
//! frames. The engine only sees [`ChannelTransport`], which is a handle onto
//! the writer's queue.

use std::io;

use futures::{Sink, SinkExt, Stream, StreamExt};
use jdb_engine::Transport;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

/// Resource path the engine's debugger listens on.
pub const PATH: &str = "/jerry-debugger";

/// Inbound frames. Yields `None` once the peer has gone away.
pub type FrameReceiver = mpsc::UnboundedReceiver<Vec<u8>>;

/// Outbound half of a connection.
#[derive(Debug)]
pub struct ChannelTransport {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    reader: AbortHandle,
}

impl Transport for ChannelTransport {
    fn send(&mut self, frame: Vec<u8>) -> io::Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "transport closed"))?;
        tx.send(frame)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "writer task has exited"))
    }

    fn close(&mut self) {
        // Dropping the sender lets the writer send a close message.
        self.tx = None;
        self.reader.abort();
    }
}

/// Connect to `address` (`host:port`) and complete the WebSocket handshake.
pub async fn connect(address: &str) -> Result<(ChannelTransport, FrameReceiver), WsError> {
    let stream = TcpStream::connect(address).await?;
    stream.set_nodelay(true)?;
    let url = format!("ws://{address}{PATH}");
    let (socket, _response) = tokio_tungstenite::client_async(url, stream).await?;
    debug!(%address, "websocket connected");
    Ok(spawn(socket))
}

/// Start the reader and writer tasks for an open WebSocket.
pub fn spawn<S>(socket: WebSocketStream<S>) -> (ChannelTransport, FrameReceiver)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = socket.split();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();

    let reader = tokio::spawn(read_frames(stream, in_tx)).abort_handle();
    tokio::spawn(write_frames(sink, out_rx));

    (
        ChannelTransport {
            tx: Some(out_tx),
            reader,
        },
        in_rx,
    )
}

async fn read_frames<R>(mut stream: R, tx: mpsc::UnboundedSender<Vec<u8>>)
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Binary(frame)) => {
                if tx.send(frame).is_err() {
                    return;
                }
            }
            Ok(Message::Close(reason)) => {
                debug!(?reason, "peer closed the connection");
                return;
            }
            Ok(Message::Text(text)) => warn!(len = text.len(), "ignoring text message"),
            Ok(_) => {}
            Err(e) => {
                warn!("read failed: {e}");
                return;
            }
        }
    }
    debug!("websocket stream ended");
}

async fn write_frames<W>(mut sink: W, mut rx: mpsc::UnboundedReceiver<Vec<u8>>)
where
    W: Sink<Message, Error = WsError> + Unpin,
{
    while let Some(frame) = rx.recv().await {
        if let Err(e) = sink.send(Message::binary(frame)).await {
            warn!("write failed: {e}");
            return;
        }
    }
    let _ = sink.close().await;
}
