// WebSocket server for the administrator client.

use futures_util::stream::{Stream, StreamExt};
use futures_util::{Sink, SinkExt};
use std::fmt::Display;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Events emitted by the WebSocket server to the application layer.
#[derive(Debug, PartialEq)]
pub enum WsEvent {
    /// A new WebSocket client has connected.
    Connected { addr: String },
    /// The current WebSocket client has disconnected.
    Disconnected,
    /// A text message was received from the client (raw JSON string).
    Message(String),
}

/// Run the WebSocket server on the given port.
///
/// Binds `127.0.0.1:{port}` and serves one connection at a time. Inbound text
/// frames go to `tx` as [`WsEvent::Message`]; every string arriving on
/// `out_rx` is written to the connected client. Outbound messages that arrive
/// while nobody is connected are dropped. Returns when `tx` closes.
pub async fn run(
    port: u16,
    tx: mpsc::Sender<WsEvent>,
    mut out_rx: mpsc::Receiver<String>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
    let local_addr = listener.local_addr()?;
    info!("WebSocket server listening on {local_addr}");

    let mut out_open = true;
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, addr) = accepted?;
                let addr_str = addr.to_string();
                info!("Accepted TCP connection from {addr_str}");

                let ws_stream = match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(e) => {
                        warn!("WebSocket handshake failed for {addr_str}: {e}");
                        continue;
                    }
                };

                if tx
                    .send(WsEvent::Connected {
                        addr: addr_str.clone(),
                    })
                    .await
                    .is_err()
                {
                    break;
                }

                let (write, read) = ws_stream.split();
                if serve_connection(read, write, &tx, &mut out_rx, &addr_str)
                    .await
                    .is_err()
                {
                    break;
                }

                if tx.send(WsEvent::Disconnected).await.is_err() {
                    break;
                }
            }

            outbound = out_rx.recv(), if out_open => {
                match outbound {
                    Some(text) => debug!("No client connected, dropping {} byte message", text.len()),
                    None => out_open = false,
                }
            }
        }
    }

    Ok(())
}

/// Shuttle messages for one connection until the client leaves.
///
/// Inbound text is forwarded through `tx`; outbound strings from `out_rx` are
/// written to `sink`. Returns `Err(())` if `tx` is closed (receiver dropped),
/// signalling the caller to stop. A closed `out_rx` ends the connection.
///
/// Generic over the stream and sink so it can be tested with in-memory types.
pub async fn serve_connection<St, Si>(
    mut stream: St,
    mut sink: Si,
    tx: &mpsc::Sender<WsEvent>,
    out_rx: &mut mpsc::Receiver<String>,
    addr: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    loop {
        tokio::select! {
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if tx.send(WsEvent::Message(text.to_string())).await.is_err() {
                            return Err(());
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {addr} sent close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error from {addr}: {e}");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ignore Binary, Ping, Pong, Frame variants.
                    }
                    None => break,
                }
            }

            outbound = out_rx.recv() => {
                let Some(text) = outbound else {
                    info!("Outbound channel closed, ending connection with {addr}");
                    break;
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!("Failed to write to {addr}: {e}");
                    break;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use tokio_tungstenite::tungstenite::Error as WsError;

    /// Helper: create a stream of Message results from a vec.
    fn mock_stream(
        messages: Vec<Result<Message, WsError>>,
    ) -> impl Stream<Item = Result<Message, WsError>> + Unpin {
        stream::iter(messages)
    }

    /// Serve one connection over `messages` while nothing is sent outbound.
    async fn serve_inbound(
        messages: Vec<Result<Message, WsError>>,
        tx: &mpsc::Sender<WsEvent>,
    ) -> (Result<(), ()>, Vec<Message>) {
        let (_out_tx, mut out_rx) = mpsc::channel::<String>(8);
        let mut written: Vec<Message> = Vec::new();
        let result =
            serve_connection(mock_stream(messages), &mut written, tx, &mut out_rx, "test").await;
        (result, written)
    }

    #[tokio::test]
    async fn text_message_forwarded_to_channel() {
        let (tx, mut rx) = mpsc::channel(64);
        let payload = r#"{"id":1,"command":{"type":"current_period"}}"#;

        let (result, written) = serve_inbound(vec![Ok(Message::Text(payload.into()))], &tx).await;

        assert!(result.is_ok());
        assert_eq!(rx.recv().await.unwrap(), WsEvent::Message(payload.to_string()));
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn close_frame_stops_processing() {
        let (tx, mut rx) = mpsc::channel(64);
        let messages = vec![
            Ok(Message::Text("before_close".into())),
            Ok(Message::Close(None)),
            Ok(Message::Text("after_close_should_not_appear".into())),
        ];

        let (result, _) = serve_inbound(messages, &tx).await;

        assert!(result.is_ok());
        assert_eq!(
            rx.recv().await.unwrap(),
            WsEvent::Message("before_close".into())
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn binary_and_ping_frames_are_ignored() {
        let (tx, mut rx) = mpsc::channel(64);
        let messages = vec![
            Ok(Message::Binary(vec![1, 2, 3].into())),
            Ok(Message::Ping(vec![].into())),
            Ok(Message::Pong(vec![].into())),
            Ok(Message::Text("after_ignored".into())),
        ];

        let (result, written) = serve_inbound(messages, &tx).await;

        assert!(result.is_ok());
        assert_eq!(
            rx.recv().await.unwrap(),
            WsEvent::Message("after_ignored".into())
        );
        assert!(rx.try_recv().is_err());
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn error_stops_processing() {
        let (tx, mut rx) = mpsc::channel(64);
        let messages = vec![
            Ok(Message::Text("before_error".into())),
            Err(WsError::ConnectionClosed),
            Ok(Message::Text("after_error_should_not_appear".into())),
        ];

        let (result, _) = serve_inbound(messages, &tx).await;

        assert!(result.is_ok());
        assert_eq!(
            rx.recv().await.unwrap(),
            WsEvent::Message("before_error".into())
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn returns_err_when_channel_closed() {
        let (tx, rx) = mpsc::channel(64);
        drop(rx);

        let (result, _) = serve_inbound(vec![Ok(Message::Text("orphan".into()))], &tx).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn serve_connection_writes_outbound_messages() {
        let (tx, _rx) = mpsc::channel(64);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        out_tx.send("first".to_string()).await.unwrap();
        out_tx.send("second".to_string()).await.unwrap();
        drop(out_tx);

        // The client never speaks; the closed outbound channel ends the loop.
        let mut written: Vec<Message> = Vec::new();
        serve_connection(
            stream::pending::<Result<Message, WsError>>(),
            &mut written,
            &tx,
            &mut out_rx,
            "test",
        )
        .await
        .unwrap();

        assert_eq!(
            written,
            vec![Message::Text("first".into()), Message::Text("second".into())]
        );
    }

    #[tokio::test]
    async fn serve_connection_forwards_inbound_until_close() {
        let (tx, mut rx) = mpsc::channel(64);
        let (_out_tx, mut out_rx) = mpsc::channel::<String>(8);
        let messages = vec![
            Ok(Message::Text("hello".into())),
            Ok(Message::Close(None)),
        ];

        let mut written: Vec<Message> = Vec::new();
        serve_connection(mock_stream(messages), &mut written, &tx, &mut out_rx, "test")
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), WsEvent::Message("hello".into()));
        assert!(written.is_empty());
    }
}
