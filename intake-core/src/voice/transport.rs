// Remote live session over WebSocket (tokio-tungstenite).
//
// After the setup handshake the socket is split: a writer task drains the
// outbound channel, a reader task turns frames into `ServerEvent`s. The
// session task only sees the two channels.

use std::{fmt::Display, future::Future, time::Duration};

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{error::ProtocolError, Error as WsError, Message},
};
use tracing::{debug, info, warn};

use super::protocol::{
    is_credential_close, ClientMessage, LiveSetup, ServerEvent, ServerMessage, CLOSE_ABNORMAL,
};
use crate::error::AssistantError;

const OUTBOUND_QUEUE: usize = 64;
const INBOUND_QUEUE: usize = 256;
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Both directions of an open live session.
pub struct LiveLink {
    pub outbound: mpsc::Sender<ClientMessage>,
    pub inbound: mpsc::Receiver<ServerEvent>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl LiveLink {
    pub fn new(outbound: mpsc::Sender<ClientMessage>, inbound: mpsc::Receiver<ServerEvent>) -> Self {
        Self {
            outbound,
            inbound,
            writer: None,
            reader: None,
        }
    }

    /// Drop both channels and give the writer a moment to send the close
    /// frame. The reader is aborted once the writer is done; nothing reads
    /// its events any more.
    pub async fn close(self) {
        let LiveLink {
            outbound,
            inbound,
            writer,
            reader,
        } = self;
        drop(outbound);
        drop(inbound);
        if let Some(writer) = writer {
            let abort = writer.abort_handle();
            if tokio::time::timeout(CLOSE_GRACE, writer).await.is_err() {
                abort.abort();
            }
        }
        if let Some(reader) = reader {
            reader.abort();
            let _ = reader.await;
        }
    }
}

/// Opens live sessions. The session is usable once `connect` returns.
pub trait LiveConnector: Send + Sync + 'static {
    fn connect(
        &self,
        setup: &LiveSetup,
    ) -> impl Future<Output = Result<LiveLink, AssistantError>> + Send;
}

#[derive(Clone, Debug)]
pub struct WebSocketConnector {
    endpoint: String,
    setup_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            setup_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_setup_timeout(mut self, timeout: Duration) -> Self {
        self.setup_timeout = timeout;
        self
    }
}

impl LiveConnector for WebSocketConnector {
    async fn connect(&self, setup: &LiveSetup) -> Result<LiveLink, AssistantError> {
        info!("opening live session at {}", self.endpoint);
        let url = format!("{}?key={}", self.endpoint, setup.api_key);
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(classify_handshake_error)?;
        let (mut ws_tx, mut ws_rx) = ws.split();

        let json = ClientMessage::setup(setup)
            .to_json()
            .map_err(|e| AssistantError::Initialization(e.to_string()))?;
        ws_tx
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| AssistantError::Connection(format!("send setup: {e}")))?;

        tokio::time::timeout(self.setup_timeout, await_setup_complete(&mut ws_rx))
            .await
            .map_err(|_| AssistantError::Connection("timed out waiting for setup".into()))??;
        info!("live session ready");

        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let (in_tx, in_rx) = mpsc::channel(INBOUND_QUEUE);
        let writer = tokio::spawn(write_loop(ws_tx, out_rx));
        let reader = tokio::spawn(read_loop(ws_rx, in_tx));

        Ok(LiveLink {
            outbound: out_tx,
            inbound: in_rx,
            writer: Some(writer),
            reader: Some(reader),
        })
    }
}

fn classify_handshake_error(err: WsError) -> AssistantError {
    match &err {
        WsError::Http(resp) if matches!(resp.status().as_u16(), 400 | 401 | 403) => {
            AssistantError::CredentialRejected(format!("handshake refused: {}", resp.status()))
        }
        _ => AssistantError::Connection(err.to_string()),
    }
}

fn is_setup_ack(frame: &[u8]) -> bool {
    ServerMessage::parse(frame)
        .map(|m| m.is_setup_complete())
        .unwrap_or(false)
}

async fn await_setup_complete<S>(rx: &mut S) -> Result<(), AssistantError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(msg) = rx.next().await {
        match msg {
            Ok(Message::Text(text)) if is_setup_ack(text.as_bytes()) => return Ok(()),
            Ok(Message::Binary(data)) if is_setup_ack(&data) => return Ok(()),
            Ok(Message::Close(frame)) => {
                let (code, reason) = frame
                    .map(|f| (u16::from(f.code), f.reason.to_string()))
                    .unwrap_or((1005, String::new()));
                return Err(if is_credential_close(code, &reason) {
                    AssistantError::CredentialRejected(reason)
                } else {
                    AssistantError::Connection(format!("closed during setup ({code}): {reason}"))
                });
            }
            Ok(_) => continue,
            Err(e) => return Err(AssistantError::Connection(e.to_string())),
        }
    }
    Err(AssistantError::Connection("stream ended during setup".into()))
}

async fn write_loop<S>(mut sink: S, mut messages: mpsc::Receiver<ClientMessage>)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(msg) = messages.recv().await {
        let json = match msg.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!("unserialisable client message: {e}");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(json.into())).await {
            warn!("live send failed: {e}");
            break;
        }
    }
    debug!("live writer closing");
    let _ = sink.close().await;
}

/// Returns `false` once nobody is listening.
async fn forward(frame: &[u8], events: &mpsc::Sender<ServerEvent>) -> bool {
    match ServerMessage::parse(frame) {
        Ok(msg) => {
            for event in msg.into_events() {
                if events.send(event).await.is_err() {
                    return false;
                }
            }
        }
        Err(e) => warn!("unparseable server frame: {e}"),
    }
    true
}

async fn read_loop<S>(mut stream: S, events: mpsc::Sender<ServerEvent>)
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let terminal = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                if !forward(text.as_bytes(), &events).await {
                    return;
                }
            }
            Some(Ok(Message::Binary(data))) => {
                if !forward(&data, &events).await {
                    return;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                break ServerEvent::Closed {
                    code: frame.as_ref().map(|f| u16::from(f.code)),
                    reason: frame.map(|f| f.reason.to_string()).unwrap_or_default(),
                };
            }
            Some(Ok(_)) => continue,
            Some(Err(WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake))) | None => {
                break ServerEvent::Closed {
                    code: Some(CLOSE_ABNORMAL),
                    reason: "connection reset".into(),
                };
            }
            Some(Err(WsError::ConnectionClosed)) => {
                break ServerEvent::Closed {
                    code: None,
                    reason: String::new(),
                };
            }
            Some(Err(e)) => break ServerEvent::Error(e.to_string()),
        }
    };
    debug!("live reader finished: {terminal:?}");
    let _ = events.send(terminal).await;
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame};

    use super::*;

    async fn drain(mut rx: mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Some(ev) = rx.recv().await {
            out.push(ev);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn close_does_not_wait_for_a_silent_peer() {
        let (out_tx, mut out_rx) = mpsc::channel::<ClientMessage>(4);
        let (_in_tx, in_rx) = mpsc::channel(4);
        let mut link = LiveLink::new(out_tx, in_rx);
        link.writer = Some(tokio::spawn(async move {
            while out_rx.recv().await.is_some() {}
        }));
        link.reader = Some(tokio::spawn(std::future::pending::<()>()));

        let started = tokio::time::Instant::now();
        link.close().await;
        assert!(started.elapsed() < CLOSE_GRACE);
    }

    #[tokio::test]
    async fn reader_translates_frames_and_reports_clean_close() {
        let frames = vec![
            Ok(Message::text(r#"{"serverContent":{"interrupted":true}}"#)),
            Ok(Message::text("not json")),
            Ok(Message::binary(br#"{"serverContent":{"turnComplete":true}}"#.to_vec())),
            Ok(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "bye".into(),
            }))),
        ];
        let (tx, rx) = mpsc::channel(16);
        read_loop(stream::iter(frames), tx).await;

        assert_eq!(
            drain(rx).await,
            vec![
                ServerEvent::Interrupted,
                ServerEvent::TurnComplete,
                ServerEvent::Closed {
                    code: Some(1000),
                    reason: "bye".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn reader_reports_abnormal_close_when_stream_ends() {
        let frames: Vec<Result<Message, WsError>> = vec![];
        let (tx, rx) = mpsc::channel(4);
        read_loop(stream::iter(frames), tx).await;
        assert_eq!(
            drain(rx).await,
            vec![ServerEvent::Closed {
                code: Some(CLOSE_ABNORMAL),
                reason: "connection reset".into()
            }]
        );
    }

    #[tokio::test]
    async fn reader_surfaces_transport_errors() {
        let frames = vec![Err(WsError::Io(std::io::Error::other("boom")))];
        let (tx, rx) = mpsc::channel(4);
        read_loop(stream::iter(frames), tx).await;
        let events = drain(rx).await;
        assert!(matches!(&events[..], [ServerEvent::Error(msg)] if msg.contains("boom")));
    }

    #[tokio::test]
    async fn writer_serialises_in_order() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(ClientMessage::text("one")).await.unwrap();
        tx.send(ClientMessage::text("two")).await.unwrap();
        drop(tx);

        let mut sent: Vec<Message> = Vec::new();
        write_loop(&mut sent, rx).await;

        assert_eq!(sent.len(), 2);
        let first = sent[0].to_text().unwrap();
        assert!(first.contains("\"clientContent\"") && first.contains("one"));
        assert!(sent[1].to_text().unwrap().contains("two"));
    }

    #[tokio::test]
    async fn setup_waits_for_acknowledgement() {
        let mut frames = stream::iter(vec![
            Ok(Message::Ping(Default::default())),
            Ok(Message::text(r#"{"setupComplete":{}}"#)),
        ]);
        assert!(await_setup_complete(&mut frames).await.is_ok());
    }

    #[tokio::test]
    async fn setup_close_with_bad_key_is_a_credential_error() {
        let mut frames = stream::iter(vec![Ok(Message::Close(Some(CloseFrame {
            code: CloseCode::Policy,
            reason: "API key not valid".into(),
        })))]);
        assert!(matches!(
            await_setup_complete(&mut frames).await,
            Err(AssistantError::CredentialRejected(_))
        ));

        let mut empty = stream::iter(Vec::<Result<Message, WsError>>::new());
        assert!(matches!(
            await_setup_complete(&mut empty).await,
            Err(AssistantError::Connection(_))
        ));
    }
}
