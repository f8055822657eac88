use {
    super::{
        stream::{create_stream, ClientStream, StreamEvent},
        CloseReason,
        WebsocketClientError,
    },
    crate::{CloseCode, ConnectionOptions, DisconnectReason, TransportEvent},
    futures_util::{stream::FusedStream, Stream, StreamExt},
    std::{
        pin::Pin,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        task::{Context, Poll},
    },
    tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender},
    tokio_tungstenite::tungstenite::protocol::CloseFrame,
    tracing::{debug, warn},
};

pub(super) enum SocketControl {
    Connect,
    Disconnect(CloseCode),
    Send(String),
}

pub(super) async fn connection_event_loop(
    mut control_rx: UnboundedReceiver<SocketControl>,
    opts: ConnectionOptions,
    events: UnboundedSender<TransportEvent>,
    connected: Arc<AtomicBool>,
) {
    let mut conn = Connection::new();

    let emit = |event: TransportEvent| {
        if !matches!(event, TransportEvent::Text(_)) {
            connected.store(event == TransportEvent::Connected, Ordering::SeqCst);
        }

        events.send(event).ok();
    };

    loop {
        tokio::select! {
            control = control_rx.recv() => {
                match control {
                    Some(SocketControl::Connect) => {
                        if conn.is_open() {
                            emit(TransportEvent::Connected);
                            continue;
                        }

                        match conn.connect(&opts).await {
                            Ok(()) => {
                                debug!(address = %opts.address, "websocket connected");
                                emit(TransportEvent::Connected);
                            }

                            Err(err) => {
                                warn!(%err, "websocket connection failed");
                                emit(TransportEvent::Disconnected(Some(DisconnectReason::Error(
                                    err.to_string(),
                                ))));
                            }
                        }
                    }

                    Some(SocketControl::Disconnect(code)) => {
                        if conn.disconnect(code).await {
                            emit(TransportEvent::Disconnected(Some(DisconnectReason::Closed {
                                code,
                                reason: String::new(),
                            })));
                        }
                    }

                    Some(SocketControl::Send(text)) => {
                        if !conn.send(text) {
                            warn!("dropping outbound frame, socket is closed");
                        }
                    }

                    // Transport has been dropped, shutting down.
                    None => {
                        conn.disconnect(CloseCode::Normal).await;
                        break;
                    }
                }
            }

            event = conn.select_next_some() => {
                match event {
                    StreamEvent::Text(text) => emit(TransportEvent::Text(text)),

                    StreamEvent::Error(err) => warn!(%err, "websocket stream error"),

                    StreamEvent::ConnectionClosed(reason) => {
                        debug!(%reason, "websocket closed");
                        conn.reset();
                        emit(TransportEvent::Disconnected(Some(disconnect_reason(reason))));
                    }
                }
            }
        }
    }
}

fn disconnect_reason(reason: CloseReason) -> DisconnectReason {
    match reason.0 {
        Some(CloseFrame { code, reason }) => DisconnectReason::Closed {
            code,
            reason: reason.into_owned(),
        },

        None => DisconnectReason::Closed {
            code: CloseCode::Abnormal,
            reason: String::new(),
        },
    }
}

struct Connection {
    stream: Option<ClientStream>,
}

impl Connection {
    fn new() -> Self {
        Self { stream: None }
    }

    fn is_open(&self) -> bool {
        self.stream
            .as_ref()
            .is_some_and(|stream| !stream.is_terminated())
    }

    async fn connect(&mut self, opts: &ConnectionOptions) -> Result<(), WebsocketClientError> {
        if let Some(mut stream) = self.stream.take() {
            stream.close(None).await.ok();
        }

        let request = opts.as_request()?;
        self.stream = Some(create_stream(request).await?);

        Ok(())
    }

    /// Closes the socket. Returns `false` if there was no open socket.
    async fn disconnect(&mut self, code: CloseCode) -> bool {
        let Some(mut stream) = self.stream.take() else {
            return false;
        };

        let frame = CloseFrame {
            code,
            reason: "".into(),
        };

        if let Err(err) = stream.close(Some(frame)).await {
            debug!(%err, "failed to close websocket cleanly");
        }

        true
    }

    fn send(&mut self, text: String) -> bool {
        match &self.stream {
            Some(stream) => {
                stream.send(text);
                true
            }

            None => false,
        }
    }

    fn reset(&mut self) {
        self.stream = None;
    }
}

impl Stream for Connection {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(stream) = &mut self.stream {
            if stream.is_terminated() {
                self.stream = None;

                Poll::Pending
            } else {
                stream.poll_next_unpin(cx)
            }
        } else {
            Poll::Pending
        }
    }
}

impl FusedStream for Connection {
    fn is_terminated(&self) -> bool {
        false
    }
}
