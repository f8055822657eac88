use {
    super::{CloseReason, TransportError, WebsocketClientError},
    crate::HttpRequest,
    futures_util::{stream::FusedStream, SinkExt, Stream, StreamExt},
    std::{
        pin::Pin,
        sync::Arc,
        task::{Context, Poll},
    },
    tokio::{
        net::TcpStream,
        sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    },
    tokio_tungstenite::{
        connect_async,
        tungstenite::{protocol::CloseFrame, Message},
        MaybeTlsStream,
        WebSocketStream,
    },
};

pub type SocketStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens a connection to the Relay and returns [`ClientStream`] for the
/// connection.
pub async fn create_stream(request: HttpRequest<()>) -> Result<ClientStream, WebsocketClientError> {
    let (socket, _) = connect_async(request)
        .await
        .map_err(WebsocketClientError::ConnectionFailed)?;

    Ok(ClientStream::new(socket))
}

/// Possible events produced by the [`ClientStream`].
#[derive(Debug)]
pub enum StreamEvent {
    /// A text frame, or a binary frame holding UTF-8 text.
    Text(Arc<str>),

    /// Reading or writing the underlying websocket failed.
    Error(WebsocketClientError),

    /// The websocket connection was closed.
    ///
    /// This is the last event that can be produced by the stream.
    ConnectionClosed(CloseReason),
}

/// Lower-level [`FusedStream`] interface for a single websocket connection.
///
/// Frames queued with [`ClientStream::send()`] are written while the stream is
/// polled.
pub struct ClientStream {
    socket: SocketStream,
    outbound_tx: UnboundedSender<Message>,
    outbound_rx: UnboundedReceiver<Message>,
    close_frame: Option<CloseFrame<'static>>,
}

impl ClientStream {
    pub fn new(socket: SocketStream) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Self {
            socket,
            outbound_tx,
            outbound_rx,
            close_frame: None,
        }
    }

    /// Queues a text frame.
    pub fn send(&self, text: String) {
        self.outbound_tx.send(Message::Text(text)).ok();
    }

    /// Closes the connection.
    pub async fn close(
        &mut self,
        frame: Option<CloseFrame<'static>>,
    ) -> Result<(), WebsocketClientError> {
        self.close_frame = frame.clone();
        self.socket
            .close(frame)
            .await
            .map_err(WebsocketClientError::ClosingFailed)
    }

    fn parse_inbound(&mut self, result: Result<Message, TransportError>) -> Option<StreamEvent> {
        match result {
            Ok(Message::Text(text)) => Some(StreamEvent::Text(text.into())),

            Ok(Message::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => Some(StreamEvent::Text(text.into())),
                Err(_) => Some(StreamEvent::Error(WebsocketClientError::InvalidFrame)),
            },

            Ok(Message::Close(frame)) => {
                self.close_frame = frame.map(CloseFrame::into_owned);
                Some(StreamEvent::ConnectionClosed(CloseReason(
                    self.close_frame.clone(),
                )))
            }

            // Pings are answered by tungstenite.
            Ok(_) => None,

            Err(error) => Some(StreamEvent::Error(WebsocketClientError::Transport(error))),
        }
    }

    fn poll_write(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), TransportError>> {
        let mut should_flush = false;

        loop {
            // `poll_ready() needs to be called before each `start_send()` to make sure the
            // sink is ready to accept more data.
            match self.socket.poll_ready_unpin(cx) {
                // The sink is ready to accept more data.
                Poll::Ready(Ok(())) => {
                    if let Poll::Ready(Some(next_message)) = self.outbound_rx.poll_recv(cx) {
                        if let Err(err) = self.socket.start_send_unpin(next_message) {
                            return Poll::Ready(Err(err));
                        }

                        should_flush = true;
                    } else if should_flush {
                        // We've sent out some messages, now we need to flush.
                        return self.socket.poll_flush_unpin(cx);
                    } else {
                        return Poll::Pending;
                    }
                }

                Poll::Ready(Err(err)) => return Poll::Ready(Err(err)),

                // The sink is not ready.
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Stream for ClientStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.socket.is_terminated() {
            return Poll::Ready(None);
        }

        while let Poll::Ready(data) = self.socket.poll_next_unpin(cx) {
            match data {
                Some(result) => {
                    if let Some(event) = self.parse_inbound(result) {
                        return Poll::Ready(Some(event));
                    }
                }

                None => {
                    return Poll::Ready(Some(StreamEvent::ConnectionClosed(CloseReason(
                        self.close_frame.clone(),
                    ))))
                }
            }
        }

        match self.poll_write(cx) {
            Poll::Ready(Err(error)) => Poll::Ready(Some(StreamEvent::Error(
                WebsocketClientError::Transport(error),
            ))),

            _ => Poll::Pending,
        }
    }
}

impl FusedStream for ClientStream {
    fn is_terminated(&self) -> bool {
        self.socket.is_terminated()
    }
}
