//! Live channel: one WebSocket per subscriber.
//!
//! Pushed events and direct replies travel on separate queues into a single
//! writer task, the only owner of the socket sink. The event queue belongs
//! to the actor's hub: once the hub lets go of it (unsubscribe, or a client
//! too slow to keep up) the writer flushes pending replies and closes.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use berth_core::{subscriber_channel, ActorHandle, ClientMessage, ServerMessage};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;

use crate::routes::{ApiResult, AppState};

/// How long a closing connection may spend flushing queued frames.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

pub async fn upgrade(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    let actor = state.registry.actor(&channel).await?;
    Ok(ws.on_upgrade(move |socket| serve(socket, actor)))
}

pub async fn serve(socket: WebSocket, actor: ActorHandle) {
    let (sink, stream) = socket.split();
    drive(sink, stream, actor).await;
}

/// Run one connection over any message sink/stream pair until the client
/// closes it or the actor drops it.
pub async fn drive<S, R, E>(mut sink: S, mut stream: R, actor: ActorHandle)
where
    S: Sink<Message> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, E>> + Unpin,
{
    let (events_tx, mut events_rx) = subscriber_channel();
    let id = match actor.subscribe(events_tx).await {
        Ok(id) => id,
        Err(err) => {
            tracing::warn!(channel = actor.channel(), error = %err, "live connection refused");
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };
    tracing::debug!(channel = actor.channel(), subscriber = id, "live connection opened");

    let (replies_tx, mut replies_rx) = mpsc::channel::<String>(berth_core::SUBSCRIBER_QUEUE);
    let writer = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                biased;
                Some(frame) = replies_rx.recv() => frame,
                event = events_rx.recv() => match event {
                    Some(frame) => frame,
                    None => break,
                },
            };
            if sink.send(Message::Text(frame.into())).await.is_err() {
                return;
            }
        }
        while let Ok(frame) = replies_rx.try_recv() {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    while let Some(Ok(message)) = stream.next().await {
        let reply = match message {
            Message::Text(text) => reply_to(&actor, text.as_str()).await,
            Message::Close(_) => break,
            _ => continue,
        };
        match reply.to_json() {
            Ok(frame) => {
                if replies_tx.send(frame).await.is_err() {
                    break;
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to encode reply"),
        }
    }

    actor.unsubscribe(id).await;
    drop(replies_tx);
    let abort = writer.abort_handle();
    if tokio::time::timeout(WRITER_DRAIN, writer).await.is_err() {
        abort.abort();
    }
    tracing::debug!(channel = actor.channel(), subscriber = id, "live connection closed");
}

/// Answer one inbound text frame.
pub async fn reply_to(actor: &ActorHandle, raw: &str) -> ServerMessage {
    match ClientMessage::parse(raw) {
        Ok(ClientMessage::Subscribe) => match actor.current_version().await {
            Ok(current_version) => ServerMessage::Subscribed { current_version },
            Err(err) => ServerMessage::Error {
                message: err.to_string(),
            },
        },
        Ok(ClientMessage::Ping) => ServerMessage::Pong,
        Err(reply) => reply,
    }
}
