use axum::extract::ws::{Message, WebSocket};
use fanoutcore::Hub;
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Relay every message published on `channel` to the socket as a text frame
/// until the peer goes away.
pub async fn relay(socket: WebSocket, hub: Hub, channel: String) {
    let subscription = hub.subscribe(&channel);
    let (mut sender, mut receiver) = socket.split();

    // Incoming frames have to be read for a peer close to be noticed.
    let closed = CancellationToken::new();
    let reader = tokio::spawn({
        let closed = closed.clone();
        async move {
            while let Some(frame) = receiver.next().await {
                match frame {
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            closed.cancel();
        }
    });

    loop {
        tokio::select! {
            _ = closed.cancelled() => {
                debug!(channel = %channel, subscriber = %subscription.id(), "peer closed websocket");
                break;
            }
            msg = subscription.recv() => match msg {
                Some(text) => {
                    if let Err(e) = sender.send(Message::Text(text)).await {
                        debug!(channel = %channel, subscriber = %subscription.id(), error = %e, "websocket write failed");
                        break;
                    }
                }
                None => break,
            },
        }
    }

    subscription.hangup();
    reader.abort();
    let _ = sender.close().await;
}
