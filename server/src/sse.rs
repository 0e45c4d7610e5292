use axum::response::sse::{Event, Sse};
use channel_api::{CONNECTED_EVENT, PING_EVENT};
use fanoutcore::Subscription;
use futures::stream::{self, Stream, StreamExt};
use std::{convert::Infallible, time::Duration};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tracing::info;

/// Server-Sent-Events body for one subscription: a `connected` event, then one
/// `data` event per message, interleaved with `ping` events every `keepalive`.
///
/// The subscription lives inside the stream, so when the client disconnects
/// and the body is dropped the subscriber is hung up.
pub fn stream(
    subscription: Subscription,
    keepalive: Duration,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(channel = %subscription.channel(), subscriber = %subscription.id(), "event stream opened");

    let connected = stream::once(async { Event::default().event(CONNECTED_EVENT) });

    let messages = stream::unfold(subscription, |sub| async move {
        let message = sub.recv().await?;
        Some((Event::default().data(normalize_newlines(&message)), sub))
    });

    let mut ticker = interval_at(Instant::now() + keepalive, keepalive);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let pings = IntervalStream::new(ticker).map(|_| Event::default().event(PING_EVENT));

    Sse::new(connected.chain(stream::select(messages, pings)).map(Ok))
}

/// SSE lines end at CR, LF or CRLF; fold them all into LF so a payload can
/// only ever produce extra `data:` lines.
fn normalize_newlines(message: &str) -> String {
    message.replace("\r\n", "\n").replace('\r', "\n")
}
