use serde::{Deserialize, Serialize};

/// Path of the introspection endpoint. Matched exactly.
pub const CHANNELS_PATH: &str = "/channels/";
/// Prefix of the publish endpoint; the remainder of the path is the channel name.
pub const BROADCAST_PREFIX: &str = "/broadcast/";
/// Prefix of the subscribe endpoint; the remainder of the path is the channel name.
pub const LISTEN_PREFIX: &str = "/listen/";

/// Form field carrying the payload of a broadcast.
pub const MESSAGE_FIELD: &str = "message";

/// `Accept` value that selects the SSE transport instead of WebSocket.
pub const EVENT_STREAM: &str = "text/event-stream";
/// SSE event sent once when a stream opens.
pub const CONNECTED_EVENT: &str = "connected";
/// SSE event sent on every keep-alive tick.
pub const PING_EVENT: &str = "ping";

/// One row of the `/channels/` listing.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    #[serde(rename = "Name")]
    pub name: String,
    /// Number of currently registered subscribers.
    #[serde(rename = "Listeners")]
    pub listeners: usize,
    /// Number of broadcasts accepted on this channel since it was created.
    #[serde(rename = "Messages")]
    pub messages: u64,
}
