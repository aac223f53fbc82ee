mod events;
mod listener;
mod transport;

pub use events::{AlertKind, InvalidationEvent};
pub use listener::{HistoryEntry, InvalidationListener, ListenerHandle, ListenerStats};
pub use transport::{Backoff, ChannelSource, FrameStream, WebSocketSource};
