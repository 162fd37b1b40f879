// redcode-api: Async Rust client for the RedCode alert store (PostgREST + Realtime)

pub mod error;
pub mod models;
pub mod realtime;
pub mod rest;
pub mod transport;

pub use error::Error;
pub use models::{AckRow, AlarmRow, NewAckRow, NewAlarmRow, RowId};
pub use realtime::{
    ChangeBinding, ChangeEvent, ChangeKind, ChannelEvent, PostgresChange, RealtimeChannel,
    RealtimeHandle, ReconnectConfig,
};
pub use rest::{RestClient, Tables};
pub use transport::{TlsMode, TransportConfig};
