// ── Domain model ──
//
// Canonical alert and acknowledgment types shared by the lifecycle, the
// store backends and the presentation surface.

pub mod ack;
pub mod alert;
pub mod record_id;

pub use ack::{Acknowledgment, NewAcknowledgment};
pub use alert::{Alert, AlertCategory, AlertStatus, NewAlert, Palette};
pub use record_id::RecordId;
