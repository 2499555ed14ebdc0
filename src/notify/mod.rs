//! Outbound side effects: user notifications and live room broadcasts
//!
//! Neither is allowed to fail an engine operation. The service layer
//! bounds each delivery with a timeout and only logs what goes wrong.

pub mod rooms;
pub mod sink;

pub use rooms::{RoomMessage, RoomRegistry};
pub use sink::{MockNotificationSink, NotificationSink, TracingNotificationSink};
