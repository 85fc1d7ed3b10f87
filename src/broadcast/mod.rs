//! Records and fan-out

pub mod fanout;
pub mod record;

pub use fanout::{BroadcastReport, Broadcaster};
pub use record::Record;
