pub mod error;
pub mod fields;
pub mod index;
pub mod message;
pub mod time;
pub mod topic;

pub use error::{Error, Result};
pub use index::IndexEntry;
pub use message::{ConnectionHeader, Message};
pub use time::Time;
pub use topic::MsgInfo;
