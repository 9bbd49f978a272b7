pub mod poller;
pub mod storage;

pub use poller::EdgePoller;
pub use storage::{Area, PinStorage};
