pub mod api;
pub mod app;
pub mod engine;
pub mod error;
pub mod session;
pub mod storage;
pub mod sync;
pub mod utils;

pub use engine::{SendReceipt, SyncHandle, ViewState};
pub use error::{Error, Result};
