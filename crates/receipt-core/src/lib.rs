pub mod calendar;
pub mod error;
pub mod event;
pub mod reconstruct;
pub mod stats;

pub use error::{ReceiptError, Result};
pub use stats::*;
