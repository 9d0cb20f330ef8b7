pub mod client;
pub mod config;
pub mod progress;
pub mod sse;
pub mod state;
pub mod transport;

pub use client::{JobClient, JobHandle, JobObserver};
pub use config::{ClientConfig, ConfigError};
pub use state::JobState;
pub use transport::{EventStream, HttpTransport, JobTransport, MockFrame, MockScript, MockTransport};
