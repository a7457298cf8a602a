pub mod collector;
pub mod frame;
pub mod health;
pub mod http;
pub mod queue;
pub mod server;
pub mod stats;
pub mod transport;

pub use collector::{Collector, RecordSink};
pub use frame::RawFrame;
pub use queue::{IntakeQueue, IntakeReceiver};
pub use server::{IngestConfig, IngestHandle, PipelineMonitor, start};
pub use transport::FrameClient;
