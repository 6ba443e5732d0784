pub mod driver;
pub mod pipeline;
mod reservoir;
pub mod stream;
pub mod trajectory;
pub mod wav;

pub use driver::{AudioDevice, AudioDriver, CpalDriver, DriverError, OfflineDriver, StreamParams};
pub use pipeline::{PipelineStatus, RenderPipeline, SharedPipeline, StatusSnapshot};
pub use reservoir::SampleReservoir;
pub use stream::StreamController;
pub use trajectory::{SourcePose, TrajectoryGenerator, TrajectoryPhase};
