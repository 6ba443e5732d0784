// hrtf_sweep: real-time binaural rendering test harness
// Expose public modules for use in integration tests

pub mod app;
pub mod audio;
pub mod spatial;

// Re-export commonly used types for convenience
pub use app::commands::{ControlCommand, Menu, MenuReply, TestMode};
pub use app::config::Config;
pub use app::render::{render_to_wav, RenderSummary};
pub use app::session::{Flow, Session, SessionError};
pub use app::App;
pub use audio::{
    CpalDriver, OfflineDriver, SampleReservoir, SourcePose, TrajectoryGenerator, TrajectoryPhase,
};
pub use spatial::{HrtfSet, Spatializer, Transform, Vector3};
