pub mod audio;
pub mod config;
pub mod controller;
pub mod device;
pub mod error;
mod logging;
pub mod refresh;
pub mod session;
pub mod stt;
mod telemetry;
pub mod trigger;
pub mod vad;
#[cfg(feature = "vad_earshot")]
pub mod vad_earshot;

pub use controller::TranscriptionController;
pub use error::PipelineError;
pub use logging::{init_logging, log_debug, log_debug_content, log_file_path};
pub use session::{PipelineEvent, SessionState, StopCause};
pub use telemetry::{init_tracing, trace_log_path};
pub use trigger::TranscriptLog;
