//! Frame-oriented process supervision
//!
//! This module spawns external processes and hands their standard output and
//! standard error to callbacks one frame at a time, as the bytes arrive. A
//! frame is whatever a single read returned; callbacks that need lines or
//! records rebuild them themselves, or use the helpers in [`lines`].

mod command;
mod error;
mod frame;
pub mod lines;
mod watch;

pub use command::{Command, ProcessHandle, execute};
pub use error::{ProcessError, ProcessResult};
pub use frame::{Frame, FrameRead, FrameReader, MIN_FRAME_SIZE, StreamKind};
pub use lines::{LineAssembler, line_callback};
pub use watch::{Completion, FrameCallback, KillErrorHandler, Watch, WatchConfig, execute_watch};
