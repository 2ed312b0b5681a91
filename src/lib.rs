//! Stream the output of external processes frame by frame

pub mod config;
pub mod error;
#[cfg(feature = "icmp")]
pub mod icmp;
#[cfg(feature = "process")]
pub mod process;
pub mod util;

/// Re-export of commonly used types for convenience
pub mod prelude {
    pub use crate::config::{AppConfig, LogLevel, WatchSettings, load_config};
    pub use crate::error::{Result, WatchError};
    #[cfg(feature = "icmp")]
    pub use crate::icmp::{PingConfig, PingResult, Pinger, ping};
    #[cfg(feature = "process")]
    pub use crate::process::{
        Command, Completion, Frame, ProcessError, ProcessHandle, ProcessResult, StreamKind, Watch,
        WatchConfig, execute, execute_watch,
    };
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
