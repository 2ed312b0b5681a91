/// Logger setup shared by the demo binaries
pub mod logging;
