mod settings;

pub use settings::{LogConfig, LogFormat, ServerConfig, Settings, ShutdownSettings};
