/// Configuration management
use crate::error::{Result, StarError};
use serde::{Deserialize, Serialize};

const DEFAULT_ROOM: &str = "starchat";

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name advertised to remote peers (best-effort, shown in their UI)
    pub display_name: String,

    /// Room (service id) used by the demo binary when none is given per call
    pub room: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display_name: "starchat-node".to_string(),
            room: DEFAULT_ROOM.to_string(),
        }
    }
}

impl Config {
    /// Create config from command line arguments
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut config = Config::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--room" => {
                    let room = args.get(i + 1).ok_or_else(|| {
                        StarError::Config("--room requires a name argument".to_string())
                    })?;
                    config.room = room.clone();
                    i += 2;
                }
                "--help" | "-h" => {
                    return Err(StarError::Config(format!(
                        "Usage: {} [display-name] [--room <name>]",
                        args.first().map(String::as_str).unwrap_or("starchat")
                    )));
                }
                other if other.starts_with("--") => {
                    return Err(StarError::Config(format!("Unknown flag: {}", other)));
                }
                other => {
                    config.display_name = other.to_string();
                    i += 1;
                }
            }
        }

        // Env override (nice for scripts)
        if let Ok(room) = std::env::var("STARCHAT_ROOM") {
            if !room.is_empty() {
                config.room = room;
            }
        }

        Ok(config)
    }
}
