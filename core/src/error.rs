/// Error types for the peer connection core
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StarError {
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Image size exceeds 5MB limit after compression ({size} bytes)")]
    ImageTooLarge { size: usize },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, StarError>;
