pub mod broadcast;
pub mod image;
pub mod loopback;
/// P2P protocol modules
pub mod protocol;
pub mod registry;
pub mod transport;

pub use broadcast::{BroadcastOutcome, Broadcaster};
pub use image::{ImagePolicy, ImageTranscoder, SniffTranscoder, COMPRESSION_QUALITY, MAX_IMAGE_BYTES};
pub use protocol::{Envelope, MessageKind};
pub use registry::{Endpoint, EndpointRegistry, EndpointState};
pub use transport::{Transport, STATUS_CONNECTION_REJECTED, STATUS_ERROR, STATUS_OK};
