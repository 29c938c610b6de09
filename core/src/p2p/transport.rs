/// Abstract transport collaborator (discovery/connection SDK seam)
use crate::error::Result;
use bytes::Bytes;

/// Connection established
pub const STATUS_OK: i32 = 0;
/// Connection rejected by the remote side
pub const STATUS_CONNECTION_REJECTED: i32 = 8004;
/// Transport-level connection error
pub const STATUS_ERROR: i32 = 13;

/// Seam to the underlying discovery/connection SDK.
///
/// Every method reports immediate accept/reject of the request itself and
/// must not block the caller on network I/O; eventual outcomes arrive later
/// through the node callback surface (`on_endpoint_found`,
/// `on_connection_result`, `on_payload_received`, ...). Radio/Wi-Fi strategy
/// selection and negotiation timeouts live behind this trait, not in the
/// core.
pub trait Transport: Send + Sync {
    /// Advertise `local_name` under `service_id` so discoverers can find us
    fn start_advertising(&self, local_name: &str, service_id: &str) -> Result<()>;

    /// Start discovering endpoints advertising under `service_id`
    fn start_discovery(&self, service_id: &str) -> Result<()>;

    fn stop_advertising(&self) -> Result<()>;

    fn stop_discovery(&self) -> Result<()>;

    /// Ask `endpoint_id` to connect; the outcome arrives via
    /// `on_connection_result`
    fn request_connection(&self, local_name: &str, endpoint_id: &str) -> Result<()>;

    /// Accept an incoming connection previously surfaced via
    /// `on_connection_initiated`
    fn accept_connection(&self, endpoint_id: &str) -> Result<()>;

    /// Fire-and-forget delivery of one payload to one endpoint
    fn send_payload(&self, endpoint_id: &str, payload: Bytes) -> Result<()>;
}
