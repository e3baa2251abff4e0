use crate::{PingInfo, Result, ServoId, Value};
use async_trait::async_trait;

/// Register-level access to every servo sharing one bus.
///
/// Implementations serialize access to the wire themselves; callers may hold the
/// transport behind an `Arc` and issue requests from a single owner.
#[async_trait]
pub trait ServoTransport: Send + Sync {
    /// Read one named register, converted to engineering units.
    async fn read(&self, id: ServoId, param: &str) -> Result<Value>;

    /// Write one named register from engineering units.
    ///
    /// When `await_response` is false the backend may return as soon as the
    /// packet is on the wire.
    async fn write(&self, id: ServoId, param: &str, value: Value, await_response: bool)
        -> Result<()>;

    /// Write one named register with an unconverted device value.
    async fn write_raw(&self, id: ServoId, param: &str, raw: i64, await_response: bool)
        -> Result<()>;

    /// Write the same register on several servos with a single packet.
    async fn sync_write(&self, param: &str, values: &[(ServoId, Value)]) -> Result<()>;

    /// Read the same register from several servos with a single packet.
    ///
    /// The outer error covers a failed exchange; the inner results carry the
    /// per-servo outcome.
    async fn fast_sync_read(
        &self,
        ids: &[ServoId],
        param: &str,
    ) -> Result<Vec<(ServoId, Result<Value>)>>;

    /// Ping one servo, or every servo when `id` is `None`.
    async fn ping(&self, id: Option<ServoId>) -> Result<Vec<PingInfo>>;
}

/// Construction of a transport from a port name.
pub trait Connect: Sized {
    /// Open a bus on `port` (e.g. "/dev/ttyUSB0") at `baud_rate`.
    fn open(port: &str, baud_rate: u32) -> Result<Self>;
}
