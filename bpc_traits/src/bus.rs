/// Point-to-point transport to an addressable sensor bus.
///
/// The bus carries short ASCII commands and replies. A transport only
/// moves text to and from a given address; framing and payload parsing
/// belong to the device layer on top of it.
///
/// Replies are returned as `"<status>: <payload>"` where `status` is the
/// device's one-byte response code rendered in decimal. Transport-level
/// failures (no ACK, bus fault, io) are reported as errors and are
/// distinct from a device answering "no data".
pub trait BusTransport {
    /// Send a command to the device at `address`.
    fn write(
        &mut self,
        address: u8,
        command: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Read the pending reply from the device at `address`.
    fn read(&mut self, address: u8) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;
}
