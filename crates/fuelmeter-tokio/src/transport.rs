use fuelmeter_core::TransportError;

/// A persistent, message-oriented, bidirectional connection to one client.
///
/// Reads block until the next frame arrives or the connection fails. A
/// graceful close by the client, or the stream simply ending, is reported as
/// [`TransportError::Closed`].
pub trait Transport: Send + 'static {
    fn recv(&mut self) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    fn send(&mut self, frame: String) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Releases the connection. Failures are not interesting at this point.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}
