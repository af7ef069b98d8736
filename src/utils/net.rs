//! Network probes.

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;

/// Whether something is accepting TCP connections on `host:port`.
///
/// Connects and immediately drops the connection. A refused connection or a
/// connect that does not finish within `timeout` both count as not accepting.
pub async fn port_accepting(host: &str, port: u16, timeout: Duration) -> bool {
    let accepting = matches!(
        tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    );
    debug!(host = %host, port, accepting, "Checked service port");
    accepting
}
