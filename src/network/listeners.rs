use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;

/// Binds a listener that no other socket can share.
///
/// Must be called from within a Tokio runtime.
pub fn create_exclusive_listener(
    addr: SocketAddr,
) -> std::io::Result<(SocketAddr, tokio::net::TcpListener)> {
    tracing::info!("Attempting to bind pairing server to {}...", addr);

    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // On Unix this only permits reuse of TIME_WAIT ports; a second live listener
    // on the same port is still refused. On Windows it would allow port stealing.
    #[cfg(unix)]
    socket.set_reuse_address(true)?;

    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    // Make it non-blocking for tokio
    socket.set_nonblocking(true)?;

    let std_listener: std::net::TcpListener = socket.into();
    let tokio_listener = tokio::net::TcpListener::from_std(std_listener)?;
    let local_addr = tokio_listener.local_addr()?;

    Ok((local_addr, tokio_listener))
}
