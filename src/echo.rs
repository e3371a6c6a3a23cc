//! Synchronous request/response over a TCP stream.
//!
//! [`EchoServer`] accepts a single connection and acknowledges every chunk it reads with
//! `ACK: <chunk>`, until the client closes the connection. [`exchange`] is the matching client: it
//! sends each message in turn and blocks for the reply before sending the next one.

use std::{
    io::{self, Read, Write},
    net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    thread,
    time::Duration,
};

use crate::unit::UnitBuilder;

/// Maximum number of bytes read from the stream at once, on both sides.
pub const MAX_CHUNK: usize = 1024;

/// Builds the server's reply to `request`.
pub fn ack(request: &str) -> String {
    format!("ACK: {request}")
}

/// A TCP server that serves exactly one connection.
#[derive(Debug)]
pub struct EchoServer {
    listener: TcpListener,
}

impl EchoServer {
    /// Binds the server's listening socket. Port 0 picks a free port.
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        log::debug!("echo server listening on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts one connection and answers every chunk read from it, waiting `delay` before each
    /// answer.
    ///
    /// Returns the number of chunks answered, once the client has closed the connection.
    pub fn serve_one(self, delay: Duration) -> io::Result<usize> {
        let (mut stream, peer) = self.listener.accept()?;
        log::debug!("echo server connected by {peer}");

        let mut buf = [0; MAX_CHUNK];
        let mut served = 0;
        loop {
            let n = stream.read(&mut buf)?;
            if n == 0 {
                break;
            }
            let request = String::from_utf8_lossy(&buf[..n]);
            log::trace!("echo server received {request:?}");

            let response = ack(&request);
            thread::sleep(delay);
            log::trace!("echo server sending {response:?}");
            stream.write_all(response.as_bytes())?;
            served += 1;
        }

        log::debug!("echo server shutting down after {served} exchange(s)");
        Ok(served)
    }
}

/// Connects to `addr` and sends each of `messages`, waiting for the reply to one before sending
/// the next. Pauses for `pause` after every reply.
///
/// Returns the replies in order. Fails if the server closes the connection before replying.
pub fn exchange<A, M>(addr: A, messages: &[M], pause: Duration) -> io::Result<Vec<String>>
where
    A: ToSocketAddrs,
    M: AsRef<str>,
{
    let mut stream = TcpStream::connect(addr)?;
    log::debug!("echo client connected to {}", stream.peer_addr()?);

    let mut buf = [0; MAX_CHUNK];
    let mut replies = Vec::with_capacity(messages.len());
    for msg in messages {
        let msg = msg.as_ref();
        log::trace!("echo client sending {msg:?}");
        stream.write_all(msg.as_bytes())?;

        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "server closed the connection before replying",
            ));
        }
        let reply = String::from_utf8_lossy(&buf[..n]).into_owned();
        log::trace!("echo client received {reply:?}");
        replies.push(reply);

        thread::sleep(pause);
    }
    Ok(replies)
}

/// Parameters of [`run_echo`].
///
/// The defaults match the demonstration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoConfig {
    addr: SocketAddr,
    messages: Vec<String>,
    server_delay: Duration,
    client_pause: Duration,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            addr: (Ipv4Addr::LOCALHOST, 65432).into(),
            messages: ["Hello", "Distributed", "Systems"].map(String::from).into(),
            server_delay: Duration::from_secs(1),
            client_pause: Duration::from_secs(1),
        }
    }
}

impl EchoConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the address the server binds to. Port 0 picks a free port.
    pub fn addr<A: Into<SocketAddr>>(self, addr: A) -> Self {
        Self {
            addr: addr.into(),
            ..self
        }
    }

    /// Sets the messages the client sends.
    pub fn messages<I, M>(self, messages: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        Self {
            messages: messages.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    /// Sets how long the server takes to answer each message.
    pub fn server_delay(self, server_delay: Duration) -> Self {
        Self {
            server_delay,
            ..self
        }
    }

    /// Sets how long the client waits after each reply.
    pub fn client_pause(self, client_pause: Duration) -> Self {
        Self {
            client_pause,
            ..self
        }
    }
}

/// What happened during [`run_echo`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoOutcome {
    /// The replies the client received, in order.
    pub replies: Vec<String>,
    /// The number of messages the server answered.
    pub served: usize,
}

/// Runs an [`EchoServer`] on a background thread and [`exchange`]s the configured messages with
/// it.
///
/// The server is bound before the client connects, so no start-up delay is needed.
pub fn run_echo(config: &EchoConfig) -> io::Result<EchoOutcome> {
    let server = EchoServer::bind(config.addr)?;
    let addr = server.local_addr()?;
    let delay = config.server_delay;
    let server = UnitBuilder::new()
        .name("echo-server")
        .spawn(move || server.serve_one(delay))?;

    let replies = match exchange(addr, config.messages.as_slice(), config.client_pause) {
        Ok(replies) => replies,
        Err(err) => {
            log::warn!("echo client failed: {err}");
            // The server might still be waiting in `accept`. Connecting and hanging up right away
            // lets it finish, so it can be joined.
            drop(TcpStream::connect(addr));
            server.join().ok();
            return Err(err);
        }
    };

    let served = server.join()??;
    Ok(EchoOutcome { replies, served })
}

#[cfg(test)]
mod tests {
    use crate::unit::Unit;

    use super::*;

    fn serve(server: EchoServer) -> Unit<io::Result<usize>> {
        UnitBuilder::new()
            .name("echo-server")
            .spawn(move || server.serve_one(Duration::ZERO))
            .unwrap()
    }

    fn local() -> SocketAddr {
        (Ipv4Addr::LOCALHOST, 0).into()
    }

    #[test]
    fn ack_format() {
        assert_eq!(ack("Hello"), "ACK: Hello");
    }

    #[test]
    fn defaults() {
        let config = EchoConfig::default();
        assert_eq!(config.addr, "127.0.0.1:65432".parse::<SocketAddr>().unwrap());
        assert_eq!(config.messages, ["Hello", "Distributed", "Systems"]);
        assert_eq!(config.server_delay, Duration::from_secs(1));
        assert_eq!(config.client_pause, Duration::from_secs(1));
    }

    #[test]
    fn client_and_server() {
        let server = EchoServer::bind(local()).unwrap();
        let addr = server.local_addr().unwrap();
        let server = serve(server);

        let replies = exchange(addr, &["a", "bc"], Duration::ZERO).unwrap();
        assert_eq!(replies, ["ACK: a", "ACK: bc"]);
        assert_eq!(server.join().unwrap().unwrap(), 2);
    }

    #[test]
    fn run_echo_scenario() {
        let config = EchoConfig::new()
            .addr(local())
            .server_delay(Duration::ZERO)
            .client_pause(Duration::ZERO);
        let outcome = run_echo(&config).unwrap();
        assert_eq!(
            outcome.replies,
            ["ACK: Hello", "ACK: Distributed", "ACK: Systems"]
        );
        assert_eq!(outcome.served, 3);
    }

    #[test]
    fn server_stops_when_client_hangs_up_immediately() {
        let server = EchoServer::bind(local()).unwrap();
        let addr = server.local_addr().unwrap();
        let server = serve(server);

        let replies = exchange::<_, &str>(addr, &[], Duration::ZERO).unwrap();
        assert!(replies.is_empty());
        assert_eq!(server.join().unwrap().unwrap(), 0);
    }

    #[test]
    fn connection_refused() {
        // Find a free port, then stop listening on it.
        let addr = TcpListener::bind(local()).unwrap().local_addr().unwrap();
        let err = exchange(addr, &["x"], Duration::ZERO).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }
}
