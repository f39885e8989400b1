use crate::error::Error;
use log::{trace, warn};
use std::io;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const RECV_BUFFER_LEN: usize = 1024;

// Longest single blocking wait, so cancellation is noticed while waiting.
const POLL_SLICE: Duration = Duration::from_millis(100);

pub trait Transport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<usize>;

    // Waits at most `timeout` for one datagram.
    fn recv(&mut self, buffer: &mut [u8], timeout: Duration) -> io::Result<usize>;
}

#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub fn connect(socket: UdpSocket, host: &str, port: u16) -> Result<Self, Error> {
        socket
            .connect((host, port))
            .map_err(|e| Error::Connect(format!("{}:{}", host, port), e))?;
        trace!("connected: {}:{}", host, port);
        Ok(UdpTransport { socket })
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.socket.send(bytes)
    }

    fn recv(&mut self, buffer: &mut [u8], timeout: Duration) -> io::Result<usize> {
        // A zero timeout means blocking forever to the socket.
        let timeout = timeout.max(Duration::from_millis(1));
        self.socket.set_read_timeout(Some(timeout))?;
        self.socket.recv(buffer).map_err(|e| match e.kind() {
            io::ErrorKind::WouldBlock => io::Error::new(io::ErrorKind::TimedOut, e),
            _ => e,
        })
    }
}

// Shared flag observed by the blocking receive, plus an optional deadline.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.map(|d| Instant::now() >= d).unwrap_or(false)
    }

    fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub sends: u32,
    pub receive_retries: u32,
    pub timeouts: u32,
}

#[derive(Debug)]
pub struct Link<T: Transport> {
    transport: T,
    stats: TransportStats,
}

impl<T: Transport> Link<T> {
    pub fn new(transport: T) -> Self {
        Link {
            transport,
            stats: TransportStats::default(),
        }
    }

    pub fn stats(&self) -> TransportStats {
        self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn send_and_wait(
        &mut self,
        frame: &[u8],
        timeout: Duration,
        max_tries: u32,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<u8>, Error> {
        self.exchange(frame, timeout, max_tries, cancel, |bytes| {
            Ok(Some(bytes.to_vec()))
        })
    }

    // Sends `frame` until `accept` yields an answer. `accept` returns
    // `Ok(None)` for datagrams that do not answer this frame, and the wait
    // goes on within the current try.
    pub fn exchange<R, F>(
        &mut self,
        frame: &[u8],
        timeout: Duration,
        max_tries: u32,
        cancel: Option<&CancelToken>,
        mut accept: F,
    ) -> Result<R, Error>
    where
        F: FnMut(&[u8]) -> Result<Option<R>, Error>,
    {
        let max_tries = max_tries.max(1);
        let mut buffer = [0u8; RECV_BUFFER_LEN];
        let mut last_send_error = None;
        let mut delivered = false;

        for attempt in 1..=max_tries {
            check(cancel)?;

            self.stats.sends += 1;
            trace!("send ({}/{}): {:02X?}", attempt, max_tries, frame);
            if let Err(e) = self.transport.send(frame) {
                warn!("send failed ({}/{}): {}", attempt, max_tries, e);
                last_send_error = Some(e);
                continue;
            }
            delivered = true;

            let deadline = Instant::now() + timeout;
            loop {
                check(cancel)?;

                let now = Instant::now();
                if now >= deadline {
                    self.stats.timeouts += 1;
                    warn!("no response ({}/{})", attempt, max_tries);
                    break;
                }

                let wait = (deadline - now).min(POLL_SLICE);
                match self.transport.recv(&mut buffer, wait) {
                    Ok(size) => {
                        let bytes = &buffer[..size];
                        trace!("recv: {:02X?}", bytes);
                        if let Some(answer) = accept(bytes)? {
                            return Ok(answer);
                        }
                    }
                    Err(e) if is_spurious(&e) => {
                        self.stats.receive_retries += 1;
                        warn!("spurious receive error, retrying: {}", e);
                    }
                    Err(e) if is_timeout(&e) => {}
                    Err(e) => return Err(Error::RecvPacket(e)),
                }
            }
        }

        match last_send_error {
            Some(e) if !delivered => Err(Error::SendPacket(e)),
            _ => Err(Error::NoResponse(max_tries)),
        }
    }
}

fn check(cancel: Option<&CancelToken>) -> Result<(), Error> {
    match cancel {
        Some(token) => token.check(),
        None => Ok(()),
    }
}

// ICMP port unreachable races surface on UDP sockets as these two errors.
fn is_spurious(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
    )
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}
