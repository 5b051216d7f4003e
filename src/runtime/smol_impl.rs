//! smol backend, with sockets driven by async-io.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_io::Async;
use futures::future::{self, Either};

use super::{AsyncUdpSocket, TimedOut};

pub struct UdpSocket(Async<std::net::UdpSocket>);

impl AsyncUdpSocket for UdpSocket {
    async fn bind(addr: &str) -> io::Result<Self> {
        Ok(UdpSocket(Async::new(std::net::UdpSocket::bind(addr)?)?))
    }

    // Connecting a UDP socket only sets the default peer; it never blocks.
    async fn connect(&self, peer: SocketAddr) -> io::Result<()> {
        self.0.get_ref().connect(peer)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.0.get_ref().local_addr()
    }

    async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        self.0.send(buf).await
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.recv(buf).await
    }
}

/// Start `future` on smol's global executor. smol cancels a task whose
/// handle is dropped, so the task is detached explicitly.
pub fn spawn<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    smol::spawn(future).detach();
}

pub async fn timeout_impl<F, T>(duration: Duration, future: F) -> Result<T, TimedOut>
where
    F: Future<Output = T>,
{
    let timer = smol::Timer::after(duration);
    futures::pin_mut!(future);
    match future::select(future, timer).await {
        Either::Left((value, _)) => Ok(value),
        Either::Right(_) => Err(TimedOut),
    }
}
