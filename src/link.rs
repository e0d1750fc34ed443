use std::{future::Future, io};

use afpacket::tokio::RawPacketStream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};

/// Transmit half of a link-layer handle.
pub trait FrameTx: Send {
    fn send_frame(&mut self, frame: &[u8]) -> impl Future<Output = io::Result<()>> + Send;
}

/// Capture half of a link-layer handle.
///
/// Each call yields exactly one frame, truncated to `buf.len()`.
pub trait FrameRx: Send + 'static {
    fn recv_frame(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;
}

/// A handle bound to one interface that can both send and capture raw frames.
pub trait LinkChannel {
    type Tx: FrameTx;
    type Rx: FrameRx;

    fn split(self) -> (Self::Tx, Self::Rx);
}

/// Opens a packet socket bound to `interface_name`.
pub fn open_link(interface_name: &str) -> Result<RawPacketStream> {
    let mut stream = RawPacketStream::new().map_err(|source| Error::HandleOpen {
        what: "packet stream",
        source,
    })?;
    stream
        .bind(interface_name)
        .map_err(|source| Error::HandleOpen {
            what: "interface binding",
            source,
        })?;
    Ok(stream)
}

impl FrameTx for RawPacketStream {
    async fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.write_all(frame).await
    }
}

impl FrameRx for RawPacketStream {
    async fn recv_frame(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf).await
    }
}

impl LinkChannel for RawPacketStream {
    type Tx = RawPacketStream;
    type Rx = RawPacketStream;

    fn split(self) -> (Self::Tx, Self::Rx) {
        (self.clone(), self)
    }
}
