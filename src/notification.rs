use std::{io, time::Duration};

use tokio::sync::oneshot;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::{Error, Result};

/// Creates a single-use completion signal.
///
/// The [`Completer`] goes to the background reader, the [`Completion`] stays
/// with the caller. Completing consumes the completer, so at most one value is
/// ever delivered. Dropping the completion (timeout, or the caller abandoning
/// the probe) cancels the reader.
pub(crate) fn completion<T>() -> (Completer<T>, Completion<T>) {
    let (sender, receiver) = oneshot::channel();
    let token = CancellationToken::new();
    (
        Completer {
            sender,
            token: token.clone(),
        },
        Completion { receiver, token },
    )
}

#[derive(Debug)]
pub(crate) struct Completer<T> {
    sender: oneshot::Sender<T>,
    token: CancellationToken,
}

impl<T> Completer<T> {
    /// Delivers `value`; returns false if nobody is waiting anymore.
    pub(crate) fn complete(self, value: T) -> bool {
        self.sender.send(value).is_ok()
    }

    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

#[derive(Debug)]
pub(crate) struct Completion<T> {
    receiver: oneshot::Receiver<T>,
    token: CancellationToken,
}

impl<T> Completion<T> {
    /// Waits for the value for at most `timeout`.
    pub(crate) async fn wait(mut self, timeout: Duration) -> Result<T> {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(Error::Receive(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "capture reader stopped without a reply",
            ))),
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
