//! # Readiness notifications for activation sockets.
//!
//! [`Reactor`] is the narrow seam a [`Service`](crate::Service) uses to ask for
//! "tell me when this listening socket is readable". [`TokioReactor`] realizes it
//! on the tokio I/O driver with [`AsyncFd`].
//!
//! ## Dispatch contract
//! ```text
//! Supervisor::run
//!   loop:
//!     id = reactor.ready().await      (one readable socket, level-triggered)
//!     supervisor.handle_socket_ready(id)
//! ```
//! `ready()` re-checks readiness with a zero-timeout `poll` before reporting a
//! socket, so a queue drained by the previous dispatch is not reported again,
//! while a queue with more pending connections is.

use std::collections::HashMap;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd, RawFd};

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tokio::io::{unix::AsyncFd, Interest};

use crate::core::registry::ServiceId;
use crate::error::SetupError;

/// Read-readiness registration.
pub trait Reactor {
    /// Starts watching `fd` for `id`. The descriptor stays owned by the caller.
    fn watch(&mut self, id: ServiceId, fd: RawFd) -> Result<(), SetupError>;

    /// Stops watching whatever `id` registered. Unknown ids are ignored.
    fn unwatch(&mut self, id: ServiceId);
}

/// [`Reactor`] on the tokio I/O driver. Must be used inside a tokio runtime.
///
/// Each watched socket is registered through its own close-on-exec duplicate,
/// so the registration never outlives the descriptor it refers to.
#[derive(Debug, Default)]
pub struct TokioReactor {
    fds: HashMap<ServiceId, AsyncFd<OwnedFd>>,
}

impl TokioReactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `id` is currently watched.
    pub fn is_watching(&self, id: ServiceId) -> bool {
        self.fds.contains_key(&id)
    }

    /// Number of watched sockets.
    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    /// Waits until one watched socket has a pending connection.
    ///
    /// Never completes while nothing is watched.
    pub async fn ready(&self) -> ServiceId {
        loop {
            if self.fds.is_empty() {
                std::future::pending::<()>().await;
            }

            let waits = self
                .fds
                .iter()
                .map(|(id, fd)| Box::pin(async move { (*id, fd.readable().await) }));
            let ((id, res), _, _) = futures::future::select_all(waits).await;

            match res {
                Ok(mut guard) => {
                    if is_readable(guard.get_inner().as_fd()) {
                        return id;
                    }
                    guard.clear_ready();
                }
                Err(err) => {
                    tracing::warn!(service = %id, error = %err, "readiness wait failed");
                    return id;
                }
            }
        }
    }
}

impl Reactor for TokioReactor {
    fn watch(&mut self, id: ServiceId, fd: RawFd) -> Result<(), SetupError> {
        // SAFETY: the caller keeps `fd` open for the duration of this call.
        let dup = unsafe { BorrowedFd::borrow_raw(fd) }
            .try_clone_to_owned()
            .map_err(|source| SetupError::Watch { fd, source })?;
        // SAFETY: `dup` is owned by the AsyncFd and closed only when it is dropped.
        let async_fd = unsafe { AsyncFd::register_with_interest(dup, Interest::READABLE) }
            .map_err(|err| SetupError::Watch {
                fd,
                source: err.into_parts().1,
            })?;
        self.fds.insert(id, async_fd);
        Ok(())
    }

    fn unwatch(&mut self, id: ServiceId) {
        // Deregisters, then closes the duplicate. The caller's descriptor is untouched.
        self.fds.remove(&id);
    }
}

fn is_readable(fd: BorrowedFd<'_>) -> bool {
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    match poll(&mut fds, PollTimeout::ZERO) {
        Ok(n) => n > 0,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::{UnixListener, UnixStream};
    use std::time::Duration;

    fn listener(dir: &tempfile::TempDir, name: &str) -> UnixListener {
        let l = UnixListener::bind(dir.path().join(name)).unwrap();
        l.set_nonblocking(true).unwrap();
        l
    }

    #[tokio::test]
    async fn reports_only_sockets_with_pending_connections() {
        let dir = tempfile::tempdir().unwrap();
        let quiet = listener(&dir, "quiet");
        let busy = listener(&dir, "busy");

        let mut reactor = TokioReactor::new();
        reactor.watch(ServiceId::new(0), quiet.as_raw_fd()).unwrap();
        reactor.watch(ServiceId::new(1), busy.as_raw_fd()).unwrap();

        let _client = UnixStream::connect(dir.path().join("busy")).unwrap();
        let id = tokio::time::timeout(Duration::from_secs(5), reactor.ready())
            .await
            .unwrap();
        assert_eq!(id, ServiceId::new(1));

        // Drain it; nothing is ready anymore.
        busy.accept().unwrap();
        let again = tokio::time::timeout(Duration::from_millis(100), reactor.ready()).await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn unwatch_stops_reporting() {
        let dir = tempfile::tempdir().unwrap();
        let l = listener(&dir, "s");
        let mut reactor = TokioReactor::new();
        reactor.watch(ServiceId::new(3), l.as_raw_fd()).unwrap();
        assert!(reactor.is_watching(ServiceId::new(3)));

        reactor.unwatch(ServiceId::new(3));
        assert!(reactor.is_empty());

        let _client = UnixStream::connect(dir.path().join("s")).unwrap();
        let res = tokio::time::timeout(Duration::from_millis(100), reactor.ready()).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn registration_outlives_callers_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let l = listener(&dir, "s");
        let mut reactor = TokioReactor::new();
        reactor.watch(ServiceId::new(5), l.as_raw_fd()).unwrap();
        drop(l);

        let _client = UnixStream::connect(dir.path().join("s")).unwrap();
        let id = tokio::time::timeout(Duration::from_secs(5), reactor.ready())
            .await
            .unwrap();
        assert_eq!(id, ServiceId::new(5));

        reactor.unwatch(ServiceId::new(5));
        assert!(reactor.is_empty());
    }
}
