//! # Activation sockets.
//!
//! Listening sockets owned by the supervisor on behalf of lazily started
//! services. A socket is created once per service and survives restarts of the
//! process it is handed to.
//!
//! ## Setup sequence
//! ```text
//! mkdir -p parent ─► unlink stale socket ─► socket(NONBLOCK|CLOEXEC)
//!                 ─► bind ─► chown (if account) ─► chmod ─► listen(backlog)
//! ```
//! Ownership and mode are applied to the bound path before `listen`, so no
//! client can connect while the socket still has the default mode.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use nix::sys::socket::{
    accept4, bind, listen, socket, AddressFamily, Backlog, SockFlag, SockType, UnixAddr,
};
use nix::sys::stat::{fchmodat, FchmodatFlags, Mode};

use crate::error::SetupError;
use crate::sources::Account;

/// Creates, binds and starts listening on a local stream socket at `path`.
pub fn open_listener(
    path: &Path,
    permissions: u32,
    account: Option<&Account>,
    backlog: i32,
) -> Result<OwnedFd, SetupError> {
    let fail = |op: &'static str| move |errno| SetupError::Socket {
        op,
        path: path.to_path_buf(),
        errno,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| SetupError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    remove_stale(path)?;

    let fd = socket(
        AddressFamily::Unix,
        SockType::Stream,
        SockFlag::SOCK_NONBLOCK | SockFlag::SOCK_CLOEXEC,
        None,
    )
    .map_err(fail("socket"))?;

    let addr = UnixAddr::new(path).map_err(fail("bind"))?;
    bind(fd.as_raw_fd(), &addr).map_err(fail("bind"))?;

    if let Some(acct) = account {
        nix::unistd::chown(path, Some(acct.uid), Some(acct.gid)).map_err(fail("chown"))?;
    }
    fchmodat(
        None,
        path,
        Mode::from_bits_truncate(permissions as libc::mode_t),
        FchmodatFlags::FollowSymlink,
    )
    .map_err(fail("chmod"))?;

    let backlog = Backlog::new(backlog).map_err(fail("listen"))?;
    listen(&fd, backlog).map_err(fail("listen"))?;

    Ok(fd)
}

/// Accepts one pending connection. The returned descriptor is close-on-exec.
///
/// A drained queue yields a [`SetupError`] for which `is_would_block()` holds.
pub fn accept_connection(listener: RawFd, path: &Path) -> Result<OwnedFd, SetupError> {
    let fd = accept4(listener, SockFlag::SOCK_CLOEXEC).map_err(|errno| SetupError::Socket {
        op: "accept",
        path: path.to_path_buf(),
        errno,
    })?;
    // SAFETY: accept4 just returned this descriptor and nothing else owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Removes a socket file left behind by a previous run. Anything else at the path is kept
/// (and makes `bind` fail).
fn remove_stale(path: &Path) -> Result<(), SetupError> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            std::fs::remove_file(path).map_err(|e| SetupError::Socket {
                op: "unlink",
                path: path.to_path_buf(),
                errno: nix::errno::Errno::from_raw(e.raw_os_error().unwrap_or(libc::EIO)),
            })
        }
        _ => Ok(()),
    }
}
