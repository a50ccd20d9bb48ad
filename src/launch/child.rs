//! Post-fork entry point. Runs only in the child and never returns.
//!
//! Order of operations:
//! 1. working directory
//! 2. scheduling priority (absolute niceness, not relative to the supervisor)
//! 3. stdio (redirect target, or detach and point at `/dev/null`)
//! 4. socket takeover onto fd 3
//! 5. privilege drop: gid, supplementary groups, uid
//! 6. `SIGPIPE` back to its default disposition
//! 7. `execve` with the prepared environment
//!
//! Any failure writes a static note to stderr and `_exit(127)`s. Nothing here
//! allocates.

use std::os::fd::RawFd;

use nix::unistd::{chdir, setgid, setgroups, setuid};

use super::plan::{LaunchPlan, Prepared, SOCKET_TAKEOVER_FD};

/// Exit code of a child whose setup failed before `exec`.
pub const SETUP_FAILED: i32 = 127;

const DEV_NULL: &[u8] = b"/dev/null\0";

pub(crate) fn run(plan: &LaunchPlan, prepared: &Prepared, socket: Option<RawFd>) -> ! {
    // The takeover slot and stdio get overwritten below; move the socket out of the way first.
    let socket = match socket {
        Some(fd) if fd <= SOCKET_TAKEOVER_FD => {
            let moved = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, SOCKET_TAKEOVER_FD + 1) };
            if moved < 0 {
                die(b"dup socket");
            }
            Some(moved)
        }
        other => other,
    };

    if let Some(dir) = &plan.working_directory {
        if chdir(dir.as_c_str()).is_err() {
            die(b"chdir");
        }
    }

    if unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, plan.nice) } == -1 {
        die(b"set priority");
    }

    match &plan.stdio {
        Some(path) => redirect_stdio(path.as_ptr()),
        None => detach_stdio(),
    }

    if let Some(fd) = socket {
        // dup2 leaves the new descriptor without FD_CLOEXEC.
        if unsafe { libc::dup2(fd, SOCKET_TAKEOVER_FD) } < 0 {
            die(b"socket takeover");
        }
    }

    if let Some(creds) = &plan.credentials {
        if setgid(creds.gid).is_err() || setgroups(&creds.groups).is_err() || setuid(creds.uid).is_err()
        {
            die(b"drop privileges");
        }
    }

    // The Rust runtime ignores SIGPIPE and ignored dispositions survive exec.
    if unsafe { libc::signal(libc::SIGPIPE, libc::SIG_DFL) } == libc::SIG_ERR {
        die(b"reset SIGPIPE");
    }

    unsafe {
        libc::execve(plan.path.as_ptr(), prepared.argv(), prepared.envp());
    }
    die(b"exec")
}

fn redirect_stdio(path: *const libc::c_char) {
    unsafe {
        libc::close(libc::STDIN_FILENO);
        let fd = libc::open(path, libc::O_RDWR);
        if fd < 0 {
            die(b"open stdio");
        }
        if fd != libc::STDIN_FILENO {
            if libc::dup2(fd, libc::STDIN_FILENO) < 0 {
                die(b"dup stdio");
            }
            libc::close(fd);
        }
        libc::dup2(libc::STDIN_FILENO, libc::STDOUT_FILENO);
        libc::dup2(libc::STDIN_FILENO, libc::STDERR_FILENO);

        if libc::isatty(libc::STDIN_FILENO) == 1 {
            libc::ioctl(libc::STDIN_FILENO, libc::TIOCSCTTY, 0);
        }
    }
}

fn detach_stdio() {
    unsafe {
        if libc::isatty(libc::STDIN_FILENO) == 1 {
            libc::ioctl(libc::STDIN_FILENO, libc::TIOCNOTTY);
        }
        libc::close(libc::STDIN_FILENO);
        libc::close(libc::STDOUT_FILENO);
        libc::close(libc::STDERR_FILENO);

        let fd = libc::open(DEV_NULL.as_ptr().cast(), libc::O_RDWR);
        if fd != libc::STDIN_FILENO {
            die(b"open /dev/null");
        }
        libc::dup2(libc::STDIN_FILENO, libc::STDOUT_FILENO);
        libc::dup2(libc::STDIN_FILENO, libc::STDERR_FILENO);
    }
}

fn die(step: &[u8]) -> ! {
    unsafe {
        let prefix = b"servisor: ";
        let suffix = b" failed\n";
        libc::write(libc::STDERR_FILENO, prefix.as_ptr().cast(), prefix.len());
        libc::write(libc::STDERR_FILENO, step.as_ptr().cast(), step.len());
        libc::write(libc::STDERR_FILENO, suffix.as_ptr().cast(), suffix.len());
        libc::_exit(SETUP_FAILED)
    }
}
