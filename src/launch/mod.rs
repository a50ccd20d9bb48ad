//! Process launcher.
//!
//! [`Launch`] is the seam between a [`Service`](crate::Service) and the OS:
//! one call creates exactly one process and returns its pid to the parent.
//! [`ForkExec`] is the real implementation; the child side lives in `child`
//! and never returns.
//!
//! ## Contract
//! ```text
//! launch(plan, socket)
//!   ├─ parent: Ok(pid)                 (or Err(SetupError::Fork))
//!   └─ child:  chdir → setpriority → stdio → fd 3 → setgid/setgroups/setuid → SIGPIPE → execve
//!              any failure ─► _exit(127), seen by the parent as a fast failure
//! ```

mod child;
mod plan;

use std::os::fd::RawFd;

use nix::unistd::{fork, ForkResult, Pid};

use crate::error::SetupError;

pub use child::SETUP_FAILED;
pub use plan::{Credentials, LaunchPlan, Prepared, SOCKET_TAKEOVER_ENV, SOCKET_TAKEOVER_FD};

/// Creates service processes.
pub trait Launch {
    /// Starts one process for `plan`, handing `socket` over on fd 3 if given.
    fn launch(&mut self, plan: &LaunchPlan, socket: Option<RawFd>) -> Result<Pid, SetupError>;
}

/// `fork` + `execve` launcher.
#[derive(Clone, Copy, Debug, Default)]
pub struct ForkExec;

impl Launch for ForkExec {
    fn launch(&mut self, plan: &LaunchPlan, socket: Option<RawFd>) -> Result<Pid, SetupError> {
        let prepared = plan.prepare(socket.is_some());

        // SAFETY: the child only runs `child::run`, which performs raw syscalls on
        // data prepared above and ends in `execve` or `_exit`.
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => Ok(child),
            Ok(ForkResult::Child) => child::run(plan, &prepared, socket),
            Err(errno) => Err(SetupError::Fork(errno)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::ExitStatus;
    use crate::services::{Priority, ServiceDescriptor};
    use crate::sources::Account;
    use nix::sys::signal::Signal;
    use nix::sys::wait::waitpid;
    use nix::unistd::{Gid, Uid};

    fn run_to_exit(d: ServiceDescriptor, socket: Option<RawFd>) -> ExitStatus {
        let plan = LaunchPlan::new(&d).unwrap();
        let pid = ForkExec.launch(&plan, socket).unwrap();
        let status = waitpid(pid, None).unwrap();
        let (reaped, exit) = ExitStatus::from_wait(status).unwrap();
        assert_eq!(reaped, pid);
        exit
    }

    fn sh(name: &str, script: &str) -> ServiceDescriptor {
        ServiceDescriptor::builder(name)
            .executable("/bin/sh")
            .arguments(["-c", script])
            .build()
            .unwrap()
    }

    #[test]
    fn echo_exits_cleanly() {
        let d = ServiceDescriptor::builder("echo")
            .executable("/bin/echo")
            .arguments(["hi"])
            .build()
            .unwrap();
        assert_eq!(run_to_exit(d, None), ExitStatus::Exited(0));
    }

    #[test]
    fn environment_and_working_directory_reach_child() {
        let dir = tempfile::tempdir().unwrap();
        let d = ServiceDescriptor::builder("env")
            .executable("/bin/sh")
            .arguments(["-c", r#"test "$GREETING" = hello && test "$(pwd -P)" = "$EXPECT""#])
            .environment([
                "GREETING=hello".to_string(),
                format!("EXPECT={}", dir.path().canonicalize().unwrap().display()),
            ])
            .working_directory(dir.path())
            .build()
            .unwrap();
        assert_eq!(run_to_exit(d, None), ExitStatus::Exited(0));
    }

    #[test]
    fn missing_working_directory_kills_child() {
        let d = ServiceDescriptor::builder("nowhere")
            .executable("/bin/true")
            .working_directory("/nonexistent/servisor/dir")
            .build()
            .unwrap();
        assert_eq!(run_to_exit(d, None), ExitStatus::Exited(SETUP_FAILED));
    }

    #[test]
    fn exec_failure_exits_with_setup_code() {
        let d = ServiceDescriptor::builder("ghost")
            .executable("/nonexistent/servisor/binary")
            .build()
            .unwrap();
        assert_eq!(run_to_exit(d, None), ExitStatus::Exited(SETUP_FAILED));
    }

    #[test]
    fn stdio_is_detached_without_target() {
        // stdin is /dev/null: reading yields EOF immediately.
        let d = sh("null", r#"test -z "$(cat)" && test -c /dev/stdin"#);
        assert_eq!(run_to_exit(d, None), ExitStatus::Exited(0));
    }

    #[test]
    fn stdio_redirects_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.log");
        std::fs::write(&out, b"").unwrap();
        let d = ServiceDescriptor::builder("redir")
            .executable("/bin/sh")
            .arguments(["-c", "echo redirected"])
            .stdio(&out)
            .build()
            .unwrap();
        assert_eq!(run_to_exit(d, None), ExitStatus::Exited(0));
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "redirected\n");
    }

    #[test]
    fn socket_is_handed_over_on_fd_3() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s");
        let listener = std::os::unix::net::UnixListener::bind(&path).unwrap();
        let fd = std::os::fd::AsRawFd::as_raw_fd(&listener);

        let d = sh("takeover", r#"test "$SOCKET_TAKEOVER" = 1 && test -S /dev/fd/3"#);
        assert_eq!(run_to_exit(d.clone(), Some(fd)), ExitStatus::Exited(0));
        // Without a socket there is no marker and nothing on fd 3.
        assert_eq!(run_to_exit(d, None), ExitStatus::Exited(1));
    }

    /// Exits with the child's niceness (field 19 of `/proc/self/stat`) shifted by 20.
    fn reports_niceness(priority: Priority) -> ServiceDescriptor {
        ServiceDescriptor::builder("nice")
            .executable("/bin/sh")
            .arguments(["-c", "n=$(cut -d' ' -f19 /proc/$$/stat); exit $((n + 20))"])
            .priority(priority)
            .build()
            .unwrap()
    }

    /// True if this process holds `CAP_SYS_NICE` (bit 23 of `CapEff`).
    fn can_lower_niceness() -> bool {
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|status| {
                let hex = status.lines().find_map(|l| l.strip_prefix("CapEff:"))?;
                u64::from_str_radix(hex.trim(), 16).ok()
            })
            .is_some_and(|caps| caps & (1 << 23) != 0)
    }

    #[test]
    fn priority_is_absolute() {
        let own = unsafe { libc::getpriority(libc::PRIO_PROCESS, 0) };
        let privileged = can_lower_niceness();

        for (priority, nice) in [(Priority::Low, 10), (Priority::Normal, 0), (Priority::High, -10)] {
            assert_eq!(priority.nice_value(), nice);
            // Lowering niceness below our own needs privilege.
            if privileged || own <= nice {
                assert_eq!(
                    run_to_exit(reports_niceness(priority), None),
                    ExitStatus::Exited(nice + 20),
                    "{priority:?}"
                );
            }
        }
    }

    #[test]
    fn sigpipe_has_default_disposition() {
        let d = sh("pipe", "kill -PIPE $$; exit 0");
        assert_eq!(run_to_exit(d, None), ExitStatus::Signaled(Signal::SIGPIPE));
    }

    #[test]
    fn privileges_are_dropped_before_exec() {
        if !Uid::effective().is_root() {
            return;
        }
        let nobody = Account {
            name: "nobody".into(),
            uid: Uid::from_raw(65534),
            gid: Gid::from_raw(65534),
            extra_gids: vec![],
            home: "/nonexistent-home".into(),
        };
        let d = ServiceDescriptor::builder("dropped")
            .executable("/bin/sh")
            .arguments([
                "-c",
                r#"test "$(id -u)" = 65534 && test "$(id -g)" = 65534 && test "$(id -G)" = 65534 && test "$HOME" = /nonexistent-home"#,
            ])
            .account(nobody)
            .build()
            .unwrap();
        assert_eq!(run_to_exit(d, None), ExitStatus::Exited(0));
    }
}
