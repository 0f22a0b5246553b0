use libc::c_int;

use super::fd::{FcntlCmd, Fd, FdError, FdOps};
use super::last_errno;

/// The real descriptor syscalls, for hosts that have them.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeFdOps;

fn cvt(ret: c_int) -> Result<c_int, FdError> {
    if ret < 0 {
        Err(FdError::Os(last_errno()))
    } else {
        Ok(ret)
    }
}

impl FdOps for NativeFdOps {
    fn dup(&self, fd: Fd) -> Result<Fd, FdError> {
        // SAFETY: dup has no memory-safety preconditions.
        cvt(unsafe { libc::dup(fd) })
    }

    fn dup2(&self, oldfd: Fd, newfd: Fd) -> Result<Fd, FdError> {
        // SAFETY: dup2 has no memory-safety preconditions.
        cvt(unsafe { libc::dup2(oldfd, newfd) })
    }

    fn dup3(&self, oldfd: Fd, newfd: Fd, flags: c_int) -> Result<Fd, FdError> {
        #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
        {
            // SAFETY: dup3 has no memory-safety preconditions.
            cvt(unsafe { libc::dup3(oldfd, newfd, flags) })
        }

        #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
        {
            let fd = self.dup2(oldfd, newfd)?;
            if flags & libc::O_CLOEXEC != 0 {
                self.fcntl(fd, FcntlCmd::SetFd(libc::FD_CLOEXEC))?;
            }
            Ok(fd)
        }
    }

    fn fcntl(&self, fd: Fd, cmd: FcntlCmd) -> Result<c_int, FdError> {
        // SAFETY: every command below takes at most one integer argument.
        let ret = unsafe {
            match cmd {
                FcntlCmd::DupFd { min } => libc::fcntl(fd, libc::F_DUPFD, min),
                FcntlCmd::DupFdCloexec { min } => libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, min),
                FcntlCmd::GetFd => libc::fcntl(fd, libc::F_GETFD),
                FcntlCmd::GetFl => libc::fcntl(fd, libc::F_GETFL),
                FcntlCmd::SetFd(flags) => libc::fcntl(fd, libc::F_SETFD, flags),
                FcntlCmd::SetFl(flags) => libc::fcntl(fd, libc::F_SETFL, flags),
                FcntlCmd::Other(raw) => return Err(FdError::Unsupported(raw)),
            }
        };
        cvt(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(fd: Fd) {
        // SAFETY: closing a descriptor this test opened.
        unsafe { libc::close(fd) };
    }

    #[test]
    fn native_dup_allocates_a_new_number() {
        let ops = NativeFdOps;
        let fd = ops.dup(2).unwrap();
        assert_ne!(fd, 2);
        assert!(fd > 2);
        close(fd);
    }

    #[test]
    fn native_dupfd_respects_minimum() {
        let ops = NativeFdOps;
        let fd = ops.fcntl(2, FcntlCmd::DupFdCloexec { min: 100 }).unwrap();
        assert!(fd >= 100);
        let flags = ops.fcntl(fd, FcntlCmd::GetFd).unwrap();
        assert_ne!(flags & libc::FD_CLOEXEC, 0);
        close(fd);
    }

    #[test]
    fn native_dup_of_closed_descriptor_fails() {
        let ops = NativeFdOps;
        let err = ops.dup(-1).unwrap_err();
        assert_eq!(err.errno(), libc::EBADF);
    }
}
