//! CLI subcommand: `stdio-shim probe`
//!
//! Prints what the build's descriptor operations return for the standard
//! streams and one ordinary descriptor.

use anyhow::Result;

use wasi_stdio_shim::posix::{self, FcntlCmd, Fd, FdOps, is_standard_stream};

/// An ordinary descriptor number to probe alongside 0..=2.
const SAMPLE_FD: Fd = 5;
const SAMPLE_MIN: Fd = 10;

pub fn run() -> Result<()> {
    let ops = posix::fd_ops();
    let kind = if posix::emulated() { "emulated" } else { "native" };

    println!("Descriptor operations: {}", kind);
    println!("{}", "=".repeat(23 + kind.len()));
    for line in probe_lines(&ops, release) {
        println!("{}", line);
    }
    Ok(())
}

/// Close descriptors a native probe allocated. Emulated results are
/// numbers echoed back, never real descriptors.
#[cfg(unix)]
fn release(fd: Fd) {
    if posix::emulated() || is_standard_stream(fd) {
        return;
    }
    // SAFETY: fd was just returned by dup/fcntl in this process and is not
    // used afterwards.
    unsafe {
        libc::close(fd);
    }
}

#[cfg(not(unix))]
fn release(_fd: Fd) {}

fn probe_lines<F: FdOps>(ops: &F, mut release: impl FnMut(Fd)) -> Vec<String> {
    let mut lines = Vec::new();
    let mut record = |label: String, result: Result<Fd, posix::FdError>, allocates: bool| {
        let text = match result {
            Ok(fd) => {
                if allocates {
                    release(fd);
                }
                fd.to_string()
            }
            Err(e) => format!("error: {} (errno {})", e, e.errno()),
        };
        lines.push(format!("{:<32} {}", label, text));
    };

    for fd in [0, 1, 2, SAMPLE_FD] {
        record(format!("dup({})", fd), ops.dup(fd), true);
        record(
            format!("fcntl({}, F_DUPFD_CLOEXEC, {})", fd, SAMPLE_MIN),
            ops.fcntl(fd, FcntlCmd::DupFdCloexec { min: SAMPLE_MIN }),
            true,
        );
        record(format!("fcntl({}, F_GETFL)", fd), ops.fcntl(fd, FcntlCmd::GetFl), false);
    }
    record("dup(-1)".to_string(), ops.dup(-1), false);
    record(
        "fcntl(0, 9999)".to_string(),
        ops.fcntl(0, FcntlCmd::from_raw(9999, 0)),
        false,
    );
    lines
}
