//! Read and write ends bound to raw descriptor numbers.
//!
//! Binding does not validate or take ownership of the descriptor: a stream
//! bound to fd 0 reads whatever fd 0 is, and dropping the stream never
//! closes it.

use std::io;

#[cfg(unix)]
use tokio::sync::mpsc;
#[cfg(unix)]
use tracing::debug;

use crate::posix::Fd;

#[cfg(unix)]
const CHUNK_QUEUE_DEPTH: usize = 16;

/// Chunks from a started [`ReadStream`]. `Err` ends the stream.
#[derive(Debug)]
pub struct Chunks(Source);

#[derive(Debug)]
enum Source {
    #[cfg(unix)]
    Thread(mpsc::Receiver<io::Result<Vec<u8>>>),
    Inline {
        stream: ReadStream,
        buf: Vec<u8>,
        done: bool,
    },
}

impl Chunks {
    /// Next chunk, or `None` at end of stream.
    pub async fn next(&mut self) -> Option<io::Result<Vec<u8>>> {
        match &mut self.0 {
            #[cfg(unix)]
            Source::Thread(rx) => rx.recv().await,
            Source::Inline { stream, buf, done } => {
                if *done {
                    return None;
                }
                let result = match stream.read_chunk(buf) {
                    Ok(0) => {
                        *done = true;
                        return None;
                    }
                    Ok(n) => Ok(buf[..n].to_vec()),
                    Err(e) => {
                        *done = true;
                        Err(e)
                    }
                };
                // Let other tasks on a single-threaded loop run between reads.
                tokio::task::yield_now().await;
                Some(result)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStream {
    fd: Option<Fd>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStream {
    fd: Option<Fd>,
}

fn unbound() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "stream is not bound to a descriptor")
}

impl ReadStream {
    /// `rstream_init_fd`: bind to `fd` as-is.
    pub fn init_fd(&mut self, fd: Fd) {
        self.fd = Some(fd);
    }

    pub fn fd(&self) -> Option<Fd> {
        self.fd
    }

    /// One blocking `read(2)`. `Ok(0)` is end of stream.
    pub fn read_chunk(&self, buf: &mut [u8]) -> io::Result<usize> {
        let fd = self.fd.ok_or_else(unbound)?;
        loop {
            // SAFETY: buf is valid for writes of buf.len() bytes.
            let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    /// `rstream_start`: begin delivering chunks of up to `chunk_size` bytes.
    ///
    /// Unix reads on a dedicated thread so the loop only ever sees complete
    /// chunks. Targets without threads (WASI) read inline on the loop.
    pub fn start(&self, chunk_size: usize) -> io::Result<Chunks> {
        #[cfg(unix)]
        {
            self.start_thread(chunk_size)
        }
        #[cfg(not(unix))]
        {
            self.start_inline(chunk_size)
        }
    }

    /// Blocking reads performed by [`Chunks::next`] itself.
    pub fn start_inline(&self, chunk_size: usize) -> io::Result<Chunks> {
        self.fd.ok_or_else(unbound)?;
        Ok(Chunks(Source::Inline {
            stream: *self,
            buf: vec![0u8; chunk_size.max(1)],
            done: false,
        }))
    }

    /// The reader thread exits at end of stream, on a read error, or once
    /// the [`Chunks`] are dropped.
    #[cfg(unix)]
    fn start_thread(&self, chunk_size: usize) -> io::Result<Chunks> {
        let stream = *self;
        let fd = stream.fd.ok_or_else(unbound)?;
        let (tx, rx) = mpsc::channel(CHUNK_QUEUE_DEPTH);

        std::thread::Builder::new()
            .name(format!("rstream-fd{}", fd))
            .spawn(move || {
                let mut buf = vec![0u8; chunk_size.max(1)];
                loop {
                    match stream.read_chunk(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if tx.blocking_send(Ok(buf[..n].to_vec())).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            let _ = tx.blocking_send(Err(e));
                            break;
                        }
                    }
                }
                debug!(fd, "reader finished");
            })?;

        Ok(Chunks(Source::Thread(rx)))
    }
}

impl WriteStream {
    /// `wstream_init_fd`: bind to `fd` as-is.
    pub fn init_fd(&mut self, fd: Fd) {
        self.fd = Some(fd);
    }

    pub fn fd(&self) -> Option<Fd> {
        self.fd
    }

    pub fn write_all(&self, mut data: &[u8]) -> io::Result<()> {
        let fd = self.fd.ok_or_else(unbound)?;
        while !data.is_empty() {
            // SAFETY: data is valid for reads of data.len() bytes.
            let n = unsafe { libc::write(fd, data.as_ptr().cast(), data.len()) };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if n == 0 {
                return Err(io::Error::from(io::ErrorKind::WriteZero));
            }
            data = &data[n as usize..];
        }
        Ok(())
    }
}
