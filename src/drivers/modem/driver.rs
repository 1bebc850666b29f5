//! AT-command modem driver
//! ===========================================================

use embassy_time::{with_timeout, Duration};
use embedded_io_async::{Read, Write};
use heapless::Vec;

use super::protocol::{self as p, Reply};
use crate::error::Error;

const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_millis(2_000);

pub type Line = Vec<u8, { p::LINE_MAX }>;

/* ------------------------------------------------------------------------- */
/*  Main driver struct                                                       */
/* ------------------------------------------------------------------------- */
pub struct Modem<T> {
    io: T,
    rx: [u8; p::RX_BUF_LEN],
    rx_len: usize,
    /// Last data line of the last command.
    response: Line,
    timeout: Duration,
}

impl<T: Read + Write> Modem<T> {
    pub fn new(io: T) -> Self {
        Self {
            io,
            rx: [0; p::RX_BUF_LEN],
            rx_len: 0,
            response: Line::new(),
            timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }

    /// Bound on the wait for each reply line.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /* ================= public API ============================ */

    /// Sends one command and waits for its final status. Echo, events and blank lines are
    /// skipped; the last data line is kept in [`Modem::response`].
    pub async fn command(&mut self, cmd: &str) -> Result<(), Error> {
        self.response.clear();
        trace!("modem <- {}", cmd);
        self.write_all(cmd.as_bytes()).await?;
        self.write_all(p::LINE_END).await?;
        self.io.flush().await.map_err(|_| Error::Transport)?;

        let mut line = Line::new();
        loop {
            self.next_line(&mut line).await?;
            match p::classify(&line) {
                Reply::Ok => return Ok(()),
                Reply::Error => {
                    warn!("modem rejected {}: {}", cmd, as_str(&line));
                    return Err(Error::Transport);
                }
                Reply::Event => debug!("modem event {}", as_str(&line)),
                Reply::Data if line.as_slice() == cmd.as_bytes() => {}
                Reply::Data => self.response.clone_from(&line),
                Reply::Blank => {}
            }
        }
    }

    /// Checks the modem answers at all.
    pub async fn ping(&mut self) -> Result<(), Error> {
        self.command(p::AT).await
    }

    pub fn response(&self) -> &[u8] {
        &self.response
    }

    pub fn release(self) -> T {
        self.io
    }

    /* ================= line reader =========================== */

    async fn next_line(&mut self, line: &mut Line) -> Result<(), Error> {
        loop {
            if let Some(end) = self.rx[..self.rx_len].iter().position(|&b| b == b'\n') {
                let raw = &self.rx[..end];
                let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
                line.clear();
                // Overlong lines are truncated
                let keep = raw.len().min(p::LINE_MAX);
                let _ = line.extend_from_slice(&raw[..keep]);

                self.rx.copy_within(end + 1..self.rx_len, 0);
                self.rx_len -= end + 1;
                return Ok(());
            }

            if self.rx_len == self.rx.len() {
                error!("modem line overflow, dropping {} bytes", self.rx_len);
                self.rx_len = 0;
            }

            match with_timeout(self.timeout, self.io.read(&mut self.rx[self.rx_len..])).await {
                Ok(Ok(0)) => return Err(Error::Transport),
                Ok(Ok(n)) => self.rx_len += n,
                Ok(Err(_)) => return Err(Error::Transport),
                Err(_) => {
                    warn!("modem reply timeout");
                    return Err(Error::Timeout);
                }
            }
        }
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.io.write_all(bytes).await.map_err(|_| Error::Transport)
    }
}

fn as_str(line: &[u8]) -> &str {
    core::str::from_utf8(line).unwrap_or("<binary>")
}

#[cfg(test)]
pub(crate) mod mock {
    use core::convert::Infallible;
    use std::collections::VecDeque;
    use std::vec::Vec;

    use embedded_io_async::{ErrorType, Read, Write};

    /// Scripted modem UART: every line written pops the next reply (default `OK`).
    /// A reply of `""` leaves the modem silent.
    #[derive(Default)]
    pub struct Port {
        pub written: Vec<u8>,
        pub replies: VecDeque<&'static str>,
        /// Largest read served at once, 0 for unlimited.
        pub read_chunk: usize,
        out: VecDeque<u8>,
    }

    impl Port {
        pub fn script(replies: &[&'static str]) -> Self {
            Self {
                replies: replies.iter().copied().collect(),
                ..Self::default()
            }
        }

        pub fn lines(&self) -> Vec<&str> {
            core::str::from_utf8(&self.written)
                .unwrap()
                .split_terminator("\r\n")
                .collect()
        }
    }

    impl ErrorType for Port {
        type Error = Infallible;
    }

    impl Write for Port {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
            for &b in buf {
                self.written.push(b);
                if b == b'\n' {
                    let reply = self.replies.pop_front().unwrap_or("OK\r\n");
                    self.out.extend(reply.as_bytes());
                }
            }
            Ok(buf.len())
        }
    }

    impl Read for Port {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
            if self.out.is_empty() {
                return core::future::pending().await;
            }
            let mut n = buf.len().min(self.out.len());
            if self.read_chunk > 0 {
                n = n.min(self.read_chunk);
            }
            for (dst, src) in buf.iter_mut().zip(self.out.drain(..n)) {
                *dst = src;
            }
            Ok(n)
        }
    }
}
