//! Named pipe substrate. The original source's `PipeTransport` is a thin
//! wrapper over a single Win32 `HANDLE`; on Unix there is no bidirectional
//! named-pipe primitive, so the role is filled by a pair of FIFOs at
//! `<path>.c2s` / `<path>.s2c`, opened in the complementary direction by each
//! side. Always active, per the original: a named pipe has no listen/accept
//! concept of its own, only a server/client role fixed at construction.

use crate::error::{TransportError, TransportResult};
use crate::executor::Executor;
use crate::transport::Transport;
use async_trait::async_trait;

#[cfg(windows)]
mod platform {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeServer, ServerOptions};

    pub enum PipeIo {
        Server(NamedPipeServer),
        Client(tokio::net::windows::named_pipe::NamedPipeClient),
    }

    pub async fn connect(name: &str, server: bool) -> TransportResult<PipeIo> {
        if server {
            let pipe = ServerOptions::new()
                .first_pipe_instance(true)
                .create(name)
                .map_err(TransportError::from)?;
            pipe.connect().await.map_err(TransportError::from)?;
            Ok(PipeIo::Server(pipe))
        } else {
            let pipe = ClientOptions::new().open(name).map_err(TransportError::from)?;
            Ok(PipeIo::Client(pipe))
        }
    }

    impl PipeIo {
        pub async fn read(&mut self, buffer: &mut [u8]) -> TransportResult<usize> {
            let n = match self {
                PipeIo::Server(p) => p.read(buffer).await?,
                PipeIo::Client(p) => p.read(buffer).await?,
            };
            Ok(n)
        }

        pub async fn write(&mut self, data: &[u8]) -> TransportResult<usize> {
            match self {
                PipeIo::Server(p) => p.write_all(data).await?,
                PipeIo::Client(p) => p.write_all(data).await?,
            }
            Ok(data.len())
        }
    }
}

#[cfg(unix)]
mod platform {
    use super::*;
    use nix::sys::stat::Mode;
    use nix::unistd::mkfifo;
    use std::path::Path;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::unix::pipe;

    pub struct PipeIo {
        rx: pipe::Receiver,
        tx: pipe::Sender,
    }

    fn ensure_fifo(path: &str) -> TransportResult<()> {
        if !Path::new(path).exists() {
            mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(|e| {
                TransportError::Failed(format!("mkfifo {path}: {e}"))
            })?;
        }
        Ok(())
    }

    pub async fn connect(name: &str, server: bool) -> TransportResult<PipeIo> {
        let c2s = format!("{name}.c2s");
        let s2c = format!("{name}.s2c");
        ensure_fifo(&c2s)?;
        ensure_fifo(&s2c)?;

        let (read_path, write_path) = if server { (&c2s, &s2c) } else { (&s2c, &c2s) };

        let rx = pipe::OpenOptions::new()
            .open_receiver(read_path)
            .map_err(TransportError::from)?;
        let tx = pipe::OpenOptions::new()
            .open_sender(write_path)
            .map_err(TransportError::from)?;
        Ok(PipeIo { rx, tx })
    }

    impl PipeIo {
        pub async fn read(&mut self, buffer: &mut [u8]) -> TransportResult<usize> {
            Ok(self.rx.read(buffer).await?)
        }

        pub async fn write(&mut self, data: &[u8]) -> TransportResult<usize> {
            self.tx.write_all(data).await?;
            Ok(data.len())
        }
    }
}

use platform::PipeIo;

pub struct PipeTransport {
    name: String,
    server: bool,
    io: Option<PipeIo>,
    connected: bool,
    executor: Executor,
}

impl PipeTransport {
    pub fn new(name: impl Into<String>, server: bool, executor: Executor) -> Self {
        PipeTransport {
            name: name.into(),
            server,
            io: None,
            connected: false,
            executor,
        }
    }
}

#[async_trait]
impl Transport for PipeTransport {
    async fn open(&mut self) -> TransportResult<()> {
        if self.io.is_some() {
            return Err(TransportError::AddressInUse);
        }
        self.io = Some(platform::connect(&self.name, self.server).await?);
        self.connected = true;
        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        if self.io.take().is_none() {
            return Err(TransportError::ConnectionClosed);
        }
        self.connected = false;
        Ok(())
    }

    async fn read(&mut self, buffer: &mut [u8]) -> TransportResult<usize> {
        let io = self.io.as_mut().ok_or(TransportError::ConnectionClosed)?;
        let n = io.read(buffer).await?;
        if n == 0 {
            self.connected = false;
        }
        Ok(n)
    }

    async fn write(&mut self, data: &[u8]) -> TransportResult<usize> {
        let io = self.io.as_mut().ok_or(TransportError::ConnectionClosed)?;
        io.write(data).await
    }

    fn name(&self) -> String {
        format!("PIPE:{}", self.name)
    }

    fn message_oriented(&self) -> bool {
        false
    }

    fn active(&self) -> bool {
        true
    }

    fn connected(&self) -> bool {
        self.connected
    }

    fn executor(&self) -> Executor {
        self.executor.clone()
    }
}
