//! Serial port substrate. Uses `tokio-serial`'s native async port rather than
//! the legacy 10 ms polling loop the original source used (§5 directs native
//! async primitives for this substrate).

use crate::error::{TransportError, TransportResult};
use crate::executor::Executor;
use crate::transport::io_transport::IoTransport;
use crate::transport::Transport;
use async_trait::async_trait;
use tokio_serial::{DataBits, FlowControl as SerialFlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};

/// Serial port configuration, mirroring the transport-string `Serial*` parameters.
#[derive(Clone, Debug)]
pub struct SerialOptions {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: SerialFlowControl,
}

impl Default for SerialOptions {
    fn default() -> Self {
        SerialOptions {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: SerialFlowControl::None,
        }
    }
}

/// A serial port transport. Always active: a serial line has no listen/accept
/// concept.
pub struct SerialTransport {
    device: String,
    options: SerialOptions,
    io: Option<IoTransport<SerialStream>>,
    executor: Executor,
}

impl SerialTransport {
    pub fn new(device: impl Into<String>, options: SerialOptions, executor: Executor) -> Self {
        SerialTransport {
            device: device.into(),
            options,
            io: None,
            executor,
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&mut self) -> TransportResult<()> {
        if self.io.is_some() {
            return Err(TransportError::AddressInUse);
        }
        let stream = tokio_serial::new(self.device.clone(), self.options.baud_rate)
            .data_bits(self.options.data_bits)
            .parity(self.options.parity)
            .stop_bits(self.options.stop_bits)
            .flow_control(self.options.flow_control)
            .open_native_async()
            .map_err(|e| TransportError::Failed(e.to_string()))?;

        self.io = Some(IoTransport::new(
            stream,
            format!("SERIAL:{}", self.device),
            true,
            self.executor.clone(),
        ));
        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        match self.io.as_mut() {
            Some(io) => io.close().await,
            None => Err(TransportError::ConnectionClosed),
        }
    }

    async fn read(&mut self, buffer: &mut [u8]) -> TransportResult<usize> {
        let io = self.io.as_mut().ok_or(TransportError::ConnectionClosed)?;
        io.read(buffer).await
    }

    async fn write(&mut self, data: &[u8]) -> TransportResult<usize> {
        let io = self.io.as_mut().ok_or(TransportError::ConnectionClosed)?;
        io.write(data).await
    }

    fn name(&self) -> String {
        format!("SERIAL:{}", self.device)
    }

    fn message_oriented(&self) -> bool {
        false
    }

    fn active(&self) -> bool {
        true
    }

    fn connected(&self) -> bool {
        self.io.as_ref().map(|io| io.connected()).unwrap_or(false)
    }

    fn executor(&self) -> Executor {
        self.executor.clone()
    }
}
