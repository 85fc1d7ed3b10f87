//! Upstream devices
//!
//! A device is something that can be (re)opened into a byte stream of
//! newline-terminated lines. The serial port is the usual upstream; a TCP
//! endpoint works the same way for serial servers and test generators.

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;

use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio_serial::SerialPortBuilderExt;

use crate::error::{Error, Result};

/// Prefix selecting a TCP upstream in a device string
pub const TCP_SCHEME: &str = "tcp://";

/// A byte-stream device that can be opened repeatedly
pub trait LineDevice: Send + Sync + 'static {
    /// Readable handle returned by a successful open
    type Reader: AsyncRead + Unpin + Send + 'static;

    /// Open the device
    fn open(&self) -> impl Future<Output = io::Result<Self::Reader>> + Send;

    /// Human-readable name for logs and the welcome line
    fn describe(&self) -> String;
}

/// Serial port opened through `tokio-serial`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialDevice {
    /// Port name, e.g. `COM1` or `/dev/ttyUSB0`
    pub path: String,
    /// Line speed
    pub baud_rate: u32,
}

impl SerialDevice {
    /// Describe a port; nothing is opened until [`LineDevice::open`]
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
        }
    }
}

impl LineDevice for SerialDevice {
    type Reader = tokio_serial::SerialStream;

    async fn open(&self) -> io::Result<Self::Reader> {
        tokio_serial::new(&self.path, self.baud_rate)
            .open_native_async()
            .map_err(io::Error::from)
    }

    fn describe(&self) -> String {
        self.path.clone()
    }
}

/// Upstream reached over TCP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpDevice {
    /// `host:port`
    pub addr: String,
}

impl TcpDevice {
    /// Describe an endpoint given as `host:port`; connecting is deferred
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl LineDevice for TcpDevice {
    type Reader = TcpStream;

    async fn open(&self) -> io::Result<Self::Reader> {
        TcpStream::connect(self.addr.as_str()).await
    }

    fn describe(&self) -> String {
        format!("{}{}", TCP_SCHEME, self.addr)
    }
}

/// Which upstream the bridge reads from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamConfig {
    /// Local serial port
    Serial {
        /// Port name
        path: String,
        /// Line speed
        baud_rate: u32,
    },
    /// TCP endpoint
    Tcp {
        /// `host:port`
        addr: String,
    },
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        UpstreamConfig::Serial {
            path: "COM1".to_string(),
            baud_rate: 9600,
        }
    }
}

impl UpstreamConfig {
    /// Parse a device string
    ///
    /// `tcp://host:port` selects a TCP upstream; anything else is taken as
    /// a serial port name opened at `baud_rate`.
    pub fn parse(device: &str, baud_rate: u32) -> Result<Self> {
        let device = device.trim();
        if device.is_empty() {
            return Err(Error::Config("device name is empty".to_string()));
        }

        match device.strip_prefix(TCP_SCHEME) {
            Some(addr) => {
                let valid = addr
                    .rsplit_once(':')
                    .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
                    .unwrap_or(false);
                if !valid {
                    return Err(Error::Config(format!(
                        "invalid TCP upstream address: {}",
                        addr
                    )));
                }
                Ok(UpstreamConfig::Tcp {
                    addr: addr.to_string(),
                })
            }
            None => {
                if baud_rate == 0 {
                    return Err(Error::Config("baud rate must be positive".to_string()));
                }
                Ok(UpstreamConfig::Serial {
                    path: device.to_string(),
                    baud_rate,
                })
            }
        }
    }

    /// Build the device this configuration describes
    pub fn device(&self) -> UpstreamDevice {
        match self {
            UpstreamConfig::Serial { path, baud_rate } => {
                UpstreamDevice::Serial(SerialDevice::new(path.clone(), *baud_rate))
            }
            UpstreamConfig::Tcp { addr } => UpstreamDevice::Tcp(TcpDevice::new(addr.clone())),
        }
    }
}

impl fmt::Display for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamConfig::Serial { path, .. } => write!(f, "{}", path),
            UpstreamConfig::Tcp { addr } => write!(f, "{}{}", TCP_SCHEME, addr),
        }
    }
}

/// Either kind of upstream, chosen at runtime
#[derive(Debug, Clone)]
pub enum UpstreamDevice {
    /// Local serial port
    Serial(SerialDevice),
    /// TCP endpoint, see [`TCP_SCHEME`]
    Tcp(TcpDevice),
}

impl LineDevice for UpstreamDevice {
    type Reader = Pin<Box<dyn AsyncRead + Send>>;

    async fn open(&self) -> io::Result<Self::Reader> {
        let reader: Self::Reader = match self {
            UpstreamDevice::Serial(device) => Box::pin(device.open().await?),
            UpstreamDevice::Tcp(device) => Box::pin(device.open().await?),
        };
        Ok(reader)
    }

    fn describe(&self) -> String {
        match self {
            UpstreamDevice::Serial(device) => device.describe(),
            UpstreamDevice::Tcp(device) => device.describe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn test_parse_serial() {
        let config = UpstreamConfig::parse("COM3", 115_200).unwrap();

        assert_eq!(
            config,
            UpstreamConfig::Serial {
                path: "COM3".to_string(),
                baud_rate: 115_200
            }
        );
        assert_eq!(config.to_string(), "COM3");
    }

    #[test]
    fn test_parse_tcp() {
        let config = UpstreamConfig::parse("tcp://127.0.0.1:7000", 9600).unwrap();

        assert_eq!(
            config,
            UpstreamConfig::Tcp {
                addr: "127.0.0.1:7000".to_string()
            }
        );
        assert_eq!(config.to_string(), "tcp://127.0.0.1:7000");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(UpstreamConfig::parse("", 9600).is_err());
        assert!(UpstreamConfig::parse("COM1", 0).is_err());
        assert!(UpstreamConfig::parse("tcp://nohost", 9600).is_err());
        assert!(UpstreamConfig::parse("tcp://host:notaport", 9600).is_err());
    }

    #[test]
    fn test_describe() {
        let serial = UpstreamConfig::parse("/dev/ttyUSB0", 9600).unwrap();
        let tcp = UpstreamConfig::parse("tcp://localhost:1", 9600).unwrap();

        assert_eq!(serial.device().describe(), "/dev/ttyUSB0");
        assert_eq!(tcp.device().describe(), "tcp://localhost:1");
    }

    #[tokio::test]
    async fn test_tcp_device_opens_and_reads() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"hello\n").await.unwrap();
        });

        let device = UpstreamDevice::Tcp(TcpDevice::new(addr.to_string()));
        let mut reader = device.open().await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();

        assert_eq!(buf, b"hello\n");
    }
}
