//! Serial console driver for router maintenance.
//!
//! Commands are fire-and-forget: each one is written with a CRLF terminator,
//! the driver waits a fixed settle time, then drains whatever the console has
//! buffered. Nothing here raises; a port that cannot be opened or written to
//! shows up in the returned transcript and the log, and the batch goes on.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// An open serial connection.
pub trait SerialLink: Read + Write + Send {
    /// Number of bytes waiting to be read.
    fn bytes_available(&mut self) -> io::Result<usize>;
}

/// Opens serial connections.
pub trait SerialOpener: Send + Sync {
    fn open(&self, port: &str, baud_rate: u32) -> io::Result<Box<dyn SerialLink>>;
}

/// System serial ports through the `serialport` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSerial;

struct PortLink(Box<dyn serialport::SerialPort>);

impl Read for PortLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for PortLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl SerialLink for PortLink {
    fn bytes_available(&mut self) -> io::Result<usize> {
        self.0
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(io::Error::from)
    }
}

impl SerialOpener for SystemSerial {
    fn open(&self, port: &str, baud_rate: u32) -> io::Result<Box<dyn SerialLink>> {
        let port = serialport::new(port, baud_rate)
            .timeout(Duration::from_millis(500))
            .open()
            .map_err(io::Error::from)?;
        Ok(Box::new(PortLink(port)))
    }
}

/// Sends scripted command sequences to a serial console.
#[derive(Clone)]
pub struct SerialConsoleDriver {
    opener: Arc<dyn SerialOpener>,
    settle: Duration,
}

impl SerialConsoleDriver {
    /// Create a driver waiting `settle` after every command.
    pub fn new(opener: Arc<dyn SerialOpener>, settle: Duration) -> Self {
        Self { opener, settle }
    }

    /// Driver on the system serial ports.
    #[must_use]
    pub fn system(settle: Duration) -> Self {
        Self::new(Arc::new(SystemSerial), settle)
    }

    /// Send `commands` in order and return the collected transcript.
    ///
    /// Blocks for at least `settle * commands.len()`.
    pub fn send(&self, port: &str, baud_rate: u32, commands: &[String]) -> String {
        let mut link = match self.opener.open(port, baud_rate) {
            Ok(link) => link,
            Err(e) => {
                warn!("serial port {} unavailable: {}", port, e);
                return format!("Serial port {port} unavailable: {e}\n");
            }
        };

        let mut transcript = String::new();
        for cmd in commands {
            transcript.push_str(&format!("Serial request: {cmd}\tSerial response: "));
            let written = link
                .write_all(format!("{cmd}\r\n").as_bytes())
                .and_then(|()| link.flush());
            if let Err(e) = written {
                warn!("write to {} failed: {}", port, e);
                transcript.push_str(&format!("<write failed: {e}>\n"));
                continue;
            }

            std::thread::sleep(self.settle);
            let response = drain(link.as_mut());
            debug!("Serial request: {}\tSerial response: {}", cmd, response);
            transcript.push_str(&response);
            transcript.push('\n');
        }
        transcript
    }

    /// [`send`](Self::send) on the blocking pool.
    pub async fn send_async(&self, port: &str, baud_rate: u32, commands: Vec<String>) -> String {
        let driver = self.clone();
        let port = port.to_string();
        tokio::task::spawn_blocking(move || driver.send(&port, baud_rate, &commands))
            .await
            .unwrap_or_else(|e| format!("serial task failed: {e}\n"))
    }
}

fn drain(link: &mut dyn SerialLink) -> String {
    let mut bytes = Vec::new();
    loop {
        let available = match link.bytes_available() {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let mut buf = vec![0u8; available];
        match link.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => bytes.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
