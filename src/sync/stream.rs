use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::unix::net::UnixStream;

use crate::opts::Opts;

/// Transport opened by [`Conn::new`](super::Conn::new).
pub enum Stream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Stream {
    /// Open the transport described by `opts`.
    ///
    /// A host starting with `/` names the directory of the server's Unix
    /// domain socket.
    pub fn connect(opts: &Opts) -> std::io::Result<Self> {
        if opts.host.starts_with('/') {
            let path = format!("{}/.s.PGSQL.{}", opts.host, opts.port);
            return UnixStream::connect(path).map(Self::Unix);
        }
        let host = if opts.host.is_empty() {
            "localhost"
        } else {
            opts.host.as_str()
        };
        let stream = TcpStream::connect((host, opts.port))?;
        stream.set_nodelay(true)?;
        Ok(Self::Tcp(stream))
    }

    /// Shut down both directions.
    pub fn shutdown(&self) -> std::io::Result<()> {
        match self {
            Stream::Tcp(s) => s.shutdown(Shutdown::Both),
            Stream::Unix(s) => s.shutdown(Shutdown::Both),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            Stream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            Stream::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            Stream::Unix(s) => s.flush(),
        }
    }
}
