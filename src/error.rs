use std::error;
use std::fmt;
use std::io;

#[derive(Debug)]

/**
 * Error to represent a failed boundary-exchange phase. Any transport-level
 * failure is a hard failure for the whole phase; the exchange never retries
 * internally.
 */
pub enum Error {
    PeerUnreachable(usize),
    TransportClosed,
    MalformedMessage(String),
    Bind(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        use Error::*;

        match self {
            PeerUnreachable(rank) => writeln!(fmt, "cannot deliver to rank {}", rank),
            TransportClosed => writeln!(fmt, "transport closed while receives were outstanding"),
            MalformedMessage(what) => writeln!(fmt, "malformed message: {}", what),
            Bind(e) => writeln!(fmt, "could not bind listener: {}", e),
        }
    }
}

impl error::Error for Error {}
