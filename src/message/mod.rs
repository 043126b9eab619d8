//! This module exports the minimal transport API the flux exchange is
//! built on, encapsulated by a `Transport` trait. Implementors only need
//! non-blocking `send`/`try_recv` and a blocking `recv` for a given wire
//! (an in-process channel network and a pure-Rust TCP implementation are
//! included), plus the deterministic tag scheme that keys messages to the
//! (receiving block, buffer slot) pair expecting them.

mod backoff;
pub mod channel;
pub mod tcp;
pub mod transport;
