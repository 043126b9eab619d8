use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Interface for a group of processes that can exchange messages over a
/// network. The underlying wire can in principle be TCP, shared-memory
/// channels, or a higher level abstraction like MPI.
///
pub trait Transport {
    /// Must be implemented to return the rank of this process within the
    /// group.
    fn rank(&self) -> usize;

    /// Must be implemented to return the number of peer processes in the
    /// group.
    fn size(&self) -> usize;

    /// Must be implemented to post a message to a peer. This method must
    /// return immediately, in other words it is not allowed to block until
    /// a matching receive happens on the other side.
    fn send(&self, rank: usize, message: Vec<u8>) -> Result<(), Error>;

    /// Must be implemented to receive a message from any peer if one has
    /// already arrived, without blocking.
    fn try_recv(&self) -> Option<Vec<u8>>;

    /// Must be implemented to receive a message from any peer, blocking
    /// until one is ready. Used only to drain a phase at teardown.
    fn recv(&self) -> Result<Vec<u8>, Error>;
}

/// Tag namespace of the flux-correction exchange. Other exchange
/// categories (cell-centered variables, face-centered variables) must use
/// distinct bases so concurrent categories never alias.
pub const FLUX_TAG_BASE: u64 = 1 << 32;

/// Derive the message tag expected by the receiving process: a
/// deterministic, collision-free function of the *receiver's* local block
/// id and the destination buffer slot.
pub fn flux_tag(local_id: usize, slot: usize) -> u64 {
    debug_assert!(slot < 64);
    FLUX_TAG_BASE | ((local_id as u64) << 6) | slot as u64
}

/// One flux-correction payload on the wire: the tag identifying the
/// (block, slot) receive it satisfies, and the packed buffer row.
#[derive(Debug, Serialize, Deserialize)]
pub struct FluxMessage {
    pub tag: u64,
    pub payload: Vec<f64>,
}

impl FluxMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rmp_serde::to_vec(self).map_err(|e| Error::MalformedMessage(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        rmp_serde::from_slice(bytes).map_err(|e| Error::MalformedMessage(e.to_string()))
    }
}
