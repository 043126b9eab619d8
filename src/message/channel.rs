use crossbeam_channel::{Receiver, Sender};

use super::transport::Transport;
use crate::error::Error;

/// A transport for ranks living in one process, wired with unbounded
/// channels. Sends are buffered and complete at post time; receives drain
/// the rank's inbox. This is the transport of choice for single-process
/// runs (where the exchange's fast path does all the real work anyway) and
/// for exercising the remote protocol in tests.
pub struct ChannelTransport {
    rank: usize,
    peers: Vec<Sender<Vec<u8>>>,
    inbox: Receiver<Vec<u8>>,
}

/// Create a fully-connected group of the given size. The transport at
/// index `r` speaks for rank `r`; hand them out to one worker each.
pub fn channel_network(size: usize) -> Vec<ChannelTransport> {
    let (sinks, sources): (Vec<_>, Vec<_>) =
        (0..size).map(|_| crossbeam_channel::unbounded()).unzip();

    sources
        .into_iter()
        .enumerate()
        .map(|(rank, inbox)| ChannelTransport {
            rank,
            peers: sinks.clone(),
            inbox,
        })
        .collect()
}

impl Transport for ChannelTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, rank: usize, message: Vec<u8>) -> Result<(), Error> {
        self.peers[rank]
            .send(message)
            .map_err(|_| Error::PeerUnreachable(rank))
    }

    fn try_recv(&self) -> Option<Vec<u8>> {
        self.inbox.try_recv().ok()
    }

    fn recv(&self) -> Result<Vec<u8>, Error> {
        self.inbox.recv().map_err(|_| Error::TransportClosed)
    }
}

#[cfg(test)]
mod test {
    use std::thread;

    use super::*;

    #[test]
    fn messages_go_around_a_ring() {
        let comms = channel_network(4);
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let dest = (comm.rank() + 1) % comm.size();
                    comm.send(dest, vec![comm.rank() as u8]).unwrap();
                    comm.recv().unwrap()
                })
            })
            .collect();

        for (rank, handle) in handles.into_iter().enumerate() {
            let received = handle.join().unwrap();
            assert_eq!(received, vec![((rank + 3) % 4) as u8]);
        }
    }

    #[test]
    fn try_recv_does_not_block_on_an_empty_inbox() {
        let comms = channel_network(2);
        assert!(comms[0].try_recv().is_none());
        comms[1].send(0, b"ready".to_vec()).unwrap();
        // the channel delivers immediately in-process
        assert_eq!(comms[0].try_recv().unwrap(), b"ready".to_vec());
    }
}
