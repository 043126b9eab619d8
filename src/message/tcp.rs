use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use log::{error, info, warn};

use super::backoff::ExponentialBackoff;
use super::transport::Transport;
use crate::error::Error;

const RETRY_WAIT: Duration = Duration::from_millis(250);
const RETRY_MAX_WAIT: Duration = Duration::from_millis(5000);
const RETRY_ATTEMPTS: usize = 20;

/// Owns the background threads that move frames on and off the wire: a
/// listener accepting peer connections and fanning each one out to a
/// reader thread, and a serial sender that owns the outgoing connection
/// table. The sender thread ends when the paired `TcpTransport` is
/// dropped; the listener runs for the life of the process.
pub struct TcpHost {
    send_thread: Option<thread::JoinHandle<()>>,
}

impl TcpHost {
    /// Bind this rank's listen address and connect the send side lazily.
    /// Returns the host (keep it alive) and the transport to hand to the
    /// exchange.
    pub fn bind(rank: usize, peers: Vec<SocketAddr>) -> Result<(TcpHost, TcpTransport), Error> {
        let listener = TcpListener::bind(peers[rank]).map_err(Error::Bind)?;
        info!("rank {} listening on {}", rank, peers[rank]);

        let (send_sink, send_src) = crossbeam_channel::unbounded::<(usize, Vec<u8>)>();
        let (recv_sink, recv_src) = crossbeam_channel::unbounded::<Vec<u8>>();

        let outgoing = peers.clone();
        let send_thread = thread::spawn(move || Self::run_sender(outgoing, send_src));
        thread::spawn(move || Self::run_listener(listener, recv_sink));

        let transport = TcpTransport {
            rank,
            size: peers.len(),
            send_sink,
            inbox: recv_src,
        };
        Ok((TcpHost { send_thread: Some(send_thread) }, transport))
    }

    /// Wait for the send thread to drain. Call after dropping the
    /// transport so queued frames still go out.
    pub fn join(&mut self) {
        if let Some(thread) = self.send_thread.take() {
            thread.join().unwrap()
        }
    }

    fn run_sender(peers: Vec<SocketAddr>, source: Receiver<(usize, Vec<u8>)>) {
        let mut table: HashMap<usize, TcpStream> = HashMap::new();

        for (rank, frame) in source {
            loop {
                if !table.contains_key(&rank) {
                    match connect_with_retry(peers[rank]) {
                        Some(stream) => {
                            table.insert(rank, stream);
                        }
                        None => {
                            error!("giving up on {}; dropping frame", peers[rank]);
                            break;
                        }
                    }
                }
                let stream = table.get_mut(&rank).unwrap();
                match write_frame(stream, &frame) {
                    Ok(()) => break,
                    Err(e) => {
                        error!("send to {} failed ({}); reconnecting", peers[rank], e);
                        table.remove(&rank);
                    }
                }
            }
        }
    }

    fn run_listener(listener: TcpListener, sink: Sender<Vec<u8>>) {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let remote = stream.peer_addr().ok();
                    info!("receiving connection from {:?}", remote);
                    let sink = sink.clone();
                    thread::spawn(move || Self::run_connection(stream, sink));
                }
                Err(e) => error!("accept failed: {}", e),
            }
        }
    }

    fn run_connection(mut stream: TcpStream, sink: Sender<Vec<u8>>) {
        loop {
            match read_frame(&mut stream) {
                Ok(frame) => {
                    if sink.send(frame).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    }
}

fn connect_with_retry(addr: SocketAddr) -> Option<TcpStream> {
    ExponentialBackoff::new(RETRY_WAIT, RETRY_MAX_WAIT)
        .take(RETRY_ATTEMPTS)
        .find_map(|wait| match TcpStream::connect(addr) {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!("connect to {} failed ({}); retrying", addr, e);
                thread::sleep(wait);
                None
            }
        })
}

fn write_frame(stream: &mut TcpStream, frame: &[u8]) -> io::Result<()> {
    stream.write_all(&(frame.len() as u64).to_le_bytes())?;
    stream.write_all(frame)
}

fn read_frame(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut header = [0; 8];
    stream.read_exact(&mut header)?;
    let mut frame = vec![0; u64::from_le_bytes(header) as usize];
    stream.read_exact(&mut frame)?;
    Ok(frame)
}

/// The `Transport` face of a `TcpHost`: sends enqueue frames for the
/// sender thread and receives drain the frames the reader threads have
/// already delivered.
pub struct TcpTransport {
    rank: usize,
    size: usize,
    send_sink: Sender<(usize, Vec<u8>)>,
    inbox: Receiver<Vec<u8>>,
}

impl Transport for TcpTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, rank: usize, message: Vec<u8>) -> Result<(), Error> {
        self.send_sink
            .send((rank, message))
            .map_err(|_| Error::PeerUnreachable(rank))
    }

    fn try_recv(&self) -> Option<Vec<u8>> {
        self.inbox.try_recv().ok()
    }

    fn recv(&self) -> Result<Vec<u8>, Error> {
        self.inbox.recv().map_err(|_| Error::TransportClosed)
    }
}
