//! Per-phase sequencing of the exchange: post receives, pack, send, poll
//! until drained, then close the phase so the buffers can be reused. The
//! driver advances one edge at a time and never blocks while draining, so
//! a caller can interleave other work between polls; any hard transport
//! error is returned without advancing the state, and the failed edge runs
//! again if the caller retries.

use log::debug;

use crate::edge_field::EdgeField;
use crate::error::Error;
use crate::exchange::{FluxExchange, Poll};
use crate::message::transport::Transport;

/// The stations of one communication phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ReceivesPosted,
    Packing,
    Sent,
    Draining,
}

/// Drives a `FluxExchange` through one phase per round trip back to
/// `Idle`. Construct once and reuse across simulation steps.
pub struct ExchangeDriver {
    phase: Phase,
}

impl Default for ExchangeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeDriver {
    pub fn new() -> Self {
        Self { phase: Phase::Idle }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Take the next edge of the state machine. The `Sent` state re-polls
    /// and only moves on once every expected transfer has landed and been
    /// unpacked; all other edges advance unconditionally on success.
    pub fn advance<T: Transport>(
        &mut self,
        exchange: &mut FluxExchange<T>,
        fields: &mut [EdgeField],
    ) -> Result<Phase, Error> {
        let next = match self.phase {
            Phase::Idle => {
                exchange.post_receives();
                Phase::ReceivesPosted
            }
            Phase::ReceivesPosted => {
                exchange.pack_fluxes(fields);
                Phase::Packing
            }
            Phase::Packing => {
                exchange.send_fluxes()?;
                Phase::Sent
            }
            Phase::Sent => match exchange.recv_and_unpack(fields)? {
                Poll::Complete => Phase::Draining,
                Poll::Pending => Phase::Sent,
            },
            Phase::Draining => {
                exchange.clear_send()?;
                exchange.clear_recv()?;
                Phase::Idle
            }
        };
        if next != self.phase {
            debug!("phase {:?} -> {:?}", self.phase, next);
        }
        self.phase = next;
        Ok(next)
    }

    /// Run one complete phase, yielding the thread between unproductive
    /// polls. Returns once the exchange is back at `Idle` with all buffers
    /// reusable.
    pub fn run_phase<T: Transport>(
        &mut self,
        exchange: &mut FluxExchange<T>,
        fields: &mut [EdgeField],
    ) -> Result<(), Error> {
        loop {
            let before = self.phase;
            let after = self.advance(exchange, fields)?;
            if after == Phase::Idle {
                return Ok(());
            }
            if before == after {
                std::thread::yield_now();
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::edge_field::{Component, EdgeField};
    use crate::exchange::FluxExchange;
    use crate::mesh::{BlockSet, ExchangeConfig, MeshIndices, Neighbor, NeighborSet};
    use crate::message::channel::channel_network;
    use super::{ExchangeDriver, Phase};

    #[test]
    fn a_local_phase_visits_every_station_and_returns_to_idle() {
        let ix = MeshIndices::new(4, 4, 1, 2);
        let mut fine: NeighborSet = [None; 48];
        fine[4] = Some(Neighbor { gid: 1, rank: 0, level: 0, dest: 0 });
        let mut coarse: NeighborSet = [None; 48];
        coarse[0] = Some(Neighbor { gid: 0, rank: 0, level: 1, dest: 4 });
        let mut blocks = BlockSet::new();
        blocks.push(0, 1, fine);
        blocks.push(1, 0, coarse);

        let config = ExchangeConfig { rank: 0, first_gids: vec![0], indices: ix.clone() };
        let mut fields = vec![EdgeField::zeros(&ix), EdgeField::zeros(&ix)];
        for (j, v) in (2..=5).zip([1.0, 2.0, 3.0, 4.0]) {
            fields[0].set(Component::E2, 0, j, 6, v);
        }

        let transport = channel_network(1).pop().unwrap();
        let mut exchange = FluxExchange::new(config, blocks, transport);
        let mut driver = ExchangeDriver::new();

        let stations: Vec<_> = (0..5)
            .map(|_| driver.advance(&mut exchange, &mut fields).unwrap())
            .collect();
        assert_eq!(
            stations,
            vec![
                Phase::ReceivesPosted,
                Phase::Packing,
                Phase::Sent,
                Phase::Draining,
                Phase::Idle,
            ]
        );
        assert_eq!(fields[1].get(Component::E2, 0, 2, 2), 1.5);
        assert_eq!(fields[1].get(Component::E2, 0, 3, 2), 3.5);
    }

    #[test]
    fn run_phase_closes_a_phase_with_no_work() {
        let ix = MeshIndices::new(4, 1, 1, 2);
        let mut blocks = BlockSet::new();
        blocks.push(0, 0, [None; 48]);
        let config = ExchangeConfig { rank: 0, first_gids: vec![0], indices: ix.clone() };
        let mut fields = vec![EdgeField::zeros(&ix)];

        let transport = channel_network(1).pop().unwrap();
        let mut exchange = FluxExchange::new(config, blocks, transport);
        let mut driver = ExchangeDriver::new();

        driver.run_phase(&mut exchange, &mut fields).unwrap();
        assert_eq!(driver.phase(), Phase::Idle);

        // the driver is reusable for the next simulation step
        driver.run_phase(&mut exchange, &mut fields).unwrap();
        assert_eq!(driver.phase(), Phase::Idle);
    }
}
