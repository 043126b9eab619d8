use std::thread;

use clap::Parser;
use log::info;

use seamflux::driver::ExchangeDriver;
use seamflux::edge_field::{Component, EdgeField};
use seamflux::exchange::FluxExchange;
use seamflux::mesh::{BlockSet, ExchangeConfig, MeshIndices, Neighbor, NeighborSet};
use seamflux::message::channel::channel_network;

/// Runs one flux-correction phase between a fine block on rank 0 and its
/// coarser x1-face neighbor on rank 1, with the two ranks living on
/// threads wired by the channel transport. The corrected coarse fields
/// are written to `corrected_flux.cbor`.
#[derive(Debug, Parser)]
#[clap(version = "0.1.0")]
struct Opts {
    #[clap(short = 'n', long, default_value = "8")]
    block_size: usize,

    #[clap(short = 'g', long, default_value = "2")]
    num_guard: usize,
}

fn main() {
    simple_logger::SimpleLogger::new().init().unwrap();

    let opts = Opts::parse();
    println!("{:?}", opts);

    let ix = MeshIndices::new(opts.block_size, opts.block_size, 1, opts.num_guard);

    let mut network = channel_network(2);
    let coarse_transport = network.pop().unwrap();
    let fine_transport = network.pop().unwrap();

    let fine_ix = ix.clone();
    let fine_rank = thread::spawn(move || {
        let mut neighbors: NeighborSet = [None; 48];
        neighbors[4] = Some(Neighbor { gid: 1, rank: 1, level: 0, dest: 0 });
        let mut blocks = BlockSet::new();
        blocks.push(0, 1, neighbors);
        let config = ExchangeConfig {
            rank: 0,
            first_gids: vec![0, 1],
            indices: fine_ix.clone(),
        };

        // an x2-edge flux profile on the upper x1 interface
        let interface = fine_ix.ie + 1;
        let mut fields = vec![EdgeField::from_function(&fine_ix, |c, _, j, i| {
            if c == Component::E2 && i == interface { j as f64 } else { 0.0 }
        })];

        let mut exchange = FluxExchange::new(config, blocks, fine_transport);
        let mut driver = ExchangeDriver::new();
        driver.run_phase(&mut exchange, &mut fields).unwrap();
        info!("fine rank closed its phase");
    });

    let coarse_ix = ix;
    let coarse_rank = thread::spawn(move || {
        let mut neighbors: NeighborSet = [None; 48];
        neighbors[0] = Some(Neighbor { gid: 0, rank: 0, level: 1, dest: 4 });
        let mut blocks = BlockSet::new();
        blocks.push(1, 0, neighbors);
        let config = ExchangeConfig {
            rank: 1,
            first_gids: vec![0, 1],
            indices: coarse_ix.clone(),
        };
        let mut fields = vec![EdgeField::zeros(&coarse_ix)];

        let mut exchange = FluxExchange::new(config, blocks, coarse_transport);
        let mut driver = ExchangeDriver::new();
        driver.run_phase(&mut exchange, &mut fields).unwrap();

        for j in coarse_ix.js..=coarse_ix.js + coarse_ix.nx2 / 2 - 1 {
            info!(
                "corrected x2-edge flux at j = {}: {}",
                j,
                fields[0].get(Component::E2, 0, j, coarse_ix.is)
            );
        }
        fields
    });

    fine_rank.join().unwrap();
    let fields = coarse_rank.join().unwrap();

    let file = std::fs::File::create("corrected_flux.cbor").unwrap();
    let mut buffer = std::io::BufWriter::new(file);
    ciborium::ser::into_writer(&fields, &mut buffer).unwrap();
}
