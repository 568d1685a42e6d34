//! Ashfall Simulation Demo
//!
//! Runs a two-peer lockstep match over the in-process loopback transport:
//! both peers expand the same blueprint, exchange commands and checksums,
//! and the log shows their digests agreeing at every interval.

use std::time::Instant;

use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ashfall::game::config::MatchOptions;
use ashfall::net::transport::LoopbackTransport;
use ashfall::{Blueprint, CommandKind, FixedVec2, Game, GamePhase, PlayerId, VERSION};

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Ashfall Sim v{}", VERSION);
    demo_match()
}

/// Two peers, one machine: the full lockstep path end to end.
fn demo_match() -> Result<()> {
    let blueprint = Blueprint::flat_test_map("demo-basin", 128, 128);

    let options_a = MatchOptions {
        is_multiplayer: true,
        player_id: PlayerId(0),
        ..MatchOptions::default()
    };
    let options_b = MatchOptions {
        is_multiplayer: true,
        player_id: PlayerId(1),
        ..MatchOptions::default()
    };

    let mut peer_a = Game::new(&blueprint, options_a)?;
    let mut peer_b = Game::new(&blueprint, options_b)?;

    let (transport_a, transport_b) = LoopbackTransport::pair(PlayerId(0), PlayerId(1));
    peer_a.attach_transport(Box::new(transport_a));
    peer_b.attach_transport(Box::new(transport_b));

    peer_a.start()?;
    peer_b.start()?;

    info!(
        entities = peer_a.world().allocated_entities(),
        "blueprint expanded on both peers"
    );

    // Peer A orders a worker across the map on tick 10; the command rides
    // the lockstep delay and executes on both peers at the same tick.
    let worker = peer_a.world().entities_with(ashfall::world::tag::UNIT)[0];

    let started = Instant::now();
    for tick in 1..=200u32 {
        peer_a.pump_network();
        peer_b.pump_network();

        if tick == 10 {
            peer_a.issue_command(CommandKind::Move {
                units: vec![worker],
                target: FixedVec2::from_cell(60, 60),
            });
        }

        peer_a.step();
        peer_b.step();

        if tick % 50 == 0 {
            let a = peer_a.world().checksum_history.latest();
            let b = peer_b.world().checksum_history.latest();
            info!(tick, peer_a = ?a, peer_b = ?b, "digest check");
        }

        if peer_a.phase() == GamePhase::Ended || peer_b.phase() == GamePhase::Ended {
            break;
        }
    }
    // Flush the last in-flight digests.
    peer_a.pump_network();
    peer_b.pump_network();

    let a = peer_a.world().checksum_history.latest();
    let b = peer_b.world().checksum_history.latest();
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        agreed_tick = ?peer_a.world().checksum_history.latest().map(|(t, _)| t),
        "demo finished"
    );

    match (a, b) {
        (Some((ta, ca)), Some((tb, cb))) if ta == tb && ca == cb => {
            info!(tick = ta, checksum = format_args!("{:08x}", ca), "peers in sync");
        }
        _ => {
            anyhow::bail!("peers disagree: {:?} vs {:?}", a, b);
        }
    }

    if let Some(report) = peer_a.last_desync() {
        anyhow::bail!("unexpected desync: {:?}", report);
    }

    let unit_a = peer_a.world().position_of(worker);
    let unit_b = peer_b.world().position_of(worker);
    info!(?unit_a, ?unit_b, "worker position on both peers");
    assert_eq!(unit_a, unit_b, "positions must be bit-identical");

    Ok(())
}
