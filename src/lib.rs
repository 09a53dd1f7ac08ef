pub mod config;
pub mod entities;
pub mod error;
pub mod net;
pub mod telemetry;
pub mod world;

pub use error::ProtocolError;
pub use net::features::{FeatureGate, GameFeature};
pub use net::game::{decode_message, decode_packet, DecodeOutcome, GameEvent};
pub use net::packet::{PacketReader, PacketWriter};
pub use world::appearance::{AppearanceCatalog, AppearanceIndex, AppearanceType};
pub use world::state::GameState;

use config::{AppConfig, ClientOptions};
use telemetry::logging::LogConfig;
use tracing::{info, warn};

/// Totals of one capture replay.
#[derive(Debug, Default)]
pub struct ReplayReport {
    pub packets: usize,
    pub messages: usize,
    pub events: usize,
    pub acknowledgements: usize,
    /// Packet index and error that stopped the replay.
    pub failure: Option<(usize, ProtocolError)>,
}

/// Feeds a capture of `u16 LE length + packet` records through the decoder.
/// Stops at the first error; the stream is desynchronised past it.
pub fn replay(
    state: &mut GameState,
    gate: &FeatureGate,
    catalog: &dyn AppearanceCatalog,
    capture: &[u8],
) -> ReplayReport {
    let mut report = ReplayReport::default();
    let mut frames = PacketReader::new(capture);
    while !frames.is_empty() {
        let packet = match frames
            .read_u16_le()
            .and_then(|len| frames.read_bytes(usize::from(len)))
        {
            Ok(packet) => packet,
            Err(err) => {
                warn!(packet = report.packets, "capture ends inside a record");
                report.failure = Some((report.packets, err));
                break;
            }
        };
        match decode_packet(state, gate, catalog, packet) {
            Ok(outcomes) => {
                report.messages += outcomes.len();
                for outcome in &outcomes {
                    report.events += outcome.events.len();
                    report.acknowledgements += outcome.outgoing.len();
                }
            }
            Err(err) => {
                report.failure = Some((report.packets, err));
                break;
            }
        }
        state.refresh_opponents();
        report.packets += 1;
    }
    report
}

pub fn run(args: &[String]) -> Result<(), String> {
    let config = AppConfig::from_args(args)?;
    let mut options = match &config.options_path {
        Some(path) => ClientOptions::load(path)?,
        None => ClientOptions::default(),
    };
    options.apply_overrides(&config);
    telemetry::logging::init(&LogConfig {
        level: options.log_level.clone(),
    })?;

    let catalog = match &config.appearances_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .map_err(|err| format!("read {} failed: {}", path.display(), err))?;
            AppearanceIndex::from_yaml_str(&content)?
        }
        None => AppearanceIndex::default(),
    };
    let gate = options.feature_gate();
    let capture = std::fs::read(&config.capture)
        .map_err(|err| format!("read {} failed: {}", config.capture.display(), err))?;
    info!(
        client = gate.client_version(),
        build = gate.build_version(),
        appearances = catalog.len(),
        bytes = capture.len(),
        "replaying capture"
    );

    let mut state = GameState::new(options.creature_capacity, options.minimap_sectors);
    state
        .creatures
        .set_opponent_options(options.opponent_filter, options.opponent_sort);
    let report = replay(&mut state, &gate, &catalog, &capture);

    println!("tibia-client: replay {}", config.capture.display());
    println!("- protocol: {} build {}", gate.client_version(), gate.build_version());
    println!(
        "- packets: {}, messages: {}, events: {}, acknowledgements: {}",
        report.packets, report.messages, report.events, report.acknowledgements
    );
    println!(
        "- map: valid={}, position={}",
        state.map.valid(),
        state.map.position()
    );
    println!(
        "- creatures: {}, opponents: {}, player: {}",
        state.creatures.len(),
        state.creatures.opponents().len(),
        state.creatures.player_id()
    );
    println!("- containers: {}", state.containers.len());
    println!(
        "- buddies: {} ({} online)",
        state.buddies.len(),
        state.buddies.online_count()
    );
    let stats = state.minimap.stats();
    println!(
        "- minimap sectors: {}, hit rate {:.2}, evictions {}",
        state.minimap.sector_count(),
        stats.hit_rate(),
        stats.evictions
    );

    match report.failure {
        Some((packet, err)) => Err(format!("tibia-client: replay stopped at packet {packet}: {err}")),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::game::{OPCODE_BUDDY_ADD, OPCODE_PING};

    fn frame(writer: &mut PacketWriter, packet: &[u8]) {
        writer.write_u16_le(packet.len() as u16);
        writer.write_bytes(packet);
    }

    #[test]
    fn replay_counts_packets_and_acknowledgements() {
        let mut buddy = PacketWriter::new();
        buddy.write_u8(OPCODE_BUDDY_ADD);
        buddy.write_u32_le(42);
        buddy.write_string_str("Eremo");
        buddy.write_u8(1);

        let mut capture = PacketWriter::new();
        frame(&mut capture, &[OPCODE_PING, OPCODE_PING]);
        frame(&mut capture, buddy.as_slice());

        let mut state = GameState::default();
        let report = replay(
            &mut state,
            &FeatureGate::default(),
            &AppearanceIndex::default(),
            capture.as_slice(),
        );
        assert!(report.failure.is_none());
        assert_eq!(report.packets, 2);
        assert_eq!(report.messages, 3);
        assert_eq!(report.acknowledgements, 2);
        assert_eq!(state.buddies.online_count(), 1);
    }

    #[test]
    fn replay_stops_at_first_bad_packet() {
        let mut capture = PacketWriter::new();
        frame(&mut capture, &[OPCODE_PING]);
        frame(&mut capture, &[0x02]);
        frame(&mut capture, &[OPCODE_PING]);

        let mut state = GameState::default();
        let report = replay(
            &mut state,
            &FeatureGate::default(),
            &AppearanceIndex::default(),
            capture.as_slice(),
        );
        assert_eq!(report.packets, 1);
        assert_eq!(report.failure, Some((1, ProtocolError::UnknownOpcode(0x02))));
    }

    #[test]
    fn truncated_record_is_reported() {
        let mut state = GameState::default();
        let report = replay(
            &mut state,
            &FeatureGate::default(),
            &AppearanceIndex::default(),
            &[5, 0, OPCODE_PING],
        );
        assert!(matches!(
            report.failure,
            Some((0, ProtocolError::TruncatedMessage { .. }))
        ));
    }
}
