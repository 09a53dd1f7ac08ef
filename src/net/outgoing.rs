use crate::net::packet::PacketWriter;

pub const OPCODE_PONG: u8 = 0x1e;
pub const OPCODE_CANCEL: u8 = 0xbe;

/// Stops everything the player is doing server-side.
pub fn write_cancel() -> Vec<u8> {
    let mut writer = PacketWriter::new();
    writer.write_u8(OPCODE_CANCEL);
    writer.into_vec()
}

pub fn write_pong() -> Vec<u8> {
    let mut writer = PacketWriter::new();
    writer.write_u8(OPCODE_PONG);
    writer.into_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acknowledgements_are_bare_opcodes() {
        assert_eq!(write_cancel(), vec![0xbe]);
        assert_eq!(write_pong(), vec![0x1e]);
    }
}
