use crate::error::ProtocolError;
use crate::world::position::Position;

#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn ensure(&self, needed: usize) -> Result<(), ProtocolError> {
        if self.remaining() < needed {
            return Err(ProtocolError::TruncatedMessage {
                offset: self.pos,
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        self.ensure(1)?;
        let value = self.data[self.pos];
        self.pos += 1;
        Ok(value)
    }

    pub fn read_u16_le(&mut self) -> Result<u16, ProtocolError> {
        self.ensure(2)?;
        let lo = self.data[self.pos] as u16;
        let hi = self.data[self.pos + 1] as u16;
        self.pos += 2;
        Ok(lo | (hi << 8))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, ProtocolError> {
        self.ensure(4)?;
        let b0 = self.data[self.pos] as u32;
        let b1 = self.data[self.pos + 1] as u32;
        let b2 = self.data[self.pos + 2] as u32;
        let b3 = self.data[self.pos + 3] as u32;
        self.pos += 4;
        Ok(b0 | (b1 << 8) | (b2 << 16) | (b3 << 24))
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads a u16 length followed by that many bytes, decoded lossily.
    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        self.ensure(2)?;
        let start = self.pos;
        let len = self.read_u16_le()? as usize;
        if self.remaining() < len {
            let remaining = self.remaining();
            self.pos = start;
            return Err(ProtocolError::TruncatedMessage {
                offset: start,
                needed: len + 2,
                remaining: remaining + 2,
            });
        }
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        self.ensure(len)?;
        let start = self.pos;
        self.pos += len;
        Ok(&self.data[start..start + len])
    }

    pub fn skip(&mut self, len: usize) -> Result<(), ProtocolError> {
        self.ensure(len)?;
        self.pos += len;
        Ok(())
    }

    pub fn read_position(&mut self) -> Result<Position, ProtocolError> {
        self.ensure(5)?;
        let x = self.read_u16_le()?;
        self.read_position_with_x(x)
    }

    /// Second half of a position whose x was already consumed, used where
    /// an x of 0xffff announces a creature id instead.
    pub fn read_position_with_x(&mut self, x: u16) -> Result<Position, ProtocolError> {
        self.ensure(3)?;
        let y = self.read_u16_le()?;
        let z = self.read_u8()?;
        Ok(Position { x, y, z })
    }
}

#[derive(Debug, Default, Clone)]
pub struct PacketWriter {
    data: Vec<u8>,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.data.push(u8::from(value));
    }

    pub fn write_u16_le(&mut self, value: u16) {
        self.data.push((value & 0xff) as u8);
        self.data.push((value >> 8) as u8);
    }

    pub fn write_u32_le(&mut self, value: u32) {
        self.data.push((value & 0xff) as u8);
        self.data.push(((value >> 8) & 0xff) as u8);
        self.data.push(((value >> 16) & 0xff) as u8);
        self.data.push(((value >> 24) & 0xff) as u8);
    }

    pub fn write_string_str(&mut self, value: &str) {
        let bytes = value.as_bytes();
        let len = bytes.len().min(u16::MAX as usize);
        self.write_u16_le(len as u16);
        self.write_bytes(&bytes[..len]);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn write_position(&mut self, position: Position) {
        self.write_u16_le(position.x);
        self.write_u16_le(position.y);
        self.write_u8(position.z);
    }
}
