//! Packet framing and the core packet type set.
//!
//! Framing is `{from: u8, type: u8, length: u16, payload}`, little
//! endian throughout; floats are IEEE-754 32-bit.

use crate::codec::{CodecResult, Reader, Writer};

/// Core packet types. `Pcl*` flow client to server, `Psv*` server to
/// client, `Pkt*` both ways.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    PclHello = 0x01,
    PclHello2 = 0x02,
    PktOk = 0x03,
    PktChat = 0x04,
    PktPlayerInfo = 0x05,
    PktCoords = 0x06,
    PclAckShake = 0x07,
    PclAckPlayerFix = 0x08,
    PktPing = 0x09,
    PktLogin = 0x0a,
    PktCommand2 = 0x0b,
    PclFinaleRequest = 0x0c,
    PclGoodbye = 0x0d,

    PsvHandshake = 0x80,
    PsvSync = 0x81,
    PsvMaterialArchive = 0x82,
    PsvMobjTypeIdList = 0x83,
    PsvMobjStateIdList = 0x84,
    PsvPlayerFix = 0x85,
    PsvPlayerExit = 0x86,
    PsvConsoleText = 0x87,
    PsvServerClose = 0x88,
}

impl PacketType {
    pub fn from_u8(v: u8) -> Option<PacketType> {
        use PacketType::*;
        Some(match v {
            0x01 => PclHello,
            0x02 => PclHello2,
            0x03 => PktOk,
            0x04 => PktChat,
            0x05 => PktPlayerInfo,
            0x06 => PktCoords,
            0x07 => PclAckShake,
            0x08 => PclAckPlayerFix,
            0x09 => PktPing,
            0x0a => PktLogin,
            0x0b => PktCommand2,
            0x0c => PclFinaleRequest,
            0x0d => PclGoodbye,
            0x80 => PsvHandshake,
            0x81 => PsvSync,
            0x82 => PsvMaterialArchive,
            0x83 => PsvMobjTypeIdList,
            0x84 => PsvMobjStateIdList,
            0x85 => PsvPlayerFix,
            0x86 => PsvPlayerExit,
            0x87 => PsvConsoleText,
            0x88 => PsvServerClose,
            _ => return None,
        })
    }
}

/// A framed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Sending console (0 is the server).
    pub from: u8,
    pub ty: PacketType,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(from: u8, ty: PacketType) -> Packet {
        Packet {
            from,
            ty,
            payload: Vec::new(),
        }
    }

    pub fn with_payload(from: u8, ty: PacketType, payload: Vec<u8>) -> Packet {
        Packet { from, ty, payload }
    }

    pub fn reader(&self) -> Reader<'_> {
        Reader::new(&self.payload)
    }

    /// Wire encoding: from, type, u16 length, payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u8(self.from);
        w.write_u8(self.ty as u8);
        w.write_u16(self.payload.len() as u16);
        w.write_bytes(&self.payload);
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> CodecResult<Option<Packet>> {
        let mut r = Reader::new(bytes);
        let from = r.read_u8()?;
        let ty = r.read_u8()?;
        let length = r.read_u16()? as usize;
        let payload = r.read_bytes(length)?.to_vec();
        Ok(PacketType::from_u8(ty).map(|ty| Packet { from, ty, payload }))
    }
}

/// Where an outgoing packet should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendTarget {
    /// One specific console.
    To(u8),
    /// Every connected client.
    Broadcast,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_round_trip() {
        let packet = Packet::with_payload(3, PacketType::PktChat, vec![1, 2, 3, 4]);
        let bytes = packet.encode();
        assert_eq!(bytes[0], 3);
        assert_eq!(bytes[2..4], [4, 0]); // LE length
        let back = Packet::decode(&bytes).unwrap().unwrap();
        assert_eq!(back, packet);
    }

    #[test]
    fn test_unknown_type_is_none() {
        let bytes = [0u8, 0x7f, 0, 0];
        assert!(Packet::decode(&bytes).unwrap().is_none());
    }
}
