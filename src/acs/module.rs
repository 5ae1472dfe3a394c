//! A compiled ACS module: the pcode buffer, the constants (string)
//! table, and the script entry points.

use crate::acs::{AcsError, AcsResult};

#[derive(Debug, Clone)]
pub struct EntryPoint {
    pub script_number: i32,
    /// Byte offset of the first opcode inside the pcode buffer.
    pub address: usize,
    pub arg_count: usize,
}

/// The compiled form of a map's BEHAVIOR lump. Addresses inside the
/// pcode are byte offsets from the start of the lump.
#[derive(Debug, Clone, Default)]
pub struct AcsModule {
    pcode: Vec<u8>,
    constants: Vec<String>,
    entry_points: Vec<EntryPoint>,
}

impl AcsModule {
    /// Parse a compiled module: `ACS\0` magic, directory offset, script
    /// table, string table.
    pub fn load(bytes: &[u8]) -> AcsResult<AcsModule> {
        if bytes.len() < 8 || &bytes[0..4] != b"ACS\0" {
            return Err(AcsError::BadMagic);
        }

        let read_i32 = |offset: usize| -> AcsResult<i32> {
            bytes
                .get(offset..offset + 4)
                .map(|b| i32::from_le_bytes(b.try_into().unwrap()))
                .ok_or(AcsError::Truncated)
        };

        let dir = read_i32(4)? as usize;
        let script_count = read_i32(dir)? as usize;

        let mut entry_points = Vec::with_capacity(script_count);
        let mut cursor = dir + 4;
        for _ in 0..script_count {
            let number = read_i32(cursor)?;
            let address = read_i32(cursor + 4)? as usize;
            let arg_count = read_i32(cursor + 8)? as usize;
            cursor += 12;
            entry_points.push(EntryPoint {
                // Numbers >= 1000 encode a spawn type in the thousands
                // digit; the script number proper is the remainder.
                script_number: number % 1000,
                address,
                arg_count,
            });
        }

        let string_count = read_i32(cursor)? as usize;
        cursor += 4;
        let mut constants = Vec::with_capacity(string_count);
        for i in 0..string_count {
            let offset = read_i32(cursor + i * 4)? as usize;
            let end = bytes[offset..]
                .iter()
                .position(|&b| b == 0)
                .map(|p| offset + p)
                .ok_or(AcsError::Truncated)?;
            constants.push(String::from_utf8_lossy(&bytes[offset..end]).into_owned());
        }

        Ok(AcsModule {
            pcode: bytes.to_vec(),
            constants,
            entry_points,
        })
    }

    /// Assemble a module from raw parts. Used by generated content and
    /// tests; addresses follow the same byte-offset convention.
    pub fn from_parts(
        pcode: Vec<u8>,
        constants: Vec<String>,
        entry_points: Vec<EntryPoint>,
    ) -> AcsModule {
        AcsModule {
            pcode,
            constants,
            entry_points,
        }
    }

    pub fn pcode_len(&self) -> usize {
        self.pcode.len()
    }

    /// Read the 32-bit word at a byte offset. Out-of-range reads yield
    /// zero (NOP) and are logged; a corrupt module must not take the
    /// session down.
    pub fn read_i32(&self, offset: usize) -> i32 {
        match self.pcode.get(offset..offset + 4) {
            Some(b) => i32::from_le_bytes(b.try_into().unwrap()),
            None => {
                log::error!("[AcsModule::read_i32] Read past pcode end at {}", offset);
                0
            }
        }
    }

    pub fn constant(&self, index: i32) -> &str {
        self.constants
            .get(index as usize)
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    pub fn entry_points(&self) -> &[EntryPoint] {
        &self.entry_points
    }

    pub fn entry_point(&self, script_number: i32) -> Option<&EntryPoint> {
        self.entry_points
            .iter()
            .find(|ep| ep.script_number == script_number)
    }
}
