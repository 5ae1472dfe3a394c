//! The lump directory: ordered lump records, namespace group bookkeeping
//! and name lookup. Later archives shadow earlier ones because name
//! lookup scans in reverse.

use crate::wad::archive::{ArchiveHandle, AuxDirectory, FileRecord};
use crate::wad::{WadError, WadResult};
use crate::zone::UserSlot;

/// An 8-byte, NUL-padded, uppercase lump name. Comparison happens on the
/// packed u64 representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LumpName(pub [u8; 8]);

impl LumpName {
    pub fn from_str(name: &str) -> LumpName {
        let mut bytes = [0u8; 8];
        for (i, b) in name.bytes().take(8).enumerate() {
            bytes[i] = b.to_ascii_uppercase();
        }
        LumpName(bytes)
    }

    #[inline]
    pub fn packed(&self) -> u64 {
        u64::from_le_bytes(self.0)
    }

    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(8);
        std::str::from_utf8(&self.0[..end]).unwrap_or("")
    }

    /// Name with the first character stripped, for the `FF_START` style
    /// marker aliases.
    fn tail(&self) -> LumpName {
        let mut bytes = [0u8; 8];
        bytes[..7].copy_from_slice(&self.0[1..]);
        LumpName(bytes)
    }
}

impl std::fmt::Display for LumpName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Namespace group tag, derived from marker lumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupTag {
    None,
    Flats,
    Sprites,
}

const GROUPS: &[(GroupTag, &str, &str)] = &[
    (GroupTag::Flats, "F_START", "F_END"),
    (GroupTag::Sprites, "S_START", "S_END"),
];

/// If `name` is a start (`begin`) or end marker, the group it delimits.
/// A name matches a marker directly or with its first character removed
/// (so `FF_START` begins the flats group too).
pub fn marker_for_group(name: LumpName, begin: bool) -> Option<GroupTag> {
    for &(tag, start, end) in GROUPS {
        let marker = LumpName::from_str(if begin { start } else { end });
        if name == marker || name.tail() == marker {
            return Some(tag);
        }
    }
    None
}

fn group_end_marker(tag: GroupTag) -> LumpName {
    for &(t, _, end) in GROUPS {
        if t == tag {
            return LumpName::from_str(end);
        }
    }
    unreachable!("group tag without marker")
}

/// Compression info for archive entries that are not stored raw.
#[derive(Debug, Clone, Copy)]
pub struct Deflated {
    pub compressed_size: u64,
}

/// One directory entry.
#[derive(Debug, Clone)]
pub struct Lump {
    pub name: LumpName,
    pub group: GroupTag,
    pub handle: ArchiveHandle,
    /// Byte offset of the data inside the backing file.
    pub position: u64,
    pub size: usize,
    /// Present when the entry is a deflated PK3 member.
    pub deflated: Option<Deflated>,
}

/// The content store: archive records plus the primary (and optional
/// auxiliary) lump directory and its cache slots.
pub struct ContentStore {
    pub(crate) records: Vec<FileRecord>,
    pub(crate) next_handle: u32,
    pub(crate) lumps: Vec<Lump>,
    pub(crate) cache: Vec<UserSlot>,
    pub(crate) aux: Option<AuxDirectory>,
    pub(crate) iwad_loaded: bool,
    pub(crate) loading_for_startup: bool,
}

impl ContentStore {
    pub fn new() -> ContentStore {
        ContentStore {
            records: Vec::new(),
            next_handle: 1,
            lumps: Vec::new(),
            cache: Vec::new(),
            aux: None,
            iwad_loaded: false,
            loading_for_startup: true,
        }
    }

    pub fn num_lumps(&self) -> usize {
        self.lumps.len()
    }

    pub fn iwad_loaded(&self) -> bool {
        self.iwad_loaded
    }

    /// Insert one batch of lumps from a newly added archive, honoring
    /// group semantics: lumps between start/end markers merge into an
    /// existing group of the same tag; the new markers are kept only when
    /// no prior group exists. Ordinary lumps append.
    pub(crate) fn insert_lumps(&mut self, incoming: Vec<Lump>) -> usize {
        let mut inserted = 0;
        let mut inside: Option<GroupTag> = None;
        let mut group_buf: Vec<Lump> = Vec::new();
        let mut start_marker: Option<Lump> = None;

        for lump in incoming {
            match inside {
                None => {
                    if let Some(tag) = marker_for_group(lump.name, true) {
                        inside = Some(tag);
                        start_marker = Some(lump);
                        group_buf.clear();
                        continue;
                    }
                    self.push_lump(lump);
                    inserted += 1;
                }
                Some(tag) => {
                    if marker_for_group(lump.name, false) == Some(tag) {
                        // Group ends; merge or append it.
                        match self.scan_for_name(group_end_marker(tag), 0) {
                            Some(to) => {
                                // Existing group: splice in front of its
                                // end marker, markers dropped.
                                for (k, mut member) in group_buf.drain(..).enumerate() {
                                    member.group = tag;
                                    self.insert_lump_at(to + k, member);
                                    inserted += 1;
                                }
                            }
                            None => {
                                // First group of this tag: keep markers.
                                let start = start_marker.take().expect("marker recorded");
                                self.push_lump(start);
                                inserted += 1;
                                for mut member in group_buf.drain(..) {
                                    member.group = tag;
                                    self.push_lump(member);
                                    inserted += 1;
                                }
                                self.push_lump(lump);
                                inserted += 1;
                            }
                        }
                        inside = None;
                        start_marker = None;
                    } else {
                        group_buf.push(lump);
                    }
                }
            }
        }

        if inside.is_some() && !group_buf.is_empty() {
            log::warn!(
                "[ContentStore::insert_lumps] Unterminated group; {} lumps dropped",
                group_buf.len()
            );
        }
        inserted
    }

    fn push_lump(&mut self, lump: Lump) {
        self.lumps.push(lump);
        self.cache.push(crate::zone::new_user_slot());
    }

    fn insert_lump_at(&mut self, index: usize, lump: Lump) {
        self.lumps.insert(index, lump);
        self.cache.insert(index, crate::zone::new_user_slot());
    }

    /// Forward scan for an exact name from the given index.
    pub fn scan_for_name(&self, name: LumpName, from: usize) -> Option<usize> {
        if from >= self.lumps.len() {
            return None;
        }
        let key = name.packed();
        self.lumps[from..]
            .iter()
            .position(|l| l.name.packed() == key)
            .map(|p| from + p)
    }

    /// Reverse scan so that later archives shadow earlier lookups.
    pub fn check_num_for_name(&self, name: &str) -> Option<usize> {
        if name.is_empty() {
            log::debug!("[ContentStore::check_num_for_name] Empty name");
            return None;
        }
        let key = LumpName::from_str(name).packed();
        self.lumps
            .iter()
            .rposition(|l| l.name.packed() == key)
    }

    /// Like `check_num_for_name` but an absent lump is an error.
    pub fn get_num_for_name(&self, name: &str) -> WadResult<usize> {
        self.check_num_for_name(name)
            .ok_or_else(|| WadError::NotFound {
                path: name.to_string(),
            })
    }

    pub(crate) fn lump_at(&self, index: usize) -> WadResult<&Lump> {
        self.resolve(index)
            .ok_or(WadError::BadLumpIndex { index })
    }

    /// Resolve an index against the primary or, at `AUX_BASE` and above,
    /// the auxiliary directory.
    pub(crate) fn resolve(&self, index: usize) -> Option<&Lump> {
        if index >= crate::constants::wad::AUX_BASE {
            self.aux
                .as_ref()?
                .lumps
                .get(index - crate::constants::wad::AUX_BASE)
        } else {
            self.lumps.get(index)
        }
    }

    pub fn lump_length(&self, index: usize) -> WadResult<usize> {
        Ok(self.lump_at(index)?.size)
    }

    pub fn lump_name(&self, index: usize) -> Option<LumpName> {
        self.resolve(index).map(|l| l.name)
    }

    pub fn lump_group(&self, index: usize) -> Option<GroupTag> {
        self.resolve(index).map(|l| l.group)
    }

    /// Archive handle of the lump's origin.
    pub fn lump_handle(&self, index: usize) -> Option<ArchiveHandle> {
        self.resolve(index).map(|l| l.handle)
    }

    /// Source file path of a lump, if its record is still registered.
    pub fn lump_source_file(&self, index: usize) -> Option<&str> {
        let handle = self.lump_handle(index)?;
        self.records
            .iter()
            .find(|r| r.handle == handle)
            .map(|r| r.path.as_str())
    }

    /// An extremely simple identification number: the wrapping sum of
    /// `size + name bytes` over the archive's lumps. Does not conform to
    /// any CRC standard; display use only.
    pub fn crc_for_archive(&self, handle: ArchiveHandle) -> u32 {
        let mut crc: u32 = 0;
        for lump in self.lumps.iter().filter(|l| l.handle == handle) {
            crc = crc.wrapping_add(lump.size as u32);
            for &b in &lump.name.0 {
                crc = crc.wrapping_add(b as u32);
            }
        }
        crc
    }

    /// Identification number of the active IWAD, or 0 when none.
    pub fn iwad_crc(&self) -> u32 {
        self.records
            .iter()
            .find(|r| r.is_iwad)
            .map(|r| self.crc_for_archive(r.handle))
            .unwrap_or(0)
    }

    /// Names of all loaded patch archives, `.gwa` companions excluded.
    pub fn pwad_file_names(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| !r.is_iwad && !r.path.to_ascii_lowercase().ends_with(".gwa"))
            .map(|r| r.path.as_str())
            .collect()
    }
}

impl Default for ContentStore {
    fn default() -> Self {
        ContentStore::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lump_name_uppercases_and_packs() {
        let a = LumpName::from_str("floor4_8");
        let b = LumpName::from_str("FLOOR4_8");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "FLOOR4_8");
        assert_eq!(a.packed(), b.packed());
    }

    #[test]
    fn test_marker_recognition() {
        assert_eq!(
            marker_for_group(LumpName::from_str("F_START"), true),
            Some(GroupTag::Flats)
        );
        assert_eq!(
            marker_for_group(LumpName::from_str("FF_START"), true),
            Some(GroupTag::Flats)
        );
        assert_eq!(
            marker_for_group(LumpName::from_str("S_END"), false),
            Some(GroupTag::Sprites)
        );
        assert_eq!(marker_for_group(LumpName::from_str("MAP01"), true), None);
    }
}
