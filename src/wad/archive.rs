//! Archive records and file-level operations: recognizing and loading
//! WAD / PK3 / single-lump files, removing them again, and the auxiliary
//! directory with its disjoint index namespace.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::constants::wad::{AUX_BASE, DIRENT_SIZE, HEADER_SIZE};
use crate::wad::pk3;
use crate::wad::store::{ContentStore, Lump, LumpName};
use crate::wad::{GroupTag, WadError, WadResult};
use crate::zone::{PurgeTag, UserSlot, Zone};

/// Identifies the archive a lump came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchiveHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Iwad,
    Pwad,
    /// IWAD-grade content that does not satisfy the IWAD requirement.
    Jwad,
    SingleLump,
    Pk3,
}

/// One opened archive file.
pub struct FileRecord {
    pub path: String,
    pub handle: ArchiveHandle,
    pub kind: RecordKind,
    pub is_iwad: bool,
    /// Loaded after startup ended; removed by `reset_runtime`.
    pub is_runtime: bool,
    pub num_lumps: usize,
    pub(crate) file: File,
}

/// The auxiliary directory: a second WAD opened under a disjoint index
/// namespace starting at `AUX_BASE`.
pub struct AuxDirectory {
    pub(crate) path: String,
    pub(crate) file: File,
    pub(crate) lumps: Vec<Lump>,
    pub(crate) cache: Vec<UserSlot>,
}

fn convert_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

fn file_stem(path: &str) -> &str {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
}

fn extension(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn read_exact_at(file: &mut File, offset: u64, buf: &mut [u8], path: &str) -> WadResult<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf).map_err(|_| WadError::Truncated {
        path: path.to_string(),
    })
}

/// Parsed 12-byte WAD header.
struct WadHeader {
    magic: [u8; 4],
    num_lumps: u32,
    info_table_offset: u32,
}

fn read_wad_header(file: &mut File, path: &str) -> WadResult<WadHeader> {
    let mut raw = [0u8; HEADER_SIZE];
    read_exact_at(file, 0, &mut raw, path)?;
    Ok(WadHeader {
        magic: [raw[0], raw[1], raw[2], raw[3]],
        num_lumps: u32::from_le_bytes(raw[4..8].try_into().unwrap()),
        info_table_offset: u32::from_le_bytes(raw[8..12].try_into().unwrap()),
    })
}

fn read_wad_directory(
    file: &mut File,
    header: &WadHeader,
    handle: ArchiveHandle,
    path: &str,
) -> WadResult<Vec<Lump>> {
    let count = header.num_lumps as usize;
    let mut raw = vec![0u8; count * DIRENT_SIZE];
    read_exact_at(file, header.info_table_offset as u64, &mut raw, path)?;

    let mut lumps = Vec::with_capacity(count);
    for entry in raw.chunks_exact(DIRENT_SIZE) {
        let position = u32::from_le_bytes(entry[0..4].try_into().unwrap()) as u64;
        let size = u32::from_le_bytes(entry[4..8].try_into().unwrap()) as usize;
        let mut name = [0u8; 8];
        for (i, &b) in entry[8..16].iter().enumerate() {
            // Space or NUL padded, case-insensitive.
            name[i] = if b == b' ' { 0 } else { b.to_ascii_uppercase() };
        }
        lumps.push(Lump {
            name: LumpName(name),
            group: GroupTag::None,
            handle,
            position,
            size,
            deflated: None,
        });
    }
    Ok(lumps)
}

/// Lump name for a single-lump file. A `.N/` parent directory (N in
/// 1..=9) offsets the start of the name inside the file stem.
fn single_lump_name(path: &str) -> LumpName {
    let normalized = convert_slashes(path);
    let stem = file_stem(&normalized);

    let mut offset = 0usize;
    if let Some(parent) = Path::new(&normalized).parent().and_then(|p| p.file_name()) {
        let parent = parent.to_string_lossy();
        let bytes = parent.as_bytes();
        if bytes.len() == 2 && bytes[0] == b'.' && (b'1'..=b'9').contains(&bytes[1]) {
            offset = (bytes[1] - b'1') as usize + 1;
        }
    }

    if extension(&normalized) == "deh" {
        return LumpName::from_str("DEHACKED");
    }
    LumpName::from_str(stem.get(offset..).unwrap_or(stem))
}

impl ContentStore {
    fn alloc_handle(&mut self) -> ArchiveHandle {
        let h = ArchiveHandle(self.next_handle);
        self.next_handle += 1;
        h
    }

    fn record_index(&self, path: &str) -> Option<usize> {
        let wanted = convert_slashes(path);
        self.records
            .iter()
            .position(|r| r.path.eq_ignore_ascii_case(&wanted))
    }

    /// Add an archive file. Returns false (after logging) when the file
    /// is missing or is a duplicate; a bad WAD id is a hard error.
    pub fn add_archive(&mut self, path: &str, allow_duplicate: bool) -> WadResult<bool> {
        if path.is_empty() {
            return Ok(false);
        }

        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(_) => {
                log::warn!("[ContentStore::add_archive] {} not found", path);
                return Ok(false);
            }
        };

        if !allow_duplicate && self.record_index(path).is_some() {
            log::debug!("[ContentStore::add_archive] {} already loaded", path);
            return Ok(false);
        }

        log::info!("[ContentStore::add_archive] {}", path);
        let ext = extension(path);
        let handle = self.alloc_handle();

        let (kind, lumps) = match ext.as_str() {
            "zip" | "pk3" => {
                let entries = pk3::read_entries(&mut file, path, handle)?;
                (RecordKind::Pk3, entries)
            }
            "wad" | "gwa" => {
                let header = read_wad_header(&mut file, path)?;
                let kind = match &header.magic {
                    b"JWAD" => RecordKind::Jwad,
                    b"IWAD" => {
                        self.iwad_loaded = true;
                        RecordKind::Iwad
                    }
                    b"PWAD" => RecordKind::Pwad,
                    _ => {
                        return Err(WadError::BadMagic {
                            path: path.to_string(),
                        })
                    }
                };
                (kind, read_wad_directory(&mut file, &header, handle, path)?)
            }
            _ => {
                // Single-lump file; whole file is the payload.
                let size = file.metadata()?.len() as usize;
                let lump = Lump {
                    name: single_lump_name(path),
                    group: GroupTag::None,
                    handle,
                    position: 0,
                    size,
                    deflated: None,
                };
                (RecordKind::SingleLump, vec![lump])
            }
        };

        let is_iwad = matches!(kind, RecordKind::Iwad | RecordKind::Jwad) && ext != "gwa";
        let inserted = self.insert_lumps(lumps);

        self.records.push(FileRecord {
            path: convert_slashes(path),
            handle,
            kind,
            is_iwad,
            is_runtime: !self.loading_for_startup,
            num_lumps: inserted,
            file,
        });

        if is_iwad {
            log::info!(
                "[ContentStore::add_archive] IWAD identification: {:08x}",
                self.crc_for_archive(handle)
            );
        }

        // A matching .gwa carries glBSP data for this wad; auto-load it.
        if ext == "wad" {
            let companion = format!("{}.gwa", path.strip_suffix(".wad").unwrap_or(path));
            if Path::new(&companion).exists() {
                self.add_archive(&companion, allow_duplicate)?;
            }
        }

        Ok(true)
    }

    /// Remove an archive previously added. Cached lumps are demoted to
    /// the `Level` purge tag (when more strongly held) and detached from
    /// their cache slots; group markers survive while other archives
    /// still have lumps inside the group.
    pub fn remove_archive(&mut self, path: &str, zone: &mut Zone) -> WadResult<bool> {
        let Some(rec_idx) = self.record_index(path) else {
            return Ok(false);
        };
        let handle = self.records[rec_idx].handle;

        // Which indices go away?
        let mut doomed = vec![false; self.lumps.len()];
        for (i, lump) in self.lumps.iter().enumerate() {
            if lump.handle != handle {
                continue;
            }
            let is_marker = marker_kind(lump.name).is_some();
            if is_marker && self.group_has_foreign_members(i, handle) {
                continue; // Marker still delimits someone else's lumps.
            }
            doomed[i] = true;
        }

        // Demote and detach the cache entries of doomed lumps.
        for (i, &dead) in doomed.iter().enumerate() {
            if !dead {
                continue;
            }
            let block = *self.cache[i].lock();
            if let Some(id) = block {
                if zone.tag_of(id).is_some_and(|t| t < PurgeTag::Level) {
                    zone.change_tag(id, PurgeTag::Level);
                }
                zone.change_user(id, None);
                *self.cache[i].lock() = None;
            }
        }

        let mut keep_lumps = Vec::with_capacity(self.lumps.len());
        let mut keep_cache = Vec::with_capacity(self.cache.len());
        for (i, lump) in self.lumps.drain(..).enumerate() {
            if !doomed[i] {
                keep_lumps.push(lump);
                keep_cache.push(self.cache[i].clone());
            }
        }
        self.lumps = keep_lumps;
        self.cache = keep_cache;

        self.records.remove(rec_idx);
        log::info!("[ContentStore::remove_archive] {}", path);
        Ok(true)
    }

    /// Whether the group delimited by the marker at `marker_idx` holds
    /// lumps from archives other than `handle`.
    fn group_has_foreign_members(&self, marker_idx: usize, handle: ArchiveHandle) -> bool {
        let name = self.lumps[marker_idx].name;
        match marker_kind(name) {
            Some(true) => self.lumps[marker_idx + 1..]
                .iter()
                .take_while(|l| marker_kind(l.name) != Some(false))
                .any(|l| l.handle != handle),
            Some(false) => self.lumps[..marker_idx]
                .iter()
                .rev()
                .take_while(|l| marker_kind(l.name) != Some(true))
                .any(|l| l.handle != handle),
            None => false,
        }
    }

    /// Remove every archive flagged runtime.
    pub fn reset_runtime(&mut self, zone: &mut Zone) {
        let paths: Vec<String> = self
            .records
            .iter()
            .filter(|r| r.is_runtime)
            .map(|r| r.path.clone())
            .collect();
        for path in paths {
            let _ = self.remove_archive(&path, zone);
        }
    }

    /// True if the file exists and carries the IWAD magic.
    pub fn is_iwad_file(path: &str) -> bool {
        let Ok(mut file) = File::open(path) else {
            return false;
        };
        let mut magic = [0u8; 4];
        if file.read_exact(&mut magic).is_err() {
            return false;
        }
        &magic == b"IWAD"
    }

    /// Load a list of archives; IWADs load first so that patch archives
    /// shadow them. At least one IWAD must be found.
    pub fn init(&mut self, files: &[&str]) -> WadResult<()> {
        self.loading_for_startup = true;

        for path in files.iter().filter(|p| Self::is_iwad_file(p)) {
            self.add_archive(path, false)?;
        }
        for path in files.iter().filter(|p| !Self::is_iwad_file(p)) {
            self.add_archive(path, false)?;
        }

        if !self.iwad_loaded {
            return Err(WadError::NoIwad);
        }
        if self.lumps.is_empty() {
            return Err(WadError::NoIwad);
        }
        Ok(())
    }

    /// No more archives count as startup content after this.
    pub fn end_startup(&mut self) {
        self.loading_for_startup = false;
    }

    /// Read a whole lump into a fresh buffer.
    pub fn read_lump(&mut self, index: usize) -> WadResult<Vec<u8>> {
        let lump = self.lump_at(index)?.clone();
        let mut buf = vec![0u8; lump.size];
        self.read_into(index, &lump, 0, &mut buf)?;
        Ok(buf)
    }

    /// Read `buf.len()` bytes starting `start` bytes into the lump.
    pub fn read_lump_section(
        &mut self,
        index: usize,
        start: usize,
        buf: &mut [u8],
    ) -> WadResult<()> {
        let lump = self.lump_at(index)?.clone();
        self.read_into(index, &lump, start, buf)
    }

    fn read_into(
        &mut self,
        index: usize,
        lump: &Lump,
        start: usize,
        buf: &mut [u8],
    ) -> WadResult<()> {
        if start + buf.len() > lump.size {
            return Err(WadError::BadLumpIndex { index });
        }

        if let Some(deflated) = lump.deflated {
            // Deflated PK3 member: inflate the whole entry, then copy.
            let (file, path) = self.backing_file(index, lump.handle)?;
            let data = pk3::inflate_entry(file, lump.position, deflated.compressed_size, lump.size, &path)?;
            buf.copy_from_slice(&data[start..start + buf.len()]);
            return Ok(());
        }

        let (file, path) = self.backing_file(index, lump.handle)?;
        read_exact_at(file, lump.position + start as u64, buf, &path)
    }

    fn backing_file(
        &mut self,
        index: usize,
        handle: ArchiveHandle,
    ) -> WadResult<(&mut File, String)> {
        if index >= AUX_BASE {
            let aux = self.aux.as_mut().ok_or(WadError::AuxiliaryNotOpen)?;
            let path = aux.path.clone();
            return Ok((&mut aux.file, path));
        }
        let rec = self
            .records
            .iter_mut()
            .find(|r| r.handle == handle)
            .ok_or(WadError::BadLumpIndex { index })?;
        let path = rec.path.clone();
        Ok((&mut rec.file, path))
    }

    /// Open a WAD under the auxiliary index namespace. Any previously
    /// open auxiliary is closed first. Returns the base index.
    pub fn open_auxiliary(&mut self, path: &str, zone: &mut Zone) -> WadResult<usize> {
        if self.aux.is_some() {
            self.close_auxiliary(zone);
        }

        let mut file = File::open(path).map_err(|_| WadError::NotFound {
            path: path.to_string(),
        })?;
        let header = read_wad_header(&mut file, path)?;
        if !matches!(&header.magic, b"IWAD" | b"PWAD") {
            return Err(WadError::BadMagic {
                path: path.to_string(),
            });
        }

        let handle = self.alloc_handle();
        let lumps = read_wad_directory(&mut file, &header, handle, path)?;
        let cache = (0..lumps.len()).map(|_| crate::zone::new_user_slot()).collect();

        self.aux = Some(AuxDirectory {
            path: convert_slashes(path),
            file,
            lumps,
            cache,
        });
        Ok(AUX_BASE)
    }

    /// Close the auxiliary archive. Cached auxiliary lumps are freed
    /// outright rather than demoted; nothing may hold them across a
    /// close.
    pub fn close_auxiliary(&mut self, zone: &mut Zone) {
        if let Some(aux) = self.aux.take() {
            for slot in &aux.cache {
                if let Some(id) = *slot.lock() {
                    zone.free(id);
                }
            }
            log::debug!("[ContentStore::close_auxiliary] {}", aux.path);
        }
    }
}

fn marker_kind(name: LumpName) -> Option<bool> {
    if crate::wad::store::marker_for_group(name, true).is_some() {
        Some(true)
    } else if crate::wad::store::marker_for_group(name, false).is_some() {
        Some(false)
    } else {
        None
    }
}
