//! Minimal PK3 (zip) reader. Only what lump loading needs: central
//! directory walk, stored and deflate entries. Entries become lumps named
//! by their file stem.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use flate2::read::DeflateDecoder;

use crate::wad::archive::ArchiveHandle;
use crate::wad::store::{Deflated, Lump, LumpName};
use crate::wad::{GroupTag, WadError, WadResult};

const EOCD_MAGIC: u32 = 0x0605_4b50; // PK\x05\x06
const CDIR_MAGIC: u32 = 0x0201_4b50; // PK\x01\x02
const LOCAL_MAGIC: u32 = 0x0403_4b50; // PK\x03\x04

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATE: u16 = 8;

fn zip_err(path: &str, reason: &str) -> WadError {
    WadError::Zip {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

/// Locate the end-of-central-directory record by scanning the file tail.
fn find_eocd(file: &mut File, path: &str) -> WadResult<u64> {
    let len = file.metadata()?.len();
    let scan = len.min(66_000);
    let mut tail = vec![0u8; scan as usize];
    file.seek(SeekFrom::Start(len - scan))?;
    file.read_exact(&mut tail)?;

    for i in (0..tail.len().saturating_sub(3)).rev() {
        if u32::from_le_bytes(tail[i..i + 4].try_into().unwrap()) == EOCD_MAGIC {
            return Ok(len - scan + i as u64);
        }
    }
    Err(zip_err(path, "no end-of-central-directory record"))
}

/// Resolve the data offset of an entry by reading its local header.
fn data_offset(file: &mut File, local_offset: u64, path: &str) -> WadResult<u64> {
    let mut header = [0u8; 30];
    file.seek(SeekFrom::Start(local_offset))?;
    file.read_exact(&mut header)
        .map_err(|_| zip_err(path, "truncated local header"))?;
    if u32::from_le_bytes(header[0..4].try_into().unwrap()) != LOCAL_MAGIC {
        return Err(zip_err(path, "bad local header magic"));
    }
    let name_len = u16::from_le_bytes(header[26..28].try_into().unwrap()) as u64;
    let extra_len = u16::from_le_bytes(header[28..30].try_into().unwrap()) as u64;
    Ok(local_offset + 30 + name_len + extra_len)
}

/// Walk the central directory, producing one lump per usable entry.
/// Directories and unsupported compression methods are skipped.
pub fn read_entries(
    file: &mut File,
    path: &str,
    handle: ArchiveHandle,
) -> WadResult<Vec<Lump>> {
    let eocd = find_eocd(file, path)?;
    let mut rec = [0u8; 22];
    file.seek(SeekFrom::Start(eocd))?;
    file.read_exact(&mut rec)
        .map_err(|_| zip_err(path, "truncated EOCD"))?;

    let entry_count = u16::from_le_bytes(rec[10..12].try_into().unwrap()) as usize;
    let cdir_offset = u32::from_le_bytes(rec[16..20].try_into().unwrap()) as u64;

    let mut raw_entries = Vec::with_capacity(entry_count);
    let mut cursor = cdir_offset;
    for _ in 0..entry_count {
        let mut fixed = [0u8; 46];
        file.seek(SeekFrom::Start(cursor))?;
        file.read_exact(&mut fixed)
            .map_err(|_| zip_err(path, "truncated central directory"))?;
        if u32::from_le_bytes(fixed[0..4].try_into().unwrap()) != CDIR_MAGIC {
            return Err(zip_err(path, "bad central directory magic"));
        }

        let method = u16::from_le_bytes(fixed[10..12].try_into().unwrap());
        let csize = u32::from_le_bytes(fixed[20..24].try_into().unwrap()) as u64;
        let usize_ = u32::from_le_bytes(fixed[24..28].try_into().unwrap()) as usize;
        let name_len = u16::from_le_bytes(fixed[28..30].try_into().unwrap()) as usize;
        let extra_len = u16::from_le_bytes(fixed[30..32].try_into().unwrap()) as usize;
        let comment_len = u16::from_le_bytes(fixed[32..34].try_into().unwrap()) as usize;
        let local_offset = u32::from_le_bytes(fixed[42..46].try_into().unwrap()) as u64;

        let mut name_buf = vec![0u8; name_len];
        file.read_exact(&mut name_buf)
            .map_err(|_| zip_err(path, "truncated entry name"))?;
        let entry_name = String::from_utf8_lossy(&name_buf).into_owned();

        cursor += 46 + name_len as u64 + extra_len as u64 + comment_len as u64;
        raw_entries.push((entry_name, method, csize, usize_, local_offset));
    }

    let mut lumps = Vec::new();
    for (entry_name, method, csize, usize_, local_offset) in raw_entries {
        if entry_name.ends_with('/') {
            continue; // Directory entry.
        }
        if method != METHOD_STORED && method != METHOD_DEFLATE {
            log::warn!(
                "[pk3::read_entries] {}: unsupported method {} for {}",
                path,
                method,
                entry_name
            );
            continue;
        }

        let stem = std::path::Path::new(&entry_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("");
        if stem.is_empty() {
            continue;
        }

        let position = data_offset(file, local_offset, path)?;
        lumps.push(Lump {
            name: LumpName::from_str(stem),
            group: GroupTag::None,
            handle,
            position,
            size: usize_,
            deflated: (method == METHOD_DEFLATE).then_some(Deflated {
                compressed_size: csize,
            }),
        });
    }

    log::debug!("[pk3::read_entries] {}: {} lumps", path, lumps.len());
    Ok(lumps)
}

/// Inflate one deflate-compressed entry. `position` is the data offset
/// resolved at open time.
pub fn inflate_entry(
    file: &mut File,
    position: u64,
    compressed_size: u64,
    uncompressed_size: usize,
    path: &str,
) -> WadResult<Vec<u8>> {
    let mut compressed = vec![0u8; compressed_size as usize];
    file.seek(SeekFrom::Start(position))?;
    file.read_exact(&mut compressed)
        .map_err(|_| zip_err(path, "truncated entry data"))?;

    let mut out = Vec::with_capacity(uncompressed_size);
    DeflateDecoder::new(compressed.as_slice())
        .read_to_end(&mut out)
        .map_err(|_| zip_err(path, "bad deflate stream"))?;
    if out.len() != uncompressed_size {
        return Err(zip_err(path, "inflated size mismatch"));
    }
    Ok(out)
}
