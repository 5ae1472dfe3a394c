//! Lazy lump materialization into the memory zone.
//!
//! Each directory entry has a parallel cache slot. The zone nulls the
//! slot when it reclaims the block, so a purged lump is simply read
//! again on the next request.

use crate::constants::wad::AUX_BASE;
use crate::wad::store::ContentStore;
use crate::wad::{WadError, WadResult};
use crate::zone::{BlockId, PurgeTag, UserSlot, Zone};

impl ContentStore {
    fn cache_slot(&self, index: usize) -> WadResult<UserSlot> {
        if index >= AUX_BASE {
            let aux = self.aux.as_ref().ok_or(WadError::AuxiliaryNotOpen)?;
            aux.cache
                .get(index - AUX_BASE)
                .cloned()
                .ok_or(WadError::BadLumpIndex { index })
        } else {
            self.cache
                .get(index)
                .cloned()
                .ok_or(WadError::BadLumpIndex { index })
        }
    }

    /// Materialize a lump in the zone (or retag the resident block) and
    /// return its block id. The returned block stays valid until the
    /// zone purges its tag level.
    pub fn cache_lump(
        &mut self,
        zone: &mut Zone,
        index: usize,
        tag: PurgeTag,
    ) -> WadResult<BlockId> {
        let slot = self.cache_slot(index)?;
        let resident = *slot.lock();

        if let Some(id) = resident {
            zone.change_tag(id, tag);
            return Ok(id);
        }

        let size = self.lump_length(index)?;
        let id = zone.alloc(size, tag, Some(slot));
        let mut buf = vec![0u8; size];
        self.read_lump_section(index, 0, &mut buf)?;
        zone.data_mut(id)
            .expect("freshly allocated block")
            .copy_from_slice(&buf);
        Ok(id)
    }

    /// Convenience wrapper: cache and borrow the bytes in one call.
    pub fn cache_lump_bytes<'z>(
        &mut self,
        zone: &'z mut Zone,
        index: usize,
        tag: PurgeTag,
    ) -> WadResult<&'z [u8]> {
        let id = self.cache_lump(zone, index, tag)?;
        Ok(zone.data(id).expect("block just cached"))
    }

    /// Cache a lump found by name (reverse-scan shadowing applies).
    pub fn cache_lump_named<'z>(
        &mut self,
        zone: &'z mut Zone,
        name: &str,
        tag: PurgeTag,
    ) -> WadResult<&'z [u8]> {
        let index = self.get_num_for_name(name)?;
        self.cache_lump_bytes(zone, index, tag)
    }

    /// Promote or demote the purge tag of a resident lump. A lump that
    /// is not resident is left alone.
    pub fn change_cache_tag(&mut self, zone: &mut Zone, index: usize, tag: PurgeTag) {
        if let Ok(slot) = self.cache_slot(index) {
            if let Some(id) = *slot.lock() {
                zone.change_tag(id, tag);
            }
        }
    }

    /// Whether the lump currently has a resident cached block.
    pub fn is_lump_cached(&self, index: usize) -> bool {
        self.cache_slot(index)
            .map(|slot| slot.lock().is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use crate::wad::store::{ContentStore, GroupTag};
    use crate::zone::{PurgeTag, Zone};

    /// Build a minimal WAD file on disk.
    fn write_wad(path: &std::path::Path, magic: &[u8; 4], lumps: &[(&str, &[u8])]) {
        let mut data: Vec<u8> = Vec::new();
        let mut dir: Vec<u8> = Vec::new();
        let header = 12usize;
        let mut cursor = header;
        for (name, bytes) in lumps {
            dir.extend_from_slice(&(cursor as i32).to_le_bytes());
            dir.extend_from_slice(&(bytes.len() as i32).to_le_bytes());
            let mut name8 = [0u8; 8];
            for (i, b) in name.bytes().take(8).enumerate() {
                name8[i] = b;
            }
            dir.extend_from_slice(&name8);
            cursor += bytes.len();
        }

        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(magic).unwrap();
        file.write_all(&(lumps.len() as i32).to_le_bytes()).unwrap();
        file.write_all(&(cursor as i32).to_le_bytes()).unwrap();
        for (_, bytes) in lumps {
            file.write_all(bytes).unwrap();
        }
        file.write_all(&dir).unwrap();
    }

    #[test]
    fn test_later_archive_shadows_earlier() {
        let dir = tempfile::tempdir().unwrap();
        let iwad = dir.path().join("base.wad");
        let pwad = dir.path().join("patch.wad");
        write_wad(&iwad, b"IWAD", &[("FLOOR4_8", &[0xAA; 4096])]);
        write_wad(&pwad, b"PWAD", &[("FLOOR4_8", &[0xBB; 4096])]);

        let mut store = ContentStore::new();
        let mut zone = Zone::new();
        store
            .init(&[iwad.to_str().unwrap(), pwad.to_str().unwrap()])
            .unwrap();

        let idx = store.check_num_for_name("FLOOR4_8").unwrap();
        let bytes = store
            .cache_lump_bytes(&mut zone, idx, PurgeTag::Cache)
            .unwrap();
        assert_eq!(bytes.len(), 4096);
        assert!(bytes.iter().all(|&b| b == 0xBB));
    }

    #[test]
    fn test_read_lump_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let wad = dir.path().join("one.wad");
        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        write_wad(&wad, b"IWAD", &[("DATA", &payload)]);

        let mut store = ContentStore::new();
        store.init(&[wad.to_str().unwrap()]).unwrap();
        let idx = store.get_num_for_name("DATA").unwrap();
        assert_eq!(store.lump_length(idx).unwrap(), 1000);
        assert_eq!(store.read_lump(idx).unwrap(), payload);

        let mut section = vec![0u8; 10];
        store.read_lump_section(idx, 100, &mut section).unwrap();
        assert_eq!(&section, &payload[100..110]);
    }

    #[test]
    fn test_remove_restores_pre_add_state() {
        let dir = tempfile::tempdir().unwrap();
        let iwad = dir.path().join("base.wad");
        let pwad = dir.path().join("patch.wad");
        write_wad(&iwad, b"IWAD", &[("A", b"aa"), ("B", b"bb")]);
        write_wad(&pwad, b"PWAD", &[("B", b"xx"), ("C", b"cc")]);

        let mut store = ContentStore::new();
        let mut zone = Zone::new();
        store.init(&[iwad.to_str().unwrap()]).unwrap();
        let before: Vec<_> = (0..store.num_lumps())
            .map(|i| store.lump_name(i).unwrap())
            .collect();

        store.add_archive(pwad.to_str().unwrap(), false).unwrap();
        assert_eq!(store.num_lumps(), 4);
        store
            .remove_archive(pwad.to_str().unwrap(), &mut zone)
            .unwrap();

        let after: Vec<_> = (0..store.num_lumps())
            .map(|i| store.lump_name(i).unwrap())
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_flat_group_merge_and_tagging() {
        let dir = tempfile::tempdir().unwrap();
        let iwad = dir.path().join("base.wad");
        let pwad = dir.path().join("patch.wad");
        write_wad(
            &iwad,
            b"IWAD",
            &[
                ("MAP01", b"m"),
                ("F_START", b""),
                ("FLAT1", b"11"),
                ("F_END", b""),
            ],
        );
        write_wad(
            &pwad,
            b"PWAD",
            &[("F_START", b""), ("FLAT2", b"22"), ("F_END", b"")],
        );

        let mut store = ContentStore::new();
        store.init(&[iwad.to_str().unwrap()]).unwrap();
        store.add_archive(pwad.to_str().unwrap(), false).unwrap();

        // The patch group merged into the existing one; its own markers
        // were dropped.
        let start = store.check_num_for_name("F_START").unwrap();
        let end = store.check_num_for_name("F_END").unwrap();
        assert_eq!(store.scan_for_name(super::super::store::LumpName::from_str("F_START"), 0), Some(start));
        for i in start + 1..end {
            assert_eq!(store.lump_group(i), Some(GroupTag::Flats));
        }
        assert!(store.check_num_for_name("FLAT1").unwrap() > start);
        assert!(store.check_num_for_name("FLAT2").unwrap() < end);
    }

    #[test]
    fn test_cache_tag_promotion() {
        let dir = tempfile::tempdir().unwrap();
        let wad = dir.path().join("one.wad");
        write_wad(&wad, b"IWAD", &[("DATA", b"payload")]);

        let mut store = ContentStore::new();
        let mut zone = Zone::new();
        store.init(&[wad.to_str().unwrap()]).unwrap();
        let idx = store.get_num_for_name("DATA").unwrap();

        let id = store.cache_lump(&mut zone, idx, PurgeTag::Cache).unwrap();
        assert_eq!(zone.tag_of(id), Some(PurgeTag::Cache));

        // Second request promotes rather than re-reads.
        let id2 = store.cache_lump(&mut zone, idx, PurgeTag::Static).unwrap();
        assert_eq!(id, id2);
        assert_eq!(zone.tag_of(id), Some(PurgeTag::Static));

        // A purged lump simply rematerializes.
        store.change_cache_tag(&mut zone, idx, PurgeTag::Cache);
        zone.purge(PurgeTag::Cache);
        assert!(!store.is_lump_cached(idx));
        let id3 = store.cache_lump(&mut zone, idx, PurgeTag::Cache).unwrap();
        assert_eq!(zone.data(id3).unwrap(), b"payload");
    }

    #[test]
    fn test_auxiliary_namespace_and_close_policy() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("base.wad");
        let auxf = dir.path().join("aux.wad");
        write_wad(&main, b"IWAD", &[("DATA", b"main")]);
        write_wad(&auxf, b"PWAD", &[("EXTRA", b"aux!")]);

        let mut store = ContentStore::new();
        let mut zone = Zone::new();
        store.init(&[main.to_str().unwrap()]).unwrap();

        let base = store
            .open_auxiliary(auxf.to_str().unwrap(), &mut zone)
            .unwrap();
        assert_eq!(store.lump_name(base).unwrap().as_str(), "EXTRA");

        let id = store.cache_lump(&mut zone, base, PurgeTag::Static).unwrap();
        assert_eq!(zone.data(id).unwrap(), b"aux!");

        // Close frees cached auxiliary lumps outright.
        store.close_auxiliary(&mut zone);
        assert!(zone.data(id).is_none());
    }

    #[test]
    fn test_missing_iwad_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let pwad = dir.path().join("patch.wad");
        write_wad(&pwad, b"PWAD", &[("A", b"a")]);

        let mut store = ContentStore::new();
        assert!(store.init(&[pwad.to_str().unwrap()]).is_err());
    }
}
