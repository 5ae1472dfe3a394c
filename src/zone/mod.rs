//! Tagged memory zone.
//!
//! Every allocation carries a purge tag; `purge(level)` frees all blocks
//! at or above that level. A block may be registered with a *user slot*:
//! a shared cell the zone nulls out when the block goes away, so caches
//! holding block handles never observe a stale one. This replaces the
//! classic user back-pointer trick with something the borrow checker can
//! live with.

use std::sync::Arc;

use parking_lot::Mutex;

/// Purge level, ordered from most to least persistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PurgeTag {
    /// Never purged; lives for the whole session.
    Static,
    /// Freed when the current map is unloaded.
    Map,
    /// Freed at level transitions and on archive removal.
    Level,
    /// Freed whenever memory is reclaimed.
    Cache,
}

/// Generation-tagged handle to a zone block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockId {
    index: u32,
    generation: u32,
}

/// Shared cell a cache stores instead of a raw pointer. The zone writes
/// `None` through it when the referenced block is freed.
pub type UserSlot = Arc<Mutex<Option<BlockId>>>;

/// Create an empty user slot.
pub fn new_user_slot() -> UserSlot {
    Arc::new(Mutex::new(None))
}

struct Block {
    data: Vec<u8>,
    tag: PurgeTag,
    user: Option<UserSlot>,
}

/// The process-wide tagged heap. All simulation components allocate from
/// one of these; it is owned by the session and only touched from the sim
/// thread.
pub struct Zone {
    slots: Vec<Option<Block>>,
    generations: Vec<u32>,
    free: Vec<u32>,
    bytes_in_use: usize,
}

impl Zone {
    pub fn new() -> Zone {
        Zone {
            slots: Vec::new(),
            generations: Vec::new(),
            free: Vec::new(),
            bytes_in_use: 0,
        }
    }

    /// Allocate a zero-filled block. If `user` is given, the slot is
    /// pointed at the new block and will be nulled when it is freed.
    ///
    /// Allocation failure aborts the process; there is no meaningful
    /// recovery from heap exhaustion mid-tick.
    pub fn alloc(&mut self, size: usize, tag: PurgeTag, user: Option<UserSlot>) -> BlockId {
        let block = Block {
            data: vec![0u8; size],
            tag,
            user: user.clone(),
        };
        self.bytes_in_use += size;

        let id = match self.free.pop() {
            Some(index) => {
                let slot = index as usize;
                self.generations[slot] = self.generations[slot].wrapping_add(1);
                self.slots[slot] = Some(block);
                BlockId {
                    index,
                    generation: self.generations[slot],
                }
            }
            None => {
                self.slots.push(Some(block));
                self.generations.push(0);
                BlockId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };

        if let Some(slot) = user {
            *slot.lock() = Some(id);
        }
        id
    }

    fn live(&self, id: BlockId) -> bool {
        (id.index as usize) < self.slots.len()
            && self.generations[id.index as usize] == id.generation
            && self.slots[id.index as usize].is_some()
    }

    /// Free a block. The registered user slot, if any, is invalidated.
    pub fn free(&mut self, id: BlockId) {
        if !self.live(id) {
            return;
        }
        let block = self.slots[id.index as usize].take().expect("checked live");
        self.bytes_in_use -= block.data.len();
        if let Some(user) = block.user {
            *user.lock() = None;
        }
        self.free.push(id.index);
    }

    /// Reassign a block's purge level.
    ///
    /// Like the classic zone, a block may not be made purgeable while it
    /// has no registered user: nothing would ever learn that it was
    /// reclaimed.
    pub fn change_tag(&mut self, id: BlockId, tag: PurgeTag) {
        if let Some(block) = self.block_mut(id) {
            if tag >= PurgeTag::Cache && block.user.is_none() {
                log::error!("[Zone::change_tag] Purgeable block without a user");
                return;
            }
            block.tag = tag;
        }
    }

    /// Replace the user slot registration of a block. The old slot (if
    /// different) is cleared, the new one is pointed at the block.
    pub fn change_user(&mut self, id: BlockId, user: Option<UserSlot>) {
        if !self.live(id) {
            return;
        }
        let block = self.slots[id.index as usize].as_mut().expect("checked live");
        if let Some(old) = block.user.take() {
            *old.lock() = None;
        }
        if let Some(slot) = &user {
            *slot.lock() = Some(id);
        }
        block.user = user;
    }

    /// Free all blocks with `tag >= level`.
    pub fn purge(&mut self, level: PurgeTag) {
        let ids: Vec<BlockId> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                let block = slot.as_ref()?;
                (block.tag >= level).then(|| BlockId {
                    index: i as u32,
                    generation: self.generations[i],
                })
            })
            .collect();
        let count = ids.len();
        for id in ids {
            self.free(id);
        }
        if count > 0 {
            log::debug!("[Zone::purge] Freed {} blocks at level {:?}+", count, level);
        }
    }

    fn block(&self, id: BlockId) -> Option<&Block> {
        if self.live(id) {
            self.slots[id.index as usize].as_ref()
        } else {
            None
        }
    }

    fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        if self.live(id) {
            self.slots[id.index as usize].as_mut()
        } else {
            None
        }
    }

    pub fn data(&self, id: BlockId) -> Option<&[u8]> {
        self.block(id).map(|b| b.data.as_slice())
    }

    pub fn data_mut(&mut self, id: BlockId) -> Option<&mut [u8]> {
        self.block_mut(id).map(|b| b.data.as_mut_slice())
    }

    pub fn tag_of(&self, id: BlockId) -> Option<PurgeTag> {
        self.block(id).map(|b| b.tag)
    }

    pub fn size_of(&self, id: BlockId) -> Option<usize> {
        self.block(id).map(|b| b.data.len())
    }

    pub fn block_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn bytes_in_use(&self) -> usize {
        self.bytes_in_use
    }
}

impl Default for Zone {
    fn default() -> Self {
        Zone::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_zero_fills() {
        let mut zone = Zone::new();
        let id = zone.alloc(16, PurgeTag::Static, None);
        assert_eq!(zone.data(id).unwrap(), &[0u8; 16]);
    }

    #[test]
    fn test_free_invalidates_user_slot() {
        let mut zone = Zone::new();
        let slot = new_user_slot();
        let id = zone.alloc(8, PurgeTag::Cache, Some(slot.clone()));
        assert_eq!(*slot.lock(), Some(id));

        zone.free(id);
        assert!(slot.lock().is_none());
        assert!(zone.data(id).is_none());
    }

    #[test]
    fn test_purge_respects_levels() {
        let mut zone = Zone::new();
        let stat = zone.alloc(4, PurgeTag::Static, None);
        let map = zone.alloc(4, PurgeTag::Map, None);
        let cache_slot = new_user_slot();
        let cache = zone.alloc(4, PurgeTag::Cache, Some(cache_slot.clone()));

        zone.purge(PurgeTag::Cache);
        assert!(zone.data(stat).is_some());
        assert!(zone.data(map).is_some());
        assert!(zone.data(cache).is_none());
        assert!(cache_slot.lock().is_none());

        zone.purge(PurgeTag::Map);
        assert!(zone.data(stat).is_some());
        assert!(zone.data(map).is_none());
    }

    #[test]
    fn test_stale_handle_does_not_resolve() {
        let mut zone = Zone::new();
        let id = zone.alloc(4, PurgeTag::Static, None);
        zone.free(id);
        let newer = zone.alloc(4, PurgeTag::Static, None);
        // The slot was recycled but the generation moved on.
        assert_ne!(id, newer);
        assert!(zone.data(id).is_none());
        assert!(zone.data(newer).is_some());
    }

    #[test]
    fn test_change_tag_demotion_requires_user() {
        let mut zone = Zone::new();
        let id = zone.alloc(4, PurgeTag::Static, None);
        zone.change_tag(id, PurgeTag::Cache);
        // Rejected: still static.
        assert_eq!(zone.tag_of(id), Some(PurgeTag::Static));

        let slot = new_user_slot();
        zone.change_user(id, Some(slot));
        zone.change_tag(id, PurgeTag::Cache);
        assert_eq!(zone.tag_of(id), Some(PurgeTag::Cache));
    }

    #[test]
    fn test_bytes_accounting() {
        let mut zone = Zone::new();
        let a = zone.alloc(100, PurgeTag::Static, None);
        let _b = zone.alloc(50, PurgeTag::Static, None);
        assert_eq!(zone.bytes_in_use(), 150);
        zone.free(a);
        assert_eq!(zone.bytes_in_use(), 50);
        assert_eq!(zone.block_count(), 1);
    }
}
