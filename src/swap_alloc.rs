/// Free-list allocator for swap slots. Freed slots are reused before the
/// high-water mark is extended, so the swap file only grows when every
/// previously used slot is still occupied.
pub struct SwapAllocator {
    free_slots: Vec<usize>,
    next_slot: usize,
}

impl SwapAllocator {
    pub fn init() -> Self {
        Self {
            free_slots: Vec::new(),
            next_slot: 0,
        }
    }

    pub fn allocate(&mut self) -> usize {
        match self.free_slots.pop() {
            Some(slot) => slot,
            None => {
                let slot = self.next_slot;
                self.next_slot += 1;
                slot
            }
        }
    }

    pub fn release(&mut self, slot: usize) {
        debug_assert!(slot < self.next_slot, "slot {} was never allocated", slot);
        debug_assert!(!self.free_slots.contains(&slot), "slot {} freed twice", slot);
        self.free_slots.push(slot);
    }

    /// Slots handed out and not yet released.
    pub fn outstanding(&self) -> usize {
        self.next_slot - self.free_slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extends_high_water_mark() {
        let mut alloc = SwapAllocator::init();
        assert_eq!(alloc.allocate(), 0);
        assert_eq!(alloc.allocate(), 1);
        assert_eq!(alloc.allocate(), 2);
        assert_eq!(alloc.outstanding(), 3);
    }

    #[test]
    fn reuses_released_slots_first() {
        let mut alloc = SwapAllocator::init();
        let a = alloc.allocate();
        let b = alloc.allocate();
        alloc.release(a);
        assert_eq!(alloc.allocate(), a);
        alloc.release(b);
        alloc.release(a);
        // both free again, no extension
        let mut got = vec![alloc.allocate(), alloc.allocate()];
        got.sort();
        assert_eq!(got, vec![0, 1]);
        assert_eq!(alloc.allocate(), 2);
    }

    #[test]
    fn outstanding_tracks_releases() {
        let mut alloc = SwapAllocator::init();
        let a = alloc.allocate();
        let _b = alloc.allocate();
        assert_eq!(alloc.outstanding(), 2);
        alloc.release(a);
        assert_eq!(alloc.outstanding(), 1);
    }
}
