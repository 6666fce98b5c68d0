/// Where the contents of a virtual page currently live.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Residency {
    /// Backed by a physical frame right now.
    Resident { frame: usize },
    /// Evicted while dirty; the contents live in this swap slot.
    SwappedOut { slot: usize },
    /// No frame and no swap slot. Contents are reproducible from the
    /// executable image, or are zero-fill.
    Unmapped,
}

/// One mapping record for one virtual page of one process.
#[derive(Debug, Clone, Copy)]
pub struct TranslationEntry {
    pub vpn: usize,
    pub residency: Residency,
    pub read_only: bool,
    /// Referenced since the last clock sweep.
    pub used: bool,
    /// Written since loaded. A `SwappedOut` entry always has this set.
    pub dirty: bool,
}

impl TranslationEntry {
    fn new(vpn: usize) -> Self {
        Self {
            vpn,
            residency: Residency::Unmapped,
            read_only: false,
            used: false,
            dirty: false,
        }
    }

    pub fn is_resident(&self) -> bool {
        matches!(self.residency, Residency::Resident { .. })
    }

    pub fn frame(&self) -> Option<usize> {
        match self.residency {
            Residency::Resident { frame } => Some(frame),
            _ => None,
        }
    }
}

/// Per-process page table: a dense entry array indexed by virtual page
/// number, sized to the process's full address space at load time.
pub struct PageTable {
    entries: Vec<TranslationEntry>,
}

impl PageTable {
    pub fn init(num_pages: usize) -> Self {
        Self {
            entries: (0..num_pages).map(TranslationEntry::new).collect(),
        }
    }

    pub fn num_pages(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, vpn: usize) -> Option<&TranslationEntry> {
        self.entries.get(vpn)
    }

    pub fn entry_mut(&mut self, vpn: usize) -> Option<&mut TranslationEntry> {
        self.entries.get_mut(vpn)
    }

    pub fn frame_of(&self, vpn: usize) -> Option<usize> {
        self.entry(vpn).and_then(|e| e.frame())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TranslationEntry> {
        self.entries.iter()
    }
}
