use memory::{MemoryError, PhysicalMemory, PAGE_SIZE};

/// Metadata of one loadable section of an executable image.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub first_vpn: usize,
    pub page_count: usize,
    pub read_only: bool,
}

impl Section {
    pub fn contains(&self, vpn: usize) -> bool {
        vpn >= self.first_vpn && vpn < self.first_vpn + self.page_count
    }
}

/// The executable-image loader, seen through the interface the paging core
/// needs: section metadata plus the ability to materialize one page of a
/// section into a physical frame.
pub trait Executable: Send + Sync {
    fn section_count(&self) -> usize;

    fn section(&self, s: usize) -> &Section;

    /// Copy page `page_in_section` of section `s` into `frame`.
    fn load_page(
        &self,
        s: usize,
        page_in_section: usize,
        memory: &PhysicalMemory,
        frame: usize,
    ) -> Result<(), MemoryError>;

    /// Total pages covered by the image's sections.
    fn page_count(&self) -> usize {
        (0..self.section_count())
            .map(|s| {
                let section = self.section(s);
                section.first_vpn + section.page_count
            })
            .max()
            .unwrap_or(0)
    }

    /// Section containing `vpn`, if any, as (section index, page within
    /// section).
    fn locate(&self, vpn: usize) -> Option<(usize, usize)> {
        for s in 0..self.section_count() {
            let section = self.section(s);
            if section.contains(vpn) {
                return Some((s, vpn - section.first_vpn));
            }
        }
        None
    }
}

/// An executable image held entirely in memory. Section contents are padded
/// to a whole number of pages at construction.
pub struct RawImage {
    sections: Vec<(Section, Vec<u8>)>,
}

impl RawImage {
    pub fn new() -> Self {
        Self {
            sections: Vec::new(),
        }
    }

    /// Append a section starting right after the previous one.
    pub fn with_section(mut self, name: &str, read_only: bool, mut data: Vec<u8>) -> Self {
        let first_vpn = Executable::page_count(&self);
        let page_count = data.len().div_ceil(PAGE_SIZE).max(1);
        data.resize(page_count * PAGE_SIZE, 0);
        self.sections.push((
            Section {
                name: String::from(name),
                first_vpn,
                page_count,
                read_only,
            },
            data,
        ));
        self
    }

    /// The original bytes of one page of a section, for comparison in tests
    /// and by loaders layered above.
    pub fn page_bytes(&self, s: usize, page_in_section: usize) -> &[u8] {
        let (_, data) = &self.sections[s];
        &data[page_in_section * PAGE_SIZE..(page_in_section + 1) * PAGE_SIZE]
    }
}

impl Default for RawImage {
    fn default() -> Self {
        Self::new()
    }
}

impl Executable for RawImage {
    fn section_count(&self) -> usize {
        self.sections.len()
    }

    fn section(&self, s: usize) -> &Section {
        &self.sections[s].0
    }

    fn load_page(
        &self,
        s: usize,
        page_in_section: usize,
        memory: &PhysicalMemory,
        frame: usize,
    ) -> Result<(), MemoryError> {
        memory.write_page(frame, self.page_bytes(s, page_in_section))
    }
}
