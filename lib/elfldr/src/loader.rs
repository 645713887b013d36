// Minimal ELF Kernel Loader

use crate::{error::*, header::*, ident::*, io::*, segment::*};
use alloc::vec::Vec;
use log::{debug, error, info};

/// Address execution starts at once the image is in place.
pub type EntryPoint = u64;

/// The `PT_LOAD` entries of a program header table, in table order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPlan {
    segments: Vec<Segment>,
}

impl LoadPlan {
    /// Collects and validates every loadable segment of `table`.
    ///
    /// An empty table and a table without loadable entries are different
    /// failures.
    pub fn new(table: &ProgramHeaderTable) -> Result<Self> {
        if table.is_empty() {
            error!("No program segments to load in kernel image");
            return Err(InvalidParameter::NoProgramHeaders.into());
        }

        let segments = table
            .iter()
            .enumerate()
            .filter(|(_, ph)| ph.is_load())
            .map(|(index, ph)| Segment::from_header(index, &ph))
            .collect::<Result<Vec<_>>>()?;

        if segments.is_empty() {
            error!("No loadable program segments found in kernel image");
            return Err(LoadError::NoLoadableSegments);
        }

        Ok(Self { segments })
    }

    #[inline]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Loads the planned segments one after another.
    pub fn load_into<F, M>(&self, file: &mut F, memory: &mut M) -> Result<usize>
    where
        F: ImageFile,
        M: PhysicalMemory,
    {
        for segment in &self.segments {
            load_segment(file, memory, segment)?;
            info!(
                "Segment {}: {:#x} bytes at {:#x} ({:#x} from file)",
                segment.index, segment.memory_size, segment.address, segment.file_size
            );
        }
        Ok(self.segments.len())
    }

    /// Lowest start and highest end address over all segments.
    pub fn span(&self) -> (u64, u64) {
        self.segments
            .iter()
            .fold((u64::MAX, 0), |(lo, hi), segment| {
                (lo.min(segment.address), hi.max(segment.end()))
            })
    }
}

/// Places every loadable segment of `table`, strictly in table order, and
/// returns how many were loaded. Stops at the first failing segment.
pub fn load_segments<F, M>(
    file: &mut F,
    memory: &mut M,
    table: &ProgramHeaderTable,
) -> Result<usize>
where
    F: ImageFile,
    M: PhysicalMemory,
{
    let plan = LoadPlan::new(table)?;
    debug!("Loading {} of {} segments", plan.len(), table.len());
    plan.load_into(file, memory)
}

/// What a successful load leaves behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedImage {
    pub entry: EntryPoint,
    pub class: ImageClass,
    pub segments: usize,
    pub image_base: u64,
    pub image_end: u64,
}

/// Loads a kernel image from a volume into fixed physical memory.
pub struct ElfLoader<'a, M: PhysicalMemory> {
    memory: &'a mut M,
    dump_headers: bool,
}

impl<'a, M: PhysicalMemory> ElfLoader<'a, M> {
    #[inline]
    pub fn new(memory: &'a mut M) -> Self {
        Self {
            memory,
            dump_headers: false,
        }
    }

    /// Logs the file header and every program header before loading.
    #[inline]
    pub fn dump_headers(mut self, value: bool) -> Self {
        self.dump_headers = value;
        self
    }

    /// Opens `path` on `root`, validates it and places its segments.
    ///
    /// Every buffer taken along the way is owned by this call and released
    /// on return, whether it succeeds or not.
    pub fn load<V: ImageVolume>(&mut self, root: &mut V, path: &str) -> Result<LoadedImage> {
        debug!("Reading kernel image file {}", path);
        let mut file = root.open(path).map_err(|err| {
            error!("Error opening kernel file {}: {}", path, err);
            err
        })?;

        let identity = read_identity(&mut file)?;
        let class = validate_identity(&identity)?;
        drop(identity);
        debug!("ELF header is valid");

        let (header, table) = read_headers(&mut file, class)?;
        if self.dump_headers {
            crate::info::dump_headers(&header, &table);
        }

        let entry = header.entry;
        let plan = LoadPlan::new(&table)?;
        let segments = plan.load_into(&mut file, &mut *self.memory)?;
        let (image_base, image_end) = plan.span();

        debug!("Closing kernel binary");
        file.close().map_err(|err| {
            error!("Error closing kernel image: {}", err);
            err
        })?;
        drop(table);

        info!("Kernel entry point: {:#x}", entry);
        Ok(LoadedImage {
            entry,
            class,
            segments,
            image_base,
            image_end,
        })
    }
}

/// Loads the kernel at `path` and returns its entry point.
pub fn load_kernel_image<V, M>(root: &mut V, memory: &mut M, path: &str) -> Result<EntryPoint>
where
    V: ImageVolume,
    M: PhysicalMemory,
{
    ElfLoader::new(memory)
        .load(root, path)
        .map(|image| image.entry)
}
