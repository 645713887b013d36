// Kernel loader for UEFI

#![cfg_attr(target_os = "uefi", no_std)]
#![cfg_attr(target_os = "uefi", no_main)]

#[cfg(target_os = "uefi")]
mod efi {
    use boot_efi::{config::*, invocation::*, mmap::*};
    use bootprot::*;
    use core::{mem::size_of, ptr, slice};
    use elfldr::{pages_for, ElfLoader, ImageClass, LoadedImage};
    use lib_efi::*;
    use log::{error, info, warn};
    use uefi::{
        prelude::*,
        table::boot::{AllocateType, MemoryType},
    };

    /// Extra descriptors on top of the current map size, for the entries
    /// our own allocations add before the map is taken for good.
    const MMAP_SLACK: usize = 8;

    struct Handoff {
        info: &'static mut BootInfo,
        mmap: &'static mut [BootMemoryMapDescriptor],
        invocation: Invocation,
    }

    #[entry]
    fn efi_main(handle: Handle, mut st: SystemTable<Boot>) -> Status {
        if let Err(err) = uefi::helpers::init(&mut st) {
            return err.status();
        }
        log::set_max_level(log::LevelFilter::Info);

        let mut pause_on_error = BootSettings::default().pause_on_error();
        let Handoff {
            info,
            mmap,
            invocation,
        } = match prepare(handle, &st, &mut pause_on_error) {
            Ok(handoff) => handoff,
            Err(status) => {
                if pause_on_error {
                    wait_for_key(&mut st);
                }
                return status;
            }
        };

        // -----------------------------------------------------------------------
        // Exit Boot Services
        //

        #[allow(unused_unsafe)]
        let (_rt, mut mm) = unsafe { st.exit_boot_services(MemoryType::LOADER_DATA) };

        // ------------------------------------------------------------------------

        mm.sort();
        let mut writer = MemoryMapWriter::new(mmap);
        for desc in mm.entries() {
            writer.push(
                desc.phys_start,
                desc.page_count,
                desc.ty.as_boot_memory_type(),
            );
        }
        writer.finish_into(info);

        unsafe { invocation.invoke_kernel(info) }
    }

    /// Keeps a fatal error on screen until a key is pressed.
    fn wait_for_key(st: &mut SystemTable<Boot>) {
        info!("Press any key to reboot...");
        if st.stdin().reset(false).is_err() {
            return;
        }
        let Some(event) = st.stdin().wait_for_key_event() else {
            return;
        };
        let mut events = [event];
        if st.boot_services().wait_for_event(&mut events).is_ok() {
            let _ = st.stdin().read_key();
        }
    }

    /// Everything that still needs boot services.
    fn prepare(
        handle: Handle,
        st: &SystemTable<Boot>,
        pause_on_error: &mut bool,
    ) -> Result<Handoff, Status> {
        let bs = st.boot_services();

        if let Err(err) = bs.set_watchdog_timer(0, 0x10000, None) {
            warn!("Cannot disable watchdog timer: {:?}", err.status());
        }

        let mut volume = UefiVolume::boot_volume(bs, handle).map_err(|err| {
            error!("Cannot open boot volume: {:?}", err.status());
            err.status()
        })?;

        // Load CONFIG
        let blob = volume
            .read_file(BootSettings::DEFAULT_CONFIG_PATH)
            .map_err(|err| {
                error!("Load failed {}: {}", BootSettings::DEFAULT_CONFIG_PATH, err);
                err.status()
            })?;
        let config = match blob.as_deref() {
            Some(blob) => core::str::from_utf8(blob)
                .ok()
                .and_then(|json| BootSettings::load(json).ok())
                .ok_or_else(|| {
                    error!("Error in config {}", BootSettings::DEFAULT_CONFIG_PATH);
                    Status::LOAD_ERROR
                })?,
            None => BootSettings::default(),
        };
        log::set_max_level(config.log_level());
        *pause_on_error = config.pause_on_error();

        // Load KERNEL
        let mut memory = UefiMemory::new(bs);
        let kernel = ElfLoader::new(&mut memory)
            .dump_headers(config.dump_headers())
            .load(&mut volume, config.kernel_path())
            .map_err(|err| {
                error!("Load failed {}: {}", config.kernel_path(), err);
                err.status()
            })?;
        drop(volume);

        let invocation = Invocation::new(kernel.entry).ok_or_else(|| {
            error!("Kernel image has no entry point");
            Status::LOAD_ERROR
        })?;

        let info = alloc_boot_info(bs)?;
        fill_boot_info(info, &kernel, &config);

        let mmap = alloc_memory_map(bs)?;

        info!("Starting kernel at {:#x}", invocation.entry());
        Ok(Handoff {
            info,
            mmap,
            invocation,
        })
    }

    fn fill_boot_info(info: &mut BootInfo, kernel: &LoadedImage, config: &BootSettings) {
        info.kernel_entry = kernel.entry;
        info.kernel_base = kernel.image_base;
        info.kernel_end = kernel.image_end;
        info.set_cmdline(config.cmdline());
        if config.is_debug_mode() {
            info.flags.insert(BootFlags::DEBUG_MODE);
        }
        if kernel.class == ImageClass::Class32 {
            info.flags.insert(BootFlags::KERNEL_32BIT);
        }
    }

    /// Pages that survive exit from boot services.
    fn alloc_pages(bs: &BootServices, size: usize) -> Result<*mut u8, Status> {
        let pages = pages_for(size as u64) as usize;
        bs.allocate_pages(AllocateType::AnyPages, MemoryType::LOADER_DATA, pages)
            .map(|base| base as usize as *mut u8)
            .map_err(|err| {
                error!("Cannot allocate {} pages: {:?}", pages, err.status());
                err.status()
            })
    }

    fn alloc_boot_info(bs: &BootServices) -> Result<&'static mut BootInfo, Status> {
        let ptr = alloc_pages(bs, size_of::<BootInfo>())? as *mut BootInfo;
        unsafe {
            ptr.write(BootInfo::default());
            Ok(&mut *ptr)
        }
    }

    fn alloc_memory_map(
        bs: &BootServices,
    ) -> Result<&'static mut [BootMemoryMapDescriptor], Status> {
        let size = bs.memory_map_size();
        let len = size.map_size / size.entry_size.max(1) + MMAP_SLACK;
        let ptr = alloc_pages(bs, len * BootMemoryMapDescriptor::SIZE)?
            as *mut BootMemoryMapDescriptor;
        let empty = BootMemoryMapDescriptor {
            base: 0,
            page_count: 0,
            mem_type: BootMemoryType::Reserved,
        };
        unsafe {
            for i in 0..len {
                ptr::write(ptr.add(i), empty);
            }
            Ok(slice::from_raw_parts_mut(ptr, len))
        }
    }
}

#[cfg(not(target_os = "uefi"))]
fn main() {}
