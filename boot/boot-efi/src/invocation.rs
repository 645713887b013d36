// Kernel Invocation

use bootprot::BootInfo;

#[cfg(target_arch = "x86_64")]
pub type KernelEntry = extern "sysv64" fn(&BootInfo) -> !;

#[cfg(not(target_arch = "x86_64"))]
pub type KernelEntry = extern "C" fn(&BootInfo) -> !;

pub struct Invocation {
    entry: u64,
}

impl Invocation {
    /// Returns `None` for an image without an entry point.
    #[inline]
    pub const fn new(entry: u64) -> Option<Self> {
        if entry == 0 {
            None
        } else {
            Some(Self { entry })
        }
    }

    #[inline]
    pub const fn entry(&self) -> u64 {
        self.entry
    }

    /// Transfers control to the kernel with `info` as its only argument.
    ///
    /// # Safety
    ///
    /// Boot services must be gone and the kernel image must be in place at
    /// the addresses its program headers name.
    pub unsafe fn invoke_kernel(self, info: &'static BootInfo) -> ! {
        let entry = unsafe { core::mem::transmute::<usize, KernelEntry>(self.entry as usize) };
        entry(info)
    }
}
