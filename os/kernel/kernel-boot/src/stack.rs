//! # Stack Relocation
//!
//! The bootstrap stack lives in low memory that the identity slot stops
//! mapping after the high-half switch. Before that happens the live part of
//! the stack is copied to the higher-half stack and every saved frame pointer
//! that points into the old region is shifted by the same offset.
//!
//! ```text
//!   old_base            esp             old_top
//!      │                 │ live frames ───┤
//!      ▼                 ▼                ▼
//!      ┌─────────────────┬────────────────┐
//!      │     unused      │ ebp → ebp → ...│   bootstrap stack
//!      └─────────────────┴────────────────┘
//!                        │   + offset     │
//!                        ▼                ▼
//!            ┌───────────┬────────────────┐
//!            │  unused   │ ebp'→ ebp'→ ...│   high-half stack
//!            └───────────┴────────────────┘
//!                                       new_top
//! ```
//!
//! Only the live ESP/EBP matter for execution; a missed link only breaks
//! backtraces.

use kernel_info::KernelImage;
use kernel_info::memory::{BOOTSTRAP_STACK_BASE, BOOTSTRAP_STACK_TOP};
use kernel_memory_addresses::VirtualAddress;

/// Old and new stack bounds, plus the offset between them.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct StackRelocation {
    old_base: u32,
    old_top: u32,
    new_top: u32,
}

impl StackRelocation {
    #[must_use]
    pub const fn new(
        old_base: VirtualAddress,
        old_top: VirtualAddress,
        new_top: VirtualAddress,
    ) -> Self {
        Self {
            old_base: old_base.as_u32(),
            old_top: old_top.as_u32(),
            new_top: new_top.as_u32(),
        }
    }

    /// From the bootstrap stack to the stack above the kernel image.
    #[must_use]
    pub const fn for_image(image: &KernelImage) -> Self {
        Self::new(
            VirtualAddress::new(BOOTSTRAP_STACK_BASE),
            VirtualAddress::new(BOOTSTRAP_STACK_TOP),
            image.high_half_stack_top(),
        )
    }

    /// Added to every address inside the old stack (wrapping).
    #[must_use]
    pub const fn offset(&self) -> u32 {
        self.new_top.wrapping_sub(self.old_top)
    }

    #[must_use]
    pub const fn contains(&self, addr: u32) -> bool {
        addr >= self.old_base && addr < self.old_top
    }

    /// `addr` moved to the new stack if it points into the old one.
    #[must_use]
    pub const fn relocate(&self, addr: u32) -> u32 {
        if self.contains(addr) {
            addr.wrapping_add(self.offset())
        } else {
            addr
        }
    }

    /// Bytes in use above `esp`.
    #[must_use]
    pub const fn live_len(&self, esp: u32) -> u32 {
        self.old_top - esp
    }

    /// Rewrite the saved-EBP chain starting at `ebp`.
    ///
    /// `stack` holds the old region `[old_base, old_top)` as words. The walk
    /// stops at the first frame pointer outside the old region and never
    /// revisits a frame, so a corrupt chain terminates. Returns the number
    /// of links rewritten.
    pub fn rewrite_frame_chain(&self, stack: &mut [u32], mut ebp: u32) -> usize {
        let mut rewritten = 0;
        while self.contains(ebp) && ebp.is_multiple_of(4) {
            let slot = ((ebp - self.old_base) / 4) as usize;
            let Some(word) = stack.get_mut(slot) else {
                break;
            };
            let saved = *word;
            if !self.contains(saved) || saved <= ebp {
                break;
            }
            *word = saved.wrapping_add(self.offset());
            rewritten += 1;
            ebp = saved;
        }
        rewritten
    }

    /// Rewrite the chain, then copy the live words from `old` into `new`.
    ///
    /// `new` covers `[new_top - (old_top - old_base), new_top)`, the same
    /// size as `old`. Returns the relocated `(esp, ebp)`.
    ///
    /// # Panics
    /// If the slices do not match the bounds or `esp` is outside the old stack.
    pub fn relocate_into(
        &self,
        old: &mut [u32],
        new: &mut [u32],
        esp: u32,
        ebp: u32,
    ) -> (u32, u32) {
        assert!(self.contains(esp), "esp {esp:#x} outside the old stack");
        assert_eq!(old.len(), new.len());
        assert_eq!(old.len() * 4, (self.old_top - self.old_base) as usize);

        self.rewrite_frame_chain(old, ebp);
        let from = ((esp - self.old_base) / 4) as usize;
        new[from..].copy_from_slice(&old[from..]);
        (self.relocate(esp), self.relocate(ebp))
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use self::cpu::relocate_stack;

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod cpu {
    /// Move the running stack by `offset` and return on the new one.
    ///
    /// Walks the EBP chain from the caller's frame, shifting every saved EBP
    /// inside `[old_base, old_top)`, copies `[esp, old_top)` to
    /// `esp + offset` and adds `offset` to ESP and (if inside) EBP.
    ///
    /// # Safety
    /// Interrupts must be off. The destination must be mapped, writable and
    /// not overlap the source. No pointer into the old stack other than saved
    /// frame pointers may be used after the call.
    #[unsafe(naked)]
    pub unsafe extern "C" fn relocate_stack(_old_base: u32, _old_top: u32, _offset: u32) {
        core::arch::naked_asm!(
            "push ebx",
            "push esi",
            "push edi",
            "mov ecx, [esp + 16]", // old_base
            "mov edx, [esp + 20]", // old_top
            "mov ebx, [esp + 24]", // offset
            // walk the frame chain
            "mov eax, ebp",
            "2:",
            "cmp eax, ecx",
            "jb 4f",
            "cmp eax, edx",
            "jae 4f",
            "mov esi, [eax]",
            "cmp esi, eax",
            "jbe 4f",
            "cmp esi, edx",
            "jae 4f",
            "lea edi, [esi + ebx]",
            "mov [eax], edi",
            "mov eax, esi",
            "jmp 2b",
            // copy the live words
            "4:",
            "mov esi, esp",
            "lea edi, [esp + ebx]",
            "mov ecx, edx",
            "sub ecx, esp",
            "shr ecx, 2",
            "cld",
            "rep movsd",
            // live frame pointer
            "cmp ebp, [esp + 16]",
            "jb 5f",
            "cmp ebp, edx",
            "jae 5f",
            "add ebp, ebx",
            "5:",
            "add esp, ebx",
            "pop edi",
            "pop esi",
            "pop ebx",
            "ret",
        );
    }
}
