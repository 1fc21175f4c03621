//! UDP register access.
//!
//! The CSR registers are shared between the CPU and the USB engine across a
//! clock boundary, so a write is not immediately visible on read-back and a
//! careless read-modify-write can drop a pending event flag. All CSR traffic
//! therefore goes through [`UdpRegs::csr_set`] and [`UdpRegs::csr_clear`],
//! which apply the write-one-no-effect rule for the event flags and wait for
//! the hardware to report the change (AT91SAM7S datasheet 34.6.10).
//!
//! [`Mmio`] implements the trait on the real peripheral; the test mock
//! implements it over plain memory with the same per-bit write rules.

use vcell::VolatileCell;

/// UDP peripheral base address on the AT91SAM7S256.
pub const UDP_BASE: usize = 0xFFFB_0000;

/// Endpoints implemented by the UDP. Only 0 (control), 1 (bulk IN) and
/// 2 (bulk OUT) are used.
pub const NUM_ENDPOINTS: usize = 4;

/// Bits of the interrupt status/enable/disable/clear registers.
pub mod irq {
    pub const EP0INT: u32 = 1 << 0;
    pub const EP1INT: u32 = 1 << 1;
    pub const EP2INT: u32 = 1 << 2;
    pub const EP3INT: u32 = 1 << 3;
    pub const RXSUSP: u32 = 1 << 8;
    pub const RXRSM: u32 = 1 << 9;
    pub const EXTRSM: u32 = 1 << 10;
    pub const SOFINT: u32 = 1 << 11;
    pub const ENDBUSRES: u32 = 1 << 12;
    pub const WAKEUP: u32 = 1 << 13;
}

/// Bits of the per-endpoint control and status registers.
pub mod csr {
    pub const TXCOMP: u32 = 1 << 0;
    pub const RX_DATA_BK0: u32 = 1 << 1;
    pub const RXSETUP: u32 = 1 << 2;
    /// Reads as STALLSENT on control and bulk endpoints, ISOERROR on
    /// isochronous ones. Same bit either way.
    pub const STALLSENT: u32 = 1 << 3;
    pub const TXPKTRDY: u32 = 1 << 4;
    pub const FORCESTALL: u32 = 1 << 5;
    pub const RX_DATA_BK1: u32 = 1 << 6;
    pub const DIR: u32 = 1 << 7;
    pub const EPTYPE_CTRL: u32 = 0x0 << 8;
    pub const EPTYPE_BULK_OUT: u32 = 0x2 << 8;
    pub const EPTYPE_BULK_IN: u32 = 0x6 << 8;
    pub const EPEDS: u32 = 1 << 15;
    pub const RXBYTECNT: u32 = 0x7FF << 16;

    /// Event flags cleared by writing zero and unaffected by writing one.
    /// Every CSR write must hold them at one or a pending event is silently
    /// acknowledged.
    pub const WRITE_ONE_NO_EFFECT: u32 =
        TXCOMP | RX_DATA_BK0 | RXSETUP | STALLSENT | RX_DATA_BK1;

    /// Bytes waiting in the endpoint FIFO.
    pub fn byte_count(value: u32) -> usize {
        ((value & RXBYTECNT) >> 16) as usize
    }
}

/// Bits of the global state register.
pub mod glb_stat {
    pub const FADDEN: u32 = 1 << 0;
    pub const CONFG: u32 = 1 << 1;
}

/// Bits of the function address register.
pub mod faddr {
    pub const FEN: u32 = 1 << 8;
}

/// Register-level access to the UDP.
///
/// `set_csr` is the raw write used by the bus-reset path to program endpoint
/// modes after RSTEP wiped them; everything else must go through `csr_set`
/// and `csr_clear`.
pub trait UdpRegs {
    /// Current frame number, handy as a timestamp in log messages.
    fn frm_num(&self) -> u32;
    fn set_glb_stat(&self, value: u32);
    fn set_faddr(&self, value: u32);
    /// Enable the interrupts in `mask`.
    fn ier(&self, mask: u32);
    /// Disable the interrupts in `mask`.
    fn idr(&self, mask: u32);
    fn isr(&self) -> u32;
    /// Acknowledge the interrupts in `mask`.
    fn icr(&self, mask: u32);
    fn rst_ep(&self, value: u32);
    fn csr(&self, ep: usize) -> u32;
    fn set_csr(&self, ep: usize, value: u32);
    fn fdr_read(&self, ep: usize) -> u8;
    fn fdr_write(&self, ep: usize, byte: u8);

    /// OR `mask` into CSR and wait until every bit of `mask` reads back set.
    fn csr_set(&self, ep: usize, mask: u32) {
        self.set_csr(ep, self.csr(ep) | csr::WRITE_ONE_NO_EFFECT | mask);
        // Wait for synchronization (34.6.10).
        while self.csr(ep) & mask != mask {}
    }

    /// Clear `mask` in CSR, leaving the other event flags untouched, and wait
    /// until every bit of `mask` reads back clear.
    fn csr_clear(&self, ep: usize, mask: u32) {
        self.set_csr(ep, (self.csr(ep) | csr::WRITE_ONE_NO_EFFECT) & !mask);
        // Wait for synchronization (34.6.10).
        while self.csr(ep) & mask != 0 {}
    }
}

#[repr(C)]
#[allow(dead_code)]
struct RegisterBlock {
    frm_num: VolatileCell<u32>,                  // 0x00
    glb_stat: VolatileCell<u32>,                 // 0x04
    faddr: VolatileCell<u32>,                    // 0x08
    _reserved0: [u32; 1],
    ier: VolatileCell<u32>,                      // 0x10
    idr: VolatileCell<u32>,                      // 0x14
    imr: VolatileCell<u32>,                      // 0x18
    isr: VolatileCell<u32>,                      // 0x1C
    icr: VolatileCell<u32>,                      // 0x20
    _reserved1: [u32; 1],
    rst_ep: VolatileCell<u32>,                   // 0x28
    _reserved2: [u32; 1],
    csr: [VolatileCell<u32>; NUM_ENDPOINTS],     // 0x30
    _reserved3: [u32; 4],
    fdr: [VolatileCell<u32>; NUM_ENDPOINTS],     // 0x50
    _reserved4: [u32; 5],
    txvc: VolatileCell<u32>,                     // 0x74
}

/// The memory-mapped UDP instance.
pub struct Mmio(());

impl Mmio {
    /// Conjure the register handle.
    ///
    /// # Safety
    ///
    /// There must be at most one live handle, and the UDP peripheral clock
    /// must be running before any register is touched.
    pub unsafe fn steal() -> Self {
        Mmio(())
    }

    fn rb(&self) -> &RegisterBlock {
        unsafe { &*(UDP_BASE as *const RegisterBlock) }
    }
}

impl UdpRegs for Mmio {
    fn frm_num(&self) -> u32 {
        self.rb().frm_num.get() & 0x7FF
    }

    fn set_glb_stat(&self, value: u32) {
        self.rb().glb_stat.set(value);
    }

    fn set_faddr(&self, value: u32) {
        self.rb().faddr.set(value);
    }

    fn ier(&self, mask: u32) {
        self.rb().ier.set(mask);
    }

    fn idr(&self, mask: u32) {
        self.rb().idr.set(mask);
    }

    fn isr(&self) -> u32 {
        self.rb().isr.get()
    }

    fn icr(&self, mask: u32) {
        self.rb().icr.set(mask);
    }

    fn rst_ep(&self, value: u32) {
        self.rb().rst_ep.set(value);
    }

    fn csr(&self, ep: usize) -> u32 {
        self.rb().csr[ep].get()
    }

    fn set_csr(&self, ep: usize, value: u32) {
        self.rb().csr[ep].set(value);
    }

    fn fdr_read(&self, ep: usize) -> u8 {
        self.rb().fdr[ep].get() as u8
    }

    fn fdr_write(&self, ep: usize, byte: u8) {
        self.rb().fdr[ep].set(u32::from(byte));
    }
}

#[cfg(test)]
mod tests {
    use super::super::mock::MockUdp;
    use super::{csr, UdpRegs};

    #[test]
    fn csr_set_reads_back() {
        let regs = MockUdp::new();
        regs.csr_set(0, csr::DIR);
        assert_ne!(regs.csr(0) & csr::DIR, 0);
    }

    #[test]
    fn csr_set_preserves_pending_flags() {
        let regs = MockUdp::new();
        regs.set_csr_raw(0, csr::RXSETUP | csr::EPEDS);
        regs.csr_set(0, csr::DIR);
        // The pending SETUP flag must survive the unrelated write.
        assert_ne!(regs.csr(0) & csr::RXSETUP, 0);
        assert_ne!(regs.csr(0) & csr::EPEDS, 0);
    }

    #[test]
    fn csr_clear_targets_only_the_mask() {
        let regs = MockUdp::new();
        regs.set_csr_raw(0, csr::RXSETUP | csr::TXCOMP | csr::EPEDS);
        regs.csr_clear(0, csr::RXSETUP);
        assert_eq!(regs.csr(0) & csr::RXSETUP, 0);
        assert_ne!(regs.csr(0) & csr::TXCOMP, 0);
        assert_ne!(regs.csr(0) & csr::EPEDS, 0);
    }

    #[test]
    fn byte_count_extraction() {
        assert_eq!(csr::byte_count(0x0040_0000), 64);
        assert_eq!(csr::byte_count(0x0000_FFFF), 0);
    }
}
