//! A UDP stand-in for the unit tests: registers are plain memory, but the
//! CSR flag bits follow the hardware's write rules (write one leaves the
//! flag alone, write zero acknowledges it), RXBYTECNT mirrors the FIFO
//! occupancy, and the endpoint bits of ISR are derived from pending CSR
//! flags the way the controller derives them.
//!
//! IN packets are normally acknowledged by the test calling
//! [`MockUdp::complete_in`] between driver calls. For code paths that spin
//! on TXCOMP inside a single driver call, auto-acknowledge mode completes a
//! packet on the second CSR read after TXPKTRDY was raised, which is the
//! earliest a real host could have acted.

use core::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::vec::Vec;

use super::regs::{csr, irq, UdpRegs, NUM_ENDPOINTS};

const GLOBAL_IRQS: u32 =
    irq::RXSUSP | irq::RXRSM | irq::EXTRSM | irq::SOFINT | irq::ENDBUSRES | irq::WAKEUP;

/// CSR flags that raise the endpoint's interrupt line while set.
const EVENT_FLAGS: u32 =
    csr::TXCOMP | csr::RX_DATA_BK0 | csr::RX_DATA_BK1 | csr::RXSETUP | csr::STALLSENT;

pub struct MockUdp {
    frm_num: Cell<u32>,
    glb_stat: Cell<u32>,
    faddr: Cell<u32>,
    imr: Cell<u32>,
    /// Bus-level interrupt latch; endpoint bits are derived on read.
    pending: Cell<u32>,
    csr: [Cell<u32>; NUM_ENDPOINTS],
    rx_fifo: [RefCell<VecDeque<u8>>; NUM_ENDPOINTS],
    tx_fifo: [RefCell<Vec<u8>>; NUM_ENDPOINTS],
    /// IN packets the pretend host has acknowledged.
    tx_packets: [RefCell<Vec<Vec<u8>>>; NUM_ENDPOINTS],
    tx_events: [Cell<u32>; NUM_ENDPOINTS],
    auto_ack: Cell<bool>,
    txpktrdy_observed: [Cell<bool>; NUM_ENDPOINTS],
}

impl MockUdp {
    pub fn new() -> Self {
        Self {
            frm_num: Cell::new(0),
            glb_stat: Cell::new(0),
            faddr: Cell::new(0),
            imr: Cell::new(0),
            pending: Cell::new(0),
            csr: core::array::from_fn(|_| Cell::new(0)),
            rx_fifo: core::array::from_fn(|_| RefCell::new(VecDeque::new())),
            tx_fifo: core::array::from_fn(|_| RefCell::new(Vec::new())),
            tx_packets: core::array::from_fn(|_| RefCell::new(Vec::new())),
            tx_events: core::array::from_fn(|_| Cell::new(0)),
            auto_ack: Cell::new(false),
            txpktrdy_observed: core::array::from_fn(|_| Cell::new(false)),
        }
    }

    /// Complete IN packets without explicit [`Self::complete_in`] calls.
    pub fn set_auto_ack(&self, enabled: bool) {
        self.auto_ack.set(enabled);
    }

    /// Latch bus-level interrupt bits (ENDBUSRES, RXSUSP, ...).
    pub fn raise(&self, mask: u32) {
        self.pending.set(self.pending.get() | mask);
    }

    /// Deliver a SETUP packet: eight bytes in the control FIFO plus RXSETUP.
    pub fn push_setup(&self, bytes: &[u8; 8]) {
        self.rx_fifo[0].borrow_mut().extend(bytes.iter().copied());
        self.csr[0].set(self.csr[0].get() | csr::RXSETUP);
    }

    /// Queue received bytes in an endpoint FIFO. The matching bank flag is
    /// set by the test, which knows which bank it is pretending to fill.
    pub fn push_rx(&self, ep: usize, bytes: &[u8]) {
        self.rx_fifo[ep].borrow_mut().extend(bytes.iter().copied());
    }

    /// The host acknowledges the packet currently in the IN FIFO.
    pub fn complete_in(&self, ep: usize) {
        let value = self.csr[ep].get();
        assert_ne!(value & csr::TXPKTRDY, 0, "no packet pending on {}", ep);
        let packet = core::mem::take(&mut *self.tx_fifo[ep].borrow_mut());
        self.tx_packets[ep].borrow_mut().push(packet);
        self.csr[ep].set((value & !csr::TXPKTRDY) | csr::TXCOMP);
    }

    /// The host acknowledged a STALL handshake.
    pub fn raise_stallsent(&self, ep: usize) {
        self.csr[ep].set(self.csr[ep].get() | csr::STALLSENT);
    }

    /// Set a CSR image directly, bypassing the write rules.
    pub fn set_csr_raw(&self, ep: usize, value: u32) {
        self.csr[ep].set(value & !csr::RXBYTECNT);
    }

    pub fn packets(&self, ep: usize) -> Vec<Vec<u8>> {
        self.tx_packets[ep].borrow().clone()
    }

    pub fn packet(&self, ep: usize, index: usize) -> Vec<u8> {
        self.tx_packets[ep].borrow()[index].clone()
    }

    /// Bytes sitting in the IN FIFO, not yet handed to the host.
    pub fn tx_len(&self, ep: usize) -> usize {
        self.tx_fifo[ep].borrow().len()
    }

    pub fn rx_len(&self, ep: usize) -> usize {
        self.rx_fifo[ep].borrow().len()
    }

    /// TXPKTRDY rising edges seen on an endpoint.
    pub fn txpktrdy_events(&self, ep: usize) -> u32 {
        self.tx_events[ep].get()
    }

    pub fn faddr_value(&self) -> u32 {
        self.faddr.get()
    }

    pub fn glb_stat_value(&self) -> u32 {
        self.glb_stat.get()
    }

    pub fn imr_value(&self) -> u32 {
        self.imr.get()
    }
}

impl UdpRegs for MockUdp {
    fn frm_num(&self) -> u32 {
        self.frm_num.set(self.frm_num.get().wrapping_add(1) & 0x7FF);
        self.frm_num.get()
    }

    fn set_glb_stat(&self, value: u32) {
        self.glb_stat.set(value);
    }

    fn set_faddr(&self, value: u32) {
        self.faddr.set(value);
    }

    fn ier(&self, mask: u32) {
        self.imr.set(self.imr.get() | mask);
    }

    fn idr(&self, mask: u32) {
        self.imr.set(self.imr.get() & !mask);
    }

    fn isr(&self) -> u32 {
        let mut value = self.pending.get();
        for ep in 0..NUM_ENDPOINTS {
            if self.csr[ep].get() & EVENT_FLAGS != 0 {
                value |= 1 << ep;
            }
        }
        value
    }

    fn icr(&self, mask: u32) {
        self.pending.set(self.pending.get() & !(mask & GLOBAL_IRQS));
    }

    fn rst_ep(&self, value: u32) {
        for ep in 0..NUM_ENDPOINTS {
            if value & (1 << ep) != 0 {
                self.csr[ep].set(0);
                self.rx_fifo[ep].borrow_mut().clear();
                self.tx_fifo[ep].borrow_mut().clear();
                self.txpktrdy_observed[ep].set(false);
            }
        }
    }

    fn csr(&self, ep: usize) -> u32 {
        if self.auto_ack.get() && self.csr[ep].get() & csr::TXPKTRDY != 0 {
            if self.txpktrdy_observed[ep].get() {
                self.complete_in(ep);
            } else {
                self.txpktrdy_observed[ep].set(true);
            }
        }
        let stored = self.csr[ep].get();
        let count = (self.rx_fifo[ep].borrow().len() as u32) << 16;
        (stored & !csr::RXBYTECNT) | (count & csr::RXBYTECNT)
    }

    fn set_csr(&self, ep: usize, value: u32) {
        let old = self.csr[ep].get();
        // Event flags: writing one keeps the current state, writing zero
        // acknowledges. Everything else is written through; the byte count
        // is read-only.
        let mut new = (value & !(EVENT_FLAGS | csr::RXBYTECNT)) | (old & value & EVENT_FLAGS);
        // Releasing a bank hands its contents back to the controller.
        if old & csr::RX_DATA_BK0 != 0 && new & csr::RX_DATA_BK0 == 0
            || old & csr::RX_DATA_BK1 != 0 && new & csr::RX_DATA_BK1 == 0
        {
            self.rx_fifo[ep].borrow_mut().clear();
            new &= !csr::RXBYTECNT;
        }
        if old & csr::TXPKTRDY == 0 && new & csr::TXPKTRDY != 0 {
            self.tx_events[ep].set(self.tx_events[ep].get() + 1);
            self.txpktrdy_observed[ep].set(false);
        }
        self.csr[ep].set(new & !csr::RXBYTECNT);
    }

    fn fdr_read(&self, ep: usize) -> u8 {
        self.rx_fifo[ep].borrow_mut().pop_front().unwrap_or(0)
    }

    fn fdr_write(&self, ep: usize, byte: u8) {
        self.tx_fifo[ep].borrow_mut().push(byte);
    }
}
