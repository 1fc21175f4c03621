//! Driver state and the top-level interrupt dispatch.

use heapless::Vec;

use super::endpoint::{Endpoint, RxBank, RxBuffers, TX_STAGING_SIZE};
use super::regs::{csr, faddr, irq, UdpRegs, NUM_ENDPOINTS};
use super::{BULK_IN_ENDPOINT, CONTROL_ENDPOINT};

/// Snapshot of the last interrupt, kept for the diagnostics screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Diagnostics {
    /// Interrupts taken since initialization.
    pub interrupts: u32,
    /// Millisecond timestamp of the last interrupt.
    pub last_ms: u32,
    /// UDP_ISR as read at entry of the last interrupt.
    pub last_isr: u32,
    /// CSR0 as read at entry of the last interrupt.
    pub last_csr0: u32,
    /// CSR1 as read at entry of the last interrupt.
    pub last_csr1: u32,
}

/// The UDP device driver.
///
/// There is exactly one instance, shared between the interrupt handler and
/// the foreground through the module-level API; every method here runs with
/// the USB interrupt masked. The register seam `R` is the real peripheral in
/// firmware and a mock in tests.
pub struct Udp<R: UdpRegs> {
    pub(super) regs: R,
    pub(super) endpoints: [Endpoint; NUM_ENDPOINTS],
    pub(super) rx: RxBuffers,
    pub(super) rx_bank: RxBank,
    pub(super) tx_staging: Vec<u8, TX_STAGING_SIZE>,
    pub(super) current_config: u8,
    pub(super) suspended: bool,
    now_ms: fn() -> u32,
    diag: Diagnostics,
}

impl<R: UdpRegs> Udp<R> {
    pub fn new(regs: R, now_ms: fn() -> u32) -> Self {
        Self {
            regs,
            endpoints: [
                Endpoint::new(0),
                Endpoint::new(1),
                Endpoint::new(2),
                Endpoint::new(3),
            ],
            rx: RxBuffers::new(),
            rx_bank: RxBank::Bank0,
            tx_staging: Vec::new(),
            current_config: 0,
            suspended: false,
            now_ms,
            diag: Diagnostics::default(),
        }
    }

    /// True when a new bulk transfer may start: the bus is awake and the
    /// previous transfer has fully drained into the FIFO.
    pub fn can_send(&self) -> bool {
        !self.suspended && self.endpoints[BULK_IN_ENDPOINT].idle()
    }

    /// Stage up to a staging buffer's worth of `data` and start transmitting
    /// it on the bulk IN endpoint. Returns how many bytes were accepted; an
    /// empty slice sends a single zero-length packet.
    ///
    /// Must only be called when [`Self::can_send`] is true.
    pub fn start_send(&mut self, data: &[u8]) -> usize {
        debug_assert!(self.can_send());
        if data.is_empty() {
            self.endpoints[BULK_IN_ENDPOINT].send_immediate(&self.regs, &[]);
            return 0;
        }
        let take = data.len().min(TX_STAGING_SIZE);
        self.tx_staging.clear();
        // take never exceeds the capacity
        let _ = self.tx_staging.extend_from_slice(&data[..take]);
        self.endpoints[BULK_IN_ENDPOINT].start_staged(&self.regs, &self.tx_staging);
        take
    }

    /// Bytes waiting in the foreground receive buffer.
    pub fn available(&self) -> usize {
        self.rx.available()
    }

    /// The foreground receive buffer contents.
    pub fn received(&self) -> &[u8] {
        self.rx.data()
    }

    /// True once a packet had to overwrite the backlog buffer. Cleared by
    /// [`Self::flush_buffer`].
    pub fn overloaded(&self) -> bool {
        self.rx.overrun()
    }

    /// Claim the backlog packet for the foreground and clear the overrun
    /// latch. Runs under the USB interrupt mask like everything else here;
    /// that mask is what makes the hand-over atomic.
    pub fn flush_buffer(&mut self) {
        self.rx.flush();
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diag
    }

    /// The interrupt handler. Handles at most one endpoint event per entry;
    /// the controller re-raises the line for whatever is still pending.
    pub fn interrupt(&mut self) {
        let pending = self.regs.isr();
        let csr0 = self.regs.csr(0);
        let csr1 = self.regs.csr(1);
        self.diag = Diagnostics {
            interrupts: self.diag.interrupts.wrapping_add(1),
            last_ms: (self.now_ms)(),
            last_isr: pending,
            last_csr0: csr0,
            last_csr1: csr1,
        };

        // A STALL handshake we forced earlier has been acknowledged.
        if csr0 & csr::STALLSENT != 0 {
            self.regs.csr_clear(0, csr::FORCESTALL | csr::STALLSENT);
        }

        if pending & irq::ENDBUSRES != 0 {
            self.bus_reset();
            return;
        }

        if pending & irq::RXSUSP != 0 {
            self.regs.icr(irq::RXSUSP);
            self.suspended = true;
            info!("udp: suspended");
        }

        if pending & irq::RXRSM != 0 {
            self.regs.icr(irq::RXRSM);
            self.suspended = false;
            info!("udp: resumed");
        }

        let endpoint = (0..NUM_ENDPOINTS).find(|&ep| pending & (1 << ep) != 0);

        if endpoint == Some(CONTROL_ENDPOINT)
            && self.regs.csr(CONTROL_ENDPOINT) & csr::RXSETUP != 0
        {
            self.regs.icr(irq::EP0INT);
            self.handle_setup();
            return;
        }

        if let Some(ep) = endpoint {
            if self.regs.csr(ep) & csr::TXCOMP != 0 {
                // The host acknowledged the packet; push the next one of the
                // same transfer, if any.
                self.regs.csr_clear(ep, csr::TXCOMP);
                self.endpoints[ep].advance(&self.regs, &self.tx_staging);
                trace!(
                    "{} udp: tx continue ep{} remaining {}",
                    self.regs.frm_num(),
                    ep,
                    self.endpoints[ep].remaining(),
                );
                return;
            }

            if csr::byte_count(self.regs.csr(ep)) != 0 {
                self.receive(ep);
                return;
            }
        }

        self.regs.icr(irq::WAKEUP | irq::SOFINT);
    }

    /// Pull a received packet out of the FIFO. Only the bulk data endpoint
    /// feeds the receive buffers; anything arriving elsewhere is released
    /// unread.
    fn receive(&mut self, ep: usize) {
        if ep == BULK_IN_ENDPOINT {
            let count = csr::byte_count(self.regs.csr(ep));
            trace!("{} udp: rx {} bytes", self.regs.frm_num(), count);
            self.rx.store(&self.regs, ep, count);
            // Release the bank we just read and expect the other one next.
            self.regs.csr_clear(ep, self.rx_bank.mask());
            self.rx_bank = self.rx_bank.other();
        } else {
            self.regs
                .csr_clear(ep, csr::RX_DATA_BK0 | csr::RX_DATA_BK1);
        }
    }

    /// Host-initiated reset. Everything goes back to the unaddressed,
    /// unconfigured state and the endpoints are reprogrammed from scratch.
    fn bus_reset(&mut self) {
        warn!("{} udp: bus reset", self.regs.frm_num());

        self.regs
            .icr(irq::ENDBUSRES | irq::RXSUSP | irq::RXRSM);
        self.regs.rst_ep(0xF);
        self.regs.rst_ep(0);
        self.regs.set_faddr(faddr::FEN);

        for endpoint in &mut self.endpoints {
            endpoint.reset();
        }
        self.rx.reset();
        self.rx_bank = RxBank::Bank0;
        self.tx_staging.clear();
        self.current_config = 0;
        self.suspended = false;

        self.regs.idr(!0);
        self.regs
            .ier(irq::EP0INT | irq::EP1INT | irq::EP2INT | irq::RXSUSP | irq::RXRSM);

        self.regs.set_csr(0, csr::EPEDS | csr::EPTYPE_CTRL);
        self.regs.set_csr(1, csr::EPEDS | csr::EPTYPE_BULK_IN);
        self.regs.set_csr(2, csr::EPEDS | csr::EPTYPE_BULK_OUT);
        self.regs.set_csr(3, 0);
    }
}
