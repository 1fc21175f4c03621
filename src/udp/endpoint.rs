//! Endpoint engine: outbound transfer cursors and the inbound double buffer.
//!
//! Transmission is packet-at-a-time. A transfer is started by loading the
//! first packet into the FIFO and raising TXPKTRDY; every following packet is
//! pushed from the interrupt handler when the previous one completes. The
//! cursor remembers only what remains to be sent.
//!
//! Reception delivers whole packets either straight into the buffer the
//! foreground reads, or into a backlog buffer the foreground claims with
//! `flush`. A third packet arriving before the foreground catches up
//! overwrites the backlog and latches the sticky overrun flag.

use heapless::Vec;

use super::regs::{csr, UdpRegs};

/// Largest packet endpoint 0 accepts.
pub const CONTROL_PACKET_SIZE: usize = 8;
/// Largest packet the bulk endpoints accept.
pub const BULK_PACKET_SIZE: usize = 64;

/// Capacity of each receive buffer: one bulk packet.
pub const RX_BUFFER_SIZE: usize = 64;
/// Capacity of the staging buffer foreground sends are copied into.
pub const TX_STAGING_SIZE: usize = 256;

fn max_packet_size(ep: usize) -> usize {
    if ep == 0 {
        CONTROL_PACKET_SIZE
    } else {
        BULK_PACKET_SIZE
    }
}

/// What is left of the outbound transfer on one endpoint.
#[derive(Clone, Copy)]
enum TxTransfer {
    Idle,
    /// Remainder lives in immortal descriptor memory.
    Flash { data: &'static [u8], pos: usize },
    /// Remainder lives in the driver's staging buffer.
    Staged { pos: usize, len: usize },
}

/// Per-endpoint transmit state.
pub struct Endpoint {
    index: usize,
    transfer: TxTransfer,
    /// A short control read is terminated by an empty packet after the last
    /// data packet goes out.
    zlp_pending: bool,
}

impl Endpoint {
    pub const fn new(index: usize) -> Self {
        Self {
            index,
            transfer: TxTransfer::Idle,
            zlp_pending: false,
        }
    }

    /// Bytes not yet handed to the FIFO.
    pub fn remaining(&self) -> usize {
        match self.transfer {
            TxTransfer::Idle => 0,
            TxTransfer::Flash { data, pos } => data.len() - pos,
            TxTransfer::Staged { pos, len } => len - pos,
        }
    }

    /// No transfer in progress, the FIFO may be reloaded.
    pub fn idle(&self) -> bool {
        matches!(self.transfer, TxTransfer::Idle) && !self.zlp_pending
    }

    /// Drop any half-finished transfer. Used on bus reset.
    pub fn reset(&mut self) {
        self.transfer = TxTransfer::Idle;
        self.zlp_pending = false;
    }

    /// Write one packet that fits the FIFO whole and hand it to the USB
    /// engine. Used for status-stage acknowledgements and the short
    /// immediate replies of the control machine.
    pub fn send_immediate<R: UdpRegs>(&mut self, regs: &R, bytes: &[u8]) {
        debug_assert!(bytes.len() <= max_packet_size(self.index));
        for &byte in bytes {
            regs.fdr_write(self.index, byte);
        }
        self.transfer = TxTransfer::Idle;
        self.zlp_pending = false;
        regs.csr_set(self.index, csr::TXPKTRDY);
    }

    /// Start a transfer out of descriptor memory. With `short_read` set, an
    /// empty packet follows the final data packet to tell the host the
    /// descriptor ended before the requested length.
    pub fn start_flash<R: UdpRegs>(&mut self, regs: &R, data: &'static [u8], short_read: bool) {
        self.transfer = TxTransfer::Flash { data, pos: 0 };
        self.zlp_pending = short_read;
        self.advance(regs, &[]);
    }

    /// Start a transfer out of the staging buffer.
    pub fn start_staged<R: UdpRegs>(&mut self, regs: &R, staging: &[u8]) {
        self.transfer = TxTransfer::Staged {
            pos: 0,
            len: staging.len(),
        };
        self.zlp_pending = false;
        self.advance(regs, staging);
    }

    /// Load the next packet of the current transfer, at most the endpoint's
    /// packet size, and raise TXPKTRDY. Called once to start a transfer and
    /// again from the interrupt handler on every TXCOMP until nothing
    /// remains.
    pub fn advance<R: UdpRegs>(&mut self, regs: &R, staging: &[u8]) {
        let max = max_packet_size(self.index);
        let (chunk, next) = match self.transfer {
            TxTransfer::Idle => {
                if !self.zlp_pending {
                    return;
                }
                self.zlp_pending = false;
                (&[][..], TxTransfer::Idle)
            }
            TxTransfer::Flash { data, pos } => {
                let take = max.min(data.len() - pos);
                let next = if pos + take == data.len() {
                    TxTransfer::Idle
                } else {
                    TxTransfer::Flash {
                        data,
                        pos: pos + take,
                    }
                };
                (&data[pos..pos + take], next)
            }
            TxTransfer::Staged { pos, len } => {
                let take = max.min(len - pos);
                let next = if pos + take == len {
                    TxTransfer::Idle
                } else {
                    TxTransfer::Staged {
                        pos: pos + take,
                        len,
                    }
                };
                (&staging[pos..pos + take], next)
            }
        };
        for &byte in chunk {
            regs.fdr_write(self.index, byte);
        }
        self.transfer = next;
        regs.csr_set(self.index, csr::TXPKTRDY);
    }
}

/// Which ping-pong bank of the OUT FIFO the next read will release.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxBank {
    Bank0,
    Bank1,
}

impl RxBank {
    pub fn mask(self) -> u32 {
        match self {
            RxBank::Bank0 => csr::RX_DATA_BK0,
            RxBank::Bank1 => csr::RX_DATA_BK1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            RxBank::Bank0 => RxBank::Bank1,
            RxBank::Bank1 => RxBank::Bank0,
        }
    }
}

/// The receive double buffer.
///
/// `app` belongs to the foreground; the interrupt handler only writes it when
/// it is empty. `backlog` belongs to the interrupt handler and holds the
/// newest packet the foreground has not claimed yet.
pub struct RxBuffers {
    app: Vec<u8, RX_BUFFER_SIZE>,
    backlog: Vec<u8, RX_BUFFER_SIZE>,
    overrun: bool,
}

impl RxBuffers {
    pub const fn new() -> Self {
        Self {
            app: Vec::new(),
            backlog: Vec::new(),
            overrun: false,
        }
    }

    /// Pull `count` bytes out of the endpoint FIFO. Delivers straight to the
    /// foreground buffer when it is free, otherwise parks the packet in the
    /// backlog; a packet already parked there is lost, newest wins.
    pub fn store<R: UdpRegs>(&mut self, regs: &R, ep: usize, count: usize) {
        let destination = if self.app.is_empty() {
            &mut self.app
        } else {
            if !self.backlog.is_empty() {
                warn!("udp: rx overrun, dropping oldest packet");
                self.overrun = true;
            }
            &mut self.backlog
        };
        destination.clear();
        for _ in 0..count {
            // Bulk packets never exceed the buffer; anything longer is
            // drained from the FIFO and dropped.
            let _ = destination.push(regs.fdr_read(ep));
        }
    }

    /// Hand the backlog to the foreground and clear the overrun latch.
    pub fn flush(&mut self) {
        self.app = core::mem::take(&mut self.backlog);
        self.overrun = false;
    }

    /// Bytes waiting in the foreground buffer.
    pub fn available(&self) -> usize {
        self.app.len()
    }

    /// The foreground buffer contents.
    pub fn data(&self) -> &[u8] {
        &self.app
    }

    pub fn overrun(&self) -> bool {
        self.overrun
    }

    /// Discard everything. Used on bus reset.
    pub fn reset(&mut self) {
        self.app.clear();
        self.backlog.clear();
        self.overrun = false;
    }

    #[cfg(test)]
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }
}
