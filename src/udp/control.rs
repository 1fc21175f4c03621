//! Control transfers on endpoint 0.
//!
//! A SETUP packet is always eight bytes pulled out of FDR0. For
//! device-to-host requests the DIR bit must be raised before RXSETUP is
//! acknowledged, or the data stage goes out the wrong way. The request is
//! then decoded into a closed set of variants and dispatched; anything the
//! device does not implement is answered with a STALL handshake.

use super::descriptor;
use super::driver::Udp;
use super::regs::{csr, faddr, glb_stat, UdpRegs};

/// Transfer direction, from bit 7 of bmRequestType.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HostToDevice,
    DeviceToHost,
}

/// Request recipient, from bits 0..4 of bmRequestType.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
}

/// The standard requests this device answers. Everything else stalls,
/// including SET_DESCRIPTOR and the interface requests.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Request {
    GetStatus,
    ClearFeature,
    SetFeature,
    SetAddress,
    GetDescriptor,
    GetConfiguration,
    SetConfiguration,
    Unsupported,
}

/// An eight-byte SETUP packet, fields already in host order.
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupPacket {
    /// Drain all eight bytes out of the control FIFO, in wire order.
    pub fn read<R: UdpRegs>(regs: &R) -> Self {
        let request_type = regs.fdr_read(0);
        let request = regs.fdr_read(0);
        let value = u16::from_le_bytes([regs.fdr_read(0), regs.fdr_read(0)]);
        let index = u16::from_le_bytes([regs.fdr_read(0), regs.fdr_read(0)]);
        let length = u16::from_le_bytes([regs.fdr_read(0), regs.fdr_read(0)]);
        Self {
            request_type,
            request,
            value,
            index,
            length,
        }
    }

    pub fn direction(&self) -> Direction {
        if self.request_type & 0x80 != 0 {
            Direction::DeviceToHost
        } else {
            Direction::HostToDevice
        }
    }

    pub fn recipient(&self) -> Recipient {
        match self.request_type & 0x0F {
            0 => Recipient::Device,
            1 => Recipient::Interface,
            2 => Recipient::Endpoint,
            _ => Recipient::Other,
        }
    }

    fn decode(&self) -> Request {
        match self.request {
            0x00 => Request::GetStatus,
            0x01 => Request::ClearFeature,
            0x03 => Request::SetFeature,
            0x05 => Request::SetAddress,
            0x06 => Request::GetDescriptor,
            0x08 => Request::GetConfiguration,
            0x09 => Request::SetConfiguration,
            _ => Request::Unsupported,
        }
    }
}

impl<R: UdpRegs> Udp<R> {
    /// Decode and serve the SETUP packet sitting in the control FIFO.
    pub(super) fn handle_setup(&mut self) {
        let setup = SetupPacket::read(&self.regs);

        if setup.direction() == Direction::DeviceToHost {
            self.regs.csr_set(0, csr::DIR);
        }
        self.regs.csr_clear(0, csr::RXSETUP);

        debug!(
            "{} udp: setup request {:02x}/{:02x} value {:04x} index {:04x} length {}",
            self.regs.frm_num(),
            setup.request_type,
            setup.request,
            setup.value,
            setup.index,
            setup.length,
        );

        match setup.decode() {
            Request::GetStatus => {
                let status: u16 = match setup.recipient() {
                    // Self powered, no remote wakeup.
                    Recipient::Device => 0x0001,
                    // Halt state is not tracked per endpoint.
                    _ => 0x0000,
                };
                self.endpoints[0].send_immediate(&self.regs, &status.to_le_bytes());
            }
            Request::ClearFeature | Request::SetFeature => {
                // Not implemented, but acknowledged so the host moves on.
                self.endpoints[0].send_immediate(&self.regs, &[]);
            }
            Request::SetAddress => {
                self.endpoints[0].send_immediate(&self.regs, &[]);
                // The status packet must reach the host while we still answer
                // on the old address.
                while self.regs.csr(0) & csr::TXCOMP == 0 {}
                self.regs.csr_clear(0, csr::TXCOMP);

                info!("udp: address {}", setup.value);
                self.regs.set_faddr(faddr::FEN | u32::from(setup.value));
                self.regs.set_glb_stat(if setup.value != 0 {
                    glb_stat::FADDEN
                } else {
                    0
                });
            }
            Request::GetDescriptor => {
                let kind = (setup.value >> 8) as u8;
                let index = setup.value as u8;
                match descriptor::lookup(kind, index) {
                    Some(data) => {
                        let requested = usize::from(setup.length);
                        // A configuration read shorter than asked ends with
                        // an empty packet so the host knows there is no more.
                        let short_read =
                            kind == descriptor::TYPE_CONFIGURATION && data.len() < requested;
                        let limit = data.len().min(requested);
                        self.endpoints[0].start_flash(&self.regs, &data[..limit], short_read);
                    }
                    None => self.stall_control(),
                }
            }
            Request::GetConfiguration => {
                let config = self.current_config;
                self.endpoints[0].send_immediate(&self.regs, &[config]);
            }
            Request::SetConfiguration => {
                self.current_config = setup.value as u8;
                self.endpoints[0].send_immediate(&self.regs, &[]);
                info!("udp: configuration {}", setup.value);
                self.regs.set_glb_stat(if setup.value != 0 {
                    glb_stat::CONFG | glb_stat::FADDEN
                } else {
                    glb_stat::FADDEN
                });
            }
            Request::Unsupported => {
                debug!("udp: unsupported request {:02x}, stalling", setup.request);
                self.stall_control();
            }
        }
    }

    /// Answer the current control request with a STALL handshake. The
    /// interrupt handler clears FORCESTALL again once the hardware reports
    /// the handshake was sent.
    fn stall_control(&mut self) {
        self.regs.csr_set(0, csr::FORCESTALL);
    }
}
