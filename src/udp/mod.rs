//! UDP (USB Device Port) driver.
//!
//! The brick shows up on the bus as a vendor-specific full-speed device with
//! one configuration, one interface and two bulk endpoints. Endpoint 0
//! carries enumeration, endpoint 1 carries the application byte stream.
//!
//! All protocol work runs in the interrupt handler; the functions here are
//! the foreground half: they take the shared driver instance under a
//! critical section, poke or poll it, and get out. `send` busy-waits while a
//! previous transfer is still draining, so a caller that cannot afford to
//! block must check [`can_send`] first, and must not send at all while the
//! device may be unattached. There are no timeouts.
//!
//! ```no_run
//! # fn example(board: &mut impl nxt_usb::platform::Platform) {
//! nxt_usb::udp::init(board);
//! nxt_usb::udp::send(b"hello");
//! if nxt_usb::udp::has_data() > 0 {
//!     nxt_usb::udp::with_buffer(|bytes| {
//!         let _ = bytes; // consume
//!     });
//!     nxt_usb::udp::flush_buffer();
//! }
//! # }
//! ```

use core::cell::RefCell;

use critical_section::Mutex;

use crate::platform::{IrqTrigger, Platform, UDP_IRQ_PRIORITY, UDP_PERIPHERAL_ID};

pub mod descriptor;
mod driver;
mod endpoint;
pub mod regs;

mod control;
#[cfg(test)]
pub(crate) mod mock;

pub use driver::{Diagnostics, Udp};
pub use endpoint::{BULK_PACKET_SIZE, CONTROL_PACKET_SIZE, RX_BUFFER_SIZE, TX_STAGING_SIZE};
pub use regs::{Mmio, UdpRegs, NUM_ENDPOINTS};

/// The control endpoint.
pub const CONTROL_ENDPOINT: usize = 0;
/// The bulk endpoint carrying the application data stream.
pub const BULK_IN_ENDPOINT: usize = 1;
/// The host-to-device bulk endpoint announced in the configuration.
pub const BULK_OUT_ENDPOINT: usize = 2;

/// The one driver instance, shared by the interrupt trampoline and the
/// foreground API below.
static USB: Mutex<RefCell<Option<Udp<Mmio>>>> = Mutex::new(RefCell::new(None));

fn with<T>(f: impl FnOnce(&mut Udp<Mmio>) -> T) -> Option<T> {
    critical_section::with(|cs| USB.borrow_ref_mut(cs).as_mut().map(f))
}

/// Interrupt entry, bound to the UDP vector by [`init`].
fn interrupt_trampoline() {
    critical_section::with(|cs| {
        if let Some(usb) = USB.borrow_ref_mut(cs).as_mut() {
            usb.interrupt();
        }
    });
}

/// Bring the USB device up.
///
/// Enables the peripheral clocks, quiesces the UDP, announces the device to
/// the host through the D+ pull-up and binds the interrupt handler. The
/// first thing the host does is reset the bus, and ENDBUSRES cannot be
/// masked, so everything else is programmed from the bus-reset path.
pub fn init<P: Platform>(platform: &mut P) {
    platform.interrupts_disable();
    platform.enable_peripheral_clock();

    let regs = unsafe { Mmio::steal() };
    regs.idr(!0);
    regs.rst_ep(0xF);
    regs.rst_ep(0);

    platform.enable_pullup();

    let usb = Udp::new(regs, P::now_ms);
    critical_section::with(|cs| {
        USB.borrow_ref_mut(cs).replace(usb);
    });

    platform.install_isr(
        UDP_PERIPHERAL_ID,
        UDP_IRQ_PRIORITY,
        IrqTrigger::Edge,
        interrupt_trampoline,
    );
    platform.interrupts_enable();
    info!("udp: initialized");
}

/// Take the device off the bus and drop the driver.
pub fn shutdown<P: Platform>(platform: &mut P) {
    critical_section::with(|cs| {
        if let Some(usb) = USB.borrow_ref_mut(cs).take() {
            usb.regs.idr(!0);
        }
    });
    platform.disable_pullup();
    platform.disable_peripheral_clock();
    info!("udp: shut down");
}

/// True when [`send`] would start transmitting immediately: the driver is
/// up, the bus is awake and no previous transfer is still draining.
pub fn can_send() -> bool {
    with(|usb| usb.can_send()).unwrap_or(false)
}

/// Send `data` to the host on the bulk endpoint.
///
/// Blocks while the bus is suspended or an earlier transfer has not drained,
/// then hands the bytes to the interrupt machinery and returns; the transfer
/// itself completes in the background. An empty slice sends a single
/// zero-length packet. With no driver initialized this is a no-op.
pub fn send(data: &[u8]) {
    let mut sent = 0;
    loop {
        let progress = critical_section::with(|cs| {
            let mut usb = USB.borrow_ref_mut(cs);
            match usb.as_mut() {
                Some(usb) if usb.can_send() => Some(usb.start_send(&data[sent..])),
                Some(_) => None,
                None => Some(data.len() - sent),
            }
        });
        match progress {
            Some(accepted) => {
                sent += accepted;
                if sent >= data.len() {
                    return;
                }
            }
            None => core::hint::spin_loop(),
        }
    }
}

/// Bytes waiting in the foreground receive buffer.
pub fn has_data() -> usize {
    with(|usb| usb.available()).unwrap_or(0)
}

/// Lend the foreground receive buffer to `f`.
///
/// The buffer keeps its content until [`flush_buffer`] replaces it; reading
/// does not consume. Runs under the USB interrupt mask, so keep `f` short.
pub fn with_buffer<T>(f: impl FnOnce(&[u8]) -> T) -> T {
    critical_section::with(|cs| match USB.borrow_ref(cs).as_ref() {
        Some(usb) => f(usb.received()),
        None => f(&[]),
    })
}

/// True once a packet arrived with both receive buffers occupied and
/// replaced the one still waiting. Cleared by [`flush_buffer`].
pub fn overloaded() -> bool {
    with(|usb| usb.overloaded()).unwrap_or(false)
}

/// Move the interrupt handler's buffered packet into the foreground buffer
/// and clear the overrun flag.
pub fn flush_buffer() {
    with(|usb| usb.flush_buffer());
}

/// Snapshot of the interrupt bookkeeping.
pub fn diagnostics() -> Diagnostics {
    with(|usb| usb.diagnostics()).unwrap_or_default()
}
