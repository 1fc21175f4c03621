//! Board integration points consumed by the USB driver.
//!
//! The driver owns the UDP peripheral and nothing else. Clock gating, the D+
//! pull-up pin, the interrupt controller and the system tick belong to the
//! board crate, which hands them to [`crate::udp::init`] through this trait.

/// Peripheral identifier of the UDP on the AT91SAM7S256, used both as the
/// PMC clock gate index and as the interrupt vector number.
pub const UDP_PERIPHERAL_ID: u32 = 11;

/// Interrupt priority the driver asks for, in the 0 (lowest) to 7 (highest)
/// range of the advanced interrupt controller.
pub const UDP_IRQ_PRIORITY: u8 = 3;

/// Source trigger for the UDP interrupt line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IrqTrigger {
    Level,
    Edge,
}

/// Services the board must provide around the UDP peripheral.
///
/// `now_ms` is only read for interrupt diagnostics; a counter that wraps is
/// fine.
pub trait Platform {
    /// Gate the UDP peripheral and USB (48 MHz) clocks on. The PLL itself is
    /// expected to be configured during boot.
    fn enable_peripheral_clock(&mut self);

    /// Gate the UDP clocks off again.
    fn disable_peripheral_clock(&mut self);

    /// Signal readiness to the host by pulling D+ high. On the NXT this means
    /// driving PA16 low through the external transistor.
    fn enable_pullup(&mut self);

    /// Release D+, detaching the device from the bus.
    fn disable_pullup(&mut self);

    /// Bind `handler` to the given interrupt vector.
    fn install_isr(&mut self, vector: u32, priority: u8, trigger: IrqTrigger, handler: fn());

    /// Unmask interrupts globally.
    fn interrupts_enable(&mut self);

    /// Mask interrupts globally.
    fn interrupts_disable(&mut self);

    /// Millisecond tick.
    fn now_ms() -> u32;
}
