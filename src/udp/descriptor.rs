//! Compile-time USB descriptors.
//!
//! Everything the host can ask for lives here as packed byte arrays in wire
//! order, served by pointer and length. The configuration descriptor is one
//! contiguous blob (configuration, interface, both endpoints) because the
//! host reads it as a single transfer.

pub const TYPE_DEVICE: u8 = 1;
pub const TYPE_CONFIGURATION: u8 = 2;
pub const TYPE_STRING: u8 = 3;
pub const TYPE_INTERFACE: u8 = 4;
pub const TYPE_ENDPOINT: u8 = 5;

/// Device descriptor: USB 2.0, 8-byte control packets, vendor 0x0694 (LEGO),
/// product 0xFF00, one configuration.
pub static DEVICE: [u8; 18] = [
    18,          // bLength
    TYPE_DEVICE, // bDescriptorType
    0x00, 0x02,  // bcdUSB 2.00
    0x02,        // bDeviceClass
    0x00,        // bDeviceSubClass
    0x00,        // bDeviceProtocol
    8,           // bMaxPacketSize0
    0x94, 0x06,  // idVendor 0x0694
    0x00, 0xFF,  // idProduct 0xFF00
    0x00, 0x00,  // bcdDevice
    1,           // iManufacturer
    2,           // iProduct
    0,           // iSerialNumber
    1,           // bNumConfigurations
];

/// Configuration bundle: configuration, interface and the two bulk endpoint
/// descriptors, packed back to back.
pub static CONFIGURATION: [u8; 32] = [
    // Configuration
    9,                  // bLength
    TYPE_CONFIGURATION, // bDescriptorType
    32, 0,              // wTotalLength
    1,                  // bNumInterfaces
    1,                  // bConfigurationValue
    0,                  // iConfiguration
    0x80 | 0x40,        // bmAttributes: reserved-one, self-powered
    0,                  // bMaxPower
    // Interface: vendor specific, two bulk endpoints
    9,              // bLength
    TYPE_INTERFACE, // bDescriptorType
    0,              // bInterfaceNumber
    0,              // bAlternateSetting
    2,              // bNumEndpoints
    0xFF,           // bInterfaceClass
    0xFF,           // bInterfaceSubClass
    0xFF,           // bInterfaceProtocol
    0,              // iInterface
    // Endpoint 1: bulk IN
    7,             // bLength
    TYPE_ENDPOINT, // bDescriptorType
    0x81,          // bEndpointAddress
    0x02,          // bmAttributes: bulk
    64, 0,         // wMaxPacketSize
    0,             // bInterval
    // Endpoint 2: bulk OUT
    7,             // bLength
    TYPE_ENDPOINT, // bDescriptorType
    0x02,          // bEndpointAddress
    0x02,          // bmAttributes: bulk
    64, 0,         // wMaxPacketSize
    0,             // bInterval
];

/// String descriptor zero: the languages we speak. English (United Kingdom).
static LANG_IDS: [u8; 4] = [4, TYPE_STRING, 0x09, 0x08];

static MANUFACTURER: [u8; 7] = [7, TYPE_STRING, b'L', b'E', b'G', b'O', 0];
static PRODUCT: [u8; 6] = [6, TYPE_STRING, b'N', b'X', b'T', 0];

/// Named strings, indexed from 1 by the device descriptor.
static STRINGS: [&[u8]; 2] = [&MANUFACTURER, &PRODUCT];

/// Look up the descriptor for a GET_DESCRIPTOR request. `None` means the
/// request must be stalled.
pub fn lookup(kind: u8, index: u8) -> Option<&'static [u8]> {
    match (kind, index) {
        (TYPE_DEVICE, 0) => Some(&DEVICE),
        (TYPE_CONFIGURATION, 0) => Some(&CONFIGURATION),
        (TYPE_STRING, 0) => Some(&LANG_IDS),
        (TYPE_STRING, index) => STRINGS.get(index as usize - 1).copied(),
        _ => None,
    }
}
