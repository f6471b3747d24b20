//! PIF command buffer codec.
//!
//! Wire layout of one controller command, as found in PIF RAM:
//!
//! ```text
//! [0]        tx length (bits 0..=5)
//! [1]        rx length (bits 0..=5)
//! [2..2+tx]  request bytes sent to the controller
//! [..+rx]    reply bytes, written in place
//! ```
//!
//! The upper two bits of each length byte are PIF flags and are ignored.
//! Decoding is a pure slicing step; replies are written straight into the buffer.

use crate::error::CommandError;

/// Bits of a length byte that carry the length.
pub const LENGTH_MASK: u8 = 0x3F;

/// Size of the two length bytes at the front of every frame.
pub const HEADER_LEN: usize = 2;

/// Total frame size declared by the two header bytes.
pub fn frame_len(tx_header: u8, rx_header: u8) -> usize {
    HEADER_LEN + (tx_header & LENGTH_MASK) as usize + (rx_header & LENGTH_MASK) as usize
}

/// Transmit/receive views over one command frame.
#[derive(Debug)]
pub struct CommandView<'a> {
    tx: &'a [u8],
    rx: &'a mut [u8],
}

/// Split `buffer` into its request and reply regions.
///
/// Bytes past the declared frame are left out of both views.
pub fn decode(buffer: &mut [u8]) -> Result<CommandView<'_>, CommandError> {
    if buffer.len() < HEADER_LEN {
        return Err(CommandError::MissingHeader);
    }

    let tx_len = (buffer[0] & LENGTH_MASK) as usize;
    let rx_len = (buffer[1] & LENGTH_MASK) as usize;
    let declared = HEADER_LEN + tx_len + rx_len;
    if buffer.len() < declared {
        return Err(CommandError::Truncated {
            declared,
            available: buffer.len(),
        });
    }

    let (_, payload) = buffer.split_at_mut(HEADER_LEN);
    let (tx, rest) = payload.split_at_mut(tx_len);
    let rx = &mut rest[..rx_len];

    Ok(CommandView { tx, rx })
}

impl<'a> CommandView<'a> {
    pub fn tx_len(&self) -> usize {
        self.tx.len()
    }

    pub fn rx_len(&self) -> usize {
        self.rx.len()
    }

    /// Request bytes.
    pub fn tx(&self) -> &[u8] {
        self.tx
    }

    /// Current contents of the reply region.
    pub fn rx(&self) -> &[u8] {
        self.rx
    }

    /// Copy a reply into the rx region.
    ///
    /// At most `rx_len` bytes are written. A short reply leaves the tail of the region
    /// as it was. Returns the number of bytes written.
    pub fn write_reply(&mut self, reply: &[u8]) -> usize {
        let count = reply.len().min(self.rx.len());
        self.rx[..count].copy_from_slice(&reply[..count]);
        count
    }
}
