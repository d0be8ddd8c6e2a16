// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Register access.
//!
//! Devices expose their registers through the [`RegisterAccess`] trait. Individual bitfields are
//! described by [`RegisterField`] values, which perform read-modify-write cycles on the register
//! containing them.
//!
//! [`RegisterBank`] is an in-memory register file that records every write, which lets the
//! register programs generated by this crate be inspected and compared.

use std::thread::sleep;
use std::time::Duration;
use std::time::Instant;

use byteorder::ByteOrder;
use byteorder::LittleEndian;
use thiserror::Error;

/// Access to a flat space of 32-bit device registers, addressed by byte offset.
pub trait RegisterAccess {
    /// Reads the register at `offset`.
    fn read(&self, offset: u32) -> u32;

    /// Writes `value` to the register at `offset` without ordering it against other memory
    /// accesses. This is what register programs are made of.
    fn write_relaxed(&mut self, offset: u32, value: u32);

    /// Writes `value` to the register at `offset`, ordered after all previous writes. Used for
    /// writes that trigger the hardware.
    fn write(&mut self, offset: u32, value: u32);
}

/// A bitfield within a device register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterField {
    /// Byte offset of the register containing the field.
    pub base: u32,
    /// Position of the least significant bit of the field.
    pub shift: u8,
    /// Mask of the field, before shifting.
    pub mask: u32,
}

impl RegisterField {
    pub const fn new(base: u32, shift: u8, mask: u32) -> Self {
        Self { base, shift, mask }
    }

    /// Returns `value` placed at the position of this field, for building whole register words.
    pub const fn bits(&self, value: u32) -> u32 {
        (value & self.mask) << self.shift
    }

    /// Replaces the content of this field with `value` using a read-modify-write cycle. Bits of
    /// `value` that do not fit in the field are dropped.
    pub fn write<R: RegisterAccess + ?Sized>(&self, regs: &mut R, value: u32) {
        let mut reg = regs.read(self.base);
        reg &= !(self.mask << self.shift);
        reg |= self.bits(value);
        regs.write_relaxed(self.base, reg);
    }

    /// Reads the current value of this field.
    pub fn read<R: RegisterAccess + ?Sized>(&self, regs: &R) -> u32 {
        (regs.read(self.base) >> self.shift) & self.mask
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    #[error("timed out waiting on register {offset:#05x} (last value {value:#010x})")]
    Timeout { offset: u32, value: u32 },
}

/// Polls the register at `offset` every `interval` until `cond` is satisfied by its value, and
/// returns that value. Gives up with [`RegisterError::Timeout`] after `timeout`.
pub fn poll_timeout<R, F>(
    regs: &R,
    offset: u32,
    cond: F,
    interval: Duration,
    timeout: Duration,
) -> Result<u32, RegisterError>
where
    R: RegisterAccess + ?Sized,
    F: Fn(u32) -> bool,
{
    let start = Instant::now();

    loop {
        let value = regs.read(offset);
        if cond(value) {
            return Ok(value);
        }

        if start.elapsed() >= timeout {
            return Err(RegisterError::Timeout { offset, value });
        }

        sleep(interval);
    }
}

/// Kind of a recorded register write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteKind {
    Relaxed,
    Ordered,
}

/// A register write recorded by [`RegisterBank`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterWrite {
    pub offset: u32,
    pub value: u32,
    pub kind: WriteKind,
}

/// In-memory register file.
///
/// Writes go through [`RegisterAccess`] and are recorded in a write log. The hardware side of the
/// registers (status bits and such) is simulated with [`RegisterBank::set`], which is not logged.
#[derive(Clone, Debug)]
pub struct RegisterBank {
    words: Vec<u32>,
    log: Vec<RegisterWrite>,
}

impl RegisterBank {
    /// Creates a zeroed register file covering `size` bytes of register space.
    pub fn new(size: u32) -> Self {
        Self {
            words: vec![0; (size / 4) as usize],
            log: Vec::new(),
        }
    }

    fn index(&self, offset: u32) -> Option<usize> {
        let index = (offset / 4) as usize;
        if offset % 4 != 0 || index >= self.words.len() {
            log::warn!("access to invalid register offset {:#05x}", offset);
            None
        } else {
            Some(index)
        }
    }

    /// Sets the register at `offset` as the hardware would, without recording a write.
    pub fn set(&mut self, offset: u32, value: u32) {
        if let Some(index) = self.index(offset) {
            self.words[index] = value;
        }
    }

    /// Returns the writes performed since creation or the last call to [`Self::clear_log`].
    pub fn writes(&self) -> &[RegisterWrite] {
        &self.log
    }

    /// Returns the writes performed on the register at `offset`, in order.
    pub fn writes_to(&self, offset: u32) -> impl Iterator<Item = u32> + '_ {
        self.log.iter().filter(move |w| w.offset == offset).map(|w| w.value)
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Returns a CRC32 of the write log, as a cheap fingerprint of a register program.
    pub fn log_crc32(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        let mut buf = [0u8; 9];

        for write in &self.log {
            LittleEndian::write_u32(&mut buf[0..4], write.offset);
            LittleEndian::write_u32(&mut buf[4..8], write.value);
            buf[8] = match write.kind {
                WriteKind::Relaxed => 0,
                WriteKind::Ordered => 1,
            };
            hasher.update(&buf);
        }

        hasher.finalize()
    }

    fn record(&mut self, offset: u32, value: u32, kind: WriteKind) {
        if let Some(index) = self.index(offset) {
            self.words[index] = value;
            self.log.push(RegisterWrite {
                offset,
                value,
                kind,
            });
        }
    }
}

impl RegisterAccess for RegisterBank {
    fn read(&self, offset: u32) -> u32 {
        self.index(offset).map(|i| self.words[i]).unwrap_or(0)
    }

    fn write_relaxed(&mut self, offset: u32, value: u32) {
        self.record(offset, value, WriteKind::Relaxed)
    }

    fn write(&mut self, offset: u32, value: u32) {
        self.record(offset, value, WriteKind::Ordered)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn field_read_modify_write() {
        let mut regs = RegisterBank::new(0x100);
        regs.set(0x14, 0xffff_ffff);

        let field = RegisterField::new(0x14, 26, 0x3f);
        field.write(&mut regs, 0x15);

        assert_eq!(regs.read(0x14), 0x57ff_ffff);
        assert_eq!(field.read(&regs), 0x15);
        assert_eq!(
            regs.writes(),
            &[RegisterWrite {
                offset: 0x14,
                value: 0x57ff_ffff,
                kind: WriteKind::Relaxed
            }]
        );
    }

    #[test]
    fn field_drops_out_of_range_bits() {
        let mut regs = RegisterBank::new(0x100);
        let field = RegisterField::new(0x80, 6, 0x3f);

        field.write(&mut regs, 0x1ff);
        assert_eq!(regs.read(0x80), 0x3f << 6);

        // Negative values wrap into the field, as signed hardware fields expect.
        let field = RegisterField::new(0x84, 0, 0x7f);
        field.write(&mut regs, -2i32 as u32);
        assert_eq!(regs.read(0x84), 0x7e);
    }

    #[test]
    fn full_width_field() {
        let mut regs = RegisterBank::new(0x100);
        let field = RegisterField::new(0x30, 0, 0xffff_ffff);

        field.write(&mut regs, 0xdead_beef);
        assert_eq!(field.read(&regs), 0xdead_beef);
    }

    #[test]
    fn invalid_offsets_are_ignored() {
        let mut regs = RegisterBank::new(0x10);

        regs.write(0x10, 1);
        regs.write(0x02, 1);
        assert_eq!(regs.read(0x10), 0);
        assert!(regs.writes().is_empty());
    }

    #[test]
    fn crc_tracks_program() {
        let mut a = RegisterBank::new(0x100);
        let mut b = RegisterBank::new(0x100);

        a.write_relaxed(0x8, 1);
        b.write_relaxed(0x8, 1);
        assert_eq!(a.log_crc32(), b.log_crc32());

        a.write(0x4, 1);
        b.write_relaxed(0x4, 1);
        assert_ne!(a.log_crc32(), b.log_crc32());
    }

    #[test]
    fn poll() {
        let mut regs = RegisterBank::new(0x100);
        regs.set(0x4, 0x1000);

        let value = poll_timeout(
            &regs,
            0x4,
            |v| v & 0x1000 != 0,
            Duration::from_micros(1),
            Duration::from_millis(1),
        );
        assert_eq!(value, Ok(0x1000));

        let value = poll_timeout(
            &regs,
            0x4,
            |v| v & 0x1 != 0,
            Duration::from_micros(10),
            Duration::from_millis(1),
        );
        assert_eq!(
            value,
            Err(RegisterError::Timeout {
                offset: 0x4,
                value: 0x1000
            })
        );
    }
}
