// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Location of the VP8 partitions within a compressed frame.
//!
//! A VP8 frame is made of an uncompressed data chunk, the first (control) partition, the sizes of
//! all DCT partitions but the last one, and the DCT partitions themselves. Stream readers of
//! Hantro-style hardware can only start at 8-byte aligned addresses, so each partition is described
//! by an aligned base address and the bit offset at which the data actually starts.

use byteorder::ByteOrder;
use byteorder::LittleEndian;
use thiserror::Error;

use crate::codec::vp8::frame::INTER_FRAME_CHUNK_SIZE;
use crate::codec::vp8::frame::KEY_FRAME_CHUNK_SIZE;
use crate::codec::vp8::frame::MAX_DCT_PARTITIONS;
use crate::device::dma::DmaAddr;
use crate::utils::align_down;

/// Alignment required for the base address of stream readers.
pub const STREAM_ALIGNMENT: u32 = 8;

/// The first partition size is coded on 19 bits.
pub const MAX_FIRST_PART_SIZE: u32 = (1 << 19) - 1;

/// Size of each entry of the partition sizes area.
const PARTITION_SIZE_BYTES: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("invalid number of DCT partitions {0}")]
    InvalidPartitionCount(u8),
    #[error("invalid first partition size {0}")]
    InvalidFirstPartitionSize(u32),
    #[error("frame header ({header_bits} bits) does not fit in the first partition ({first_part_size} bytes)")]
    HeaderOverflow {
        header_bits: u32,
        first_part_size: u32,
    },
    #[error("partition sizes area truncated: {needed} bytes needed, {available} available")]
    Truncated { needed: usize, available: usize },
}

/// Everything from a frame header that is needed to locate its partitions.
#[derive(Clone, Copy, Debug)]
pub struct PartitionParams<'a> {
    pub key_frame: bool,
    pub first_part_size: u32,
    /// Size of the frame header within the first partition, in bits.
    pub header_bits: u32,
    pub num_dct_parts: u8,
    pub partition_size: &'a [u32; MAX_DCT_PARTITIONS],
}

/// An aligned window of the stream buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PartitionLocation {
    /// Stream address, aligned to [`STREAM_ALIGNMENT`].
    pub base: DmaAddr,
    /// Offset in bits from `base` at which the partition data starts.
    pub start_bit: u32,
}

/// Location of all the partitions of a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionLayout {
    /// Start of the macroblock data of the control partition, i.e. right after the frame header.
    pub control: PartitionLocation,
    /// Number of bytes to read from `control.base` to reach the end of the control partition.
    pub control_len: u32,
    /// Location of each DCT partition.
    pub dct: Vec<PartitionLocation>,
    /// Number of bytes to read from the aligned start of the partition sizes area to reach the
    /// end of the last DCT partition.
    pub dct_len: u32,
}

impl<'a> PartitionParams<'a> {
    /// Size of the uncompressed data chunk preceding the first partition.
    pub fn first_part_offset(&self) -> u32 {
        if self.key_frame {
            KEY_FRAME_CHUNK_SIZE
        } else {
            INTER_FRAME_CHUNK_SIZE
        }
    }

    pub fn dct_part_sizes(&self) -> &'a [u32] {
        let num = (self.num_dct_parts as usize).min(MAX_DCT_PARTITIONS);
        &self.partition_size[..num]
    }

    /// Checks that the partitions described by these parameters can be located.
    pub fn check(&self) -> Result<(), PartitionError> {
        if !matches!(self.num_dct_parts, 1 | 2 | 4 | 8) {
            return Err(PartitionError::InvalidPartitionCount(self.num_dct_parts));
        }

        if self.first_part_size > MAX_FIRST_PART_SIZE {
            return Err(PartitionError::InvalidFirstPartitionSize(
                self.first_part_size,
            ));
        }

        if self.header_bits / 8 > self.first_part_size {
            return Err(PartitionError::HeaderOverflow {
                header_bits: self.header_bits,
                first_part_size: self.first_part_size,
            });
        }

        Ok(())
    }

    /// Computes the location of every partition of a frame whose data starts at `src`.
    pub fn layout(&self, src: DmaAddr) -> Result<PartitionLayout, PartitionError> {
        self.check()?;

        let first_part_offset = self.first_part_offset();

        // The macroblock data starts one byte after the end of the header, as the boolean decoder
        // state handed to the hardware already covers it.
        let mb_offset_bits = first_part_offset * 8 + self.header_bits + 8;
        let mb_offset_bytes = mb_offset_bits / 8;
        let mb_addr = src.wrapping_add(mb_offset_bytes);
        let mb_misalign = mb_addr & (STREAM_ALIGNMENT - 1);

        let control = PartitionLocation {
            base: align_down(mb_addr, STREAM_ALIGNMENT),
            start_bit: mb_misalign * 8 + mb_offset_bits % 8,
        };
        let control_len = (self.first_part_size + mb_misalign)
            .saturating_sub(mb_offset_bytes - first_part_offset);

        let dct_sizes = self.dct_part_sizes();
        let dct_size_part_size = (dct_sizes.len() as u32 - 1) * PARTITION_SIZE_BYTES as u32;
        let dct_part_offset = first_part_offset + self.first_part_size;
        let dct_misalign = src.wrapping_add(dct_part_offset) & (STREAM_ALIGNMENT - 1);

        let mut count = 0u32;
        let mut dct = Vec::with_capacity(dct_sizes.len());
        for size in dct_sizes {
            let addr = src
                .wrapping_add(dct_part_offset)
                .wrapping_add(dct_size_part_size)
                .wrapping_add(count);
            dct.push(PartitionLocation {
                base: align_down(addr, STREAM_ALIGNMENT),
                start_bit: (addr & (STREAM_ALIGNMENT - 1)) * 8,
            });
            count = count.wrapping_add(*size);
        }

        let dct_len = count
            .wrapping_add(dct_size_part_size)
            .wrapping_add(dct_misalign);

        Ok(PartitionLayout {
            control,
            control_len,
            dct,
            dct_len,
        })
    }
}

/// Reads the sizes of the DCT partitions from `data`, which starts with the partition sizes area
/// and extends to the end of the frame. The size of the last partition is not coded and is made
/// of the remaining bytes.
pub fn read_partition_sizes(
    data: &[u8],
    num_dct_parts: u8,
) -> Result<[u32; MAX_DCT_PARTITIONS], PartitionError> {
    if !matches!(num_dct_parts, 1 | 2 | 4 | 8) {
        return Err(PartitionError::InvalidPartitionCount(num_dct_parts));
    }

    let num = num_dct_parts as usize;
    let sizes_len = (num - 1) * PARTITION_SIZE_BYTES;
    let truncated = |needed| PartitionError::Truncated {
        needed,
        available: data.len(),
    };

    let mut sizes = [0u32; MAX_DCT_PARTITIONS];
    let mut total = sizes_len;

    for (i, chunk) in data
        .get(..sizes_len)
        .ok_or_else(|| truncated(sizes_len))?
        .chunks_exact(PARTITION_SIZE_BYTES)
        .enumerate()
    {
        sizes[i] = LittleEndian::read_u24(chunk);
        total += sizes[i] as usize;
    }

    if total > data.len() {
        return Err(truncated(total));
    }

    sizes[num - 1] = (data.len() - total) as u32;

    Ok(sizes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(key_frame: bool, sizes: &[u32; 8], num_dct_parts: u8) -> PartitionParams<'_> {
        PartitionParams {
            key_frame,
            first_part_size: 100,
            header_bits: 8,
            num_dct_parts,
            partition_size: sizes,
        }
    }

    #[test]
    fn key_frame_control_partition() {
        let sizes = [50, 0, 0, 0, 0, 0, 0, 0];
        let layout = params(true, &sizes, 1).layout(0x1000).unwrap();

        // 96 bits into the frame: 12 bytes, i.e. 4 bytes past the aligned base.
        assert_eq!(
            layout.control,
            PartitionLocation {
                base: 0x1008,
                start_bit: 32
            }
        );
        assert_eq!(layout.control_len, 102);
    }

    #[test]
    fn inter_frame_control_partition() {
        let sizes = [50, 0, 0, 0, 0, 0, 0, 0];
        let layout = params(false, &sizes, 1).layout(0x1000).unwrap();

        assert_eq!(
            layout.control,
            PartitionLocation {
                base: 0x1000,
                start_bit: 40
            }
        );
        assert_eq!(layout.control_len, 103);
    }

    #[test]
    fn dct_partitions() {
        let sizes = [5, 6, 7, 8, 9, 10, 11, 12];

        for num in [1u8, 2, 4, 8] {
            let p = params(true, &sizes, num);
            let layout = p.layout(0x2000).unwrap();
            let n = num as u32;
            let sizes_area = (n - 1) * 3;

            assert_eq!(layout.dct.len(), num as usize);
            // The DCT area starts at 110, 6 bytes past an aligned address.
            let sum: u32 = sizes[..num as usize].iter().sum();
            assert_eq!(layout.dct_len, sum + sizes_area + 6);

            let mut offset = 110 + sizes_area;
            for (i, loc) in layout.dct.iter().enumerate() {
                let addr = 0x2000 + offset;
                assert_eq!(loc.base % STREAM_ALIGNMENT, 0);
                assert_eq!(loc.base + loc.start_bit / 8, addr);
                assert_eq!(loc.start_bit % 8, 0);
                offset += sizes[i];
            }
        }
    }

    #[test]
    fn unaligned_source() {
        let sizes = [50, 0, 0, 0, 0, 0, 0, 0];
        let layout = params(true, &sizes, 1).layout(0x1003).unwrap();

        assert_eq!(layout.control.base, 0x1008);
        assert_eq!(layout.control.start_bit, 7 * 8);
        assert_eq!(layout.control.base * 8 + layout.control.start_bit, 0x1003 * 8 + 96);
    }

    #[test]
    fn invalid_params() {
        let sizes = [0; 8];
        assert_eq!(
            params(true, &sizes, 3).layout(0),
            Err(PartitionError::InvalidPartitionCount(3))
        );

        let p = PartitionParams {
            header_bits: 101 * 8,
            ..params(true, &sizes, 1)
        };
        assert!(matches!(
            p.layout(0),
            Err(PartitionError::HeaderOverflow { .. })
        ));

        let p = PartitionParams {
            first_part_size: 1 << 19,
            ..params(true, &sizes, 1)
        };
        assert_eq!(
            p.check(),
            Err(PartitionError::InvalidFirstPartitionSize(1 << 19))
        );
    }

    #[test]
    fn partition_sizes() {
        // Three coded sizes, then 4 + 2 + 3 + 5 bytes of partition data.
        let mut data = vec![4, 0, 0, 2, 0, 0, 3, 0, 0];
        data.extend_from_slice(&[0xaa; 14]);

        let sizes = read_partition_sizes(&data, 4).unwrap();
        assert_eq!(sizes[..4], [4, 2, 3, 5]);
        assert_eq!(sizes[4..], [0; 4]);

        assert_eq!(
            read_partition_sizes(&data[..12], 4),
            Err(PartitionError::Truncated {
                needed: 18,
                available: 12
            })
        );
        assert_eq!(
            read_partition_sizes(&[1, 0], 2),
            Err(PartitionError::Truncated {
                needed: 3,
                available: 2
            })
        );
        assert_eq!(
            read_partition_sizes(&[0x10, 0, 0, 0], 2),
            Err(PartitionError::Truncated {
                needed: 19,
                available: 4
            })
        );

        let sizes = read_partition_sizes(&[0u8; 10], 1).unwrap();
        assert_eq!(sizes[0], 10);
    }
}
