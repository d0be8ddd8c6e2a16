// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Auxiliary buffers shared by the Hantro VP8 decoders.

use crate::codec::vp8::probs::PROB_TABLE_SIZE;
use crate::device::dma::DmaAllocator;
use crate::device::dma::DmaBuffer;
use crate::device::dma::DmaError;
use crate::utils::div_round_up;
use crate::utils::round_up;
use crate::Resolution;

/// Width and height of a macroblock, in pixels.
pub const MB_DIM: u32 = 16;

pub fn mb_width(width: u32) -> u32 {
    div_round_up(width, MB_DIM)
}

pub fn mb_height(height: u32) -> u32 {
    div_round_up(height, MB_DIM)
}

/// Size of the segment map for a picture of `resolution`. The hardware stores the segment ids of
/// four macroblocks per byte.
pub fn segment_map_size(resolution: Resolution) -> usize {
    let mbs = mb_width(resolution.width) * mb_height(resolution.height);
    round_up(div_round_up(mbs, 4), 64) as usize
}

/// DMA buffers a VP8 decoding context keeps across frames.
#[derive(Debug)]
pub struct Vp8AuxBuffers {
    /// Segment ids of the macroblocks, kept across inter frames.
    pub segment_map: DmaBuffer,
    /// Probability table, rewritten for every frame.
    pub prob_tbl: DmaBuffer,
}

impl Vp8AuxBuffers {
    /// Allocates the auxiliary buffers for decoding pictures of `resolution`. Nothing remains
    /// allocated on failure.
    pub fn new(alloc: &mut dyn DmaAllocator, resolution: Resolution) -> Result<Self, DmaError> {
        let segment_map = alloc.alloc(segment_map_size(resolution))?;

        let prob_tbl = match alloc.alloc(PROB_TABLE_SIZE) {
            Ok(prob_tbl) => prob_tbl,
            Err(e) => {
                alloc.free(segment_map);
                return Err(e);
            }
        };

        log::debug!(
            "VP8 auxiliary buffers for {}x{}: segment map {} bytes at {:#010x}, probabilities at {:#010x}",
            resolution.width,
            resolution.height,
            segment_map.size(),
            segment_map.dma(),
            prob_tbl.dma()
        );

        Ok(Self {
            segment_map,
            prob_tbl,
        })
    }

    pub fn free(self, alloc: &mut dyn DmaAllocator) {
        alloc.free(self.prob_tbl);
        alloc.free(self.segment_map);
    }
}
