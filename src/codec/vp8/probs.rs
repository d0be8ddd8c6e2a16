// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Probability table consumed by Hantro VP8 decoders, and motion compensation filter taps.

use crate::codec::vp8::frame::Frame;
use crate::codec::vp8::frame::ModeProbs;

/// Size of the packed probability table, in bytes.
pub const PROB_TABLE_SIZE: usize = 1208;

const MODE_PROBS_OFFSET: usize = 8;
const MV_PROBS_OFFSET: usize = 16;
const COEFF_HEADER_OFFSET: usize = 56;
const COEFF_FOOTER_OFFSET: usize = 440;

/// Coefficient probabilities stored in the header section of the table, per block type, band and
/// context.
const COEFF_HEADER_PROBS: usize = 4;

/// Coefficients of the 6-tap sub-pixel interpolation filters, one row per eighth-pixel position.
pub const MC_FILTER: [[i32; 6]; 8] = [
    [0, 0, 128, 0, 0, 0],
    [0, -6, 123, 12, -1, 0],
    [2, -11, 108, 36, -8, 1],
    [0, -9, 93, 50, -6, 0],
    [3, -16, 77, 77, -16, 3],
    [0, -6, 50, 93, -9, 0],
    [1, -8, 36, 108, -11, 2],
    [0, -1, 12, 123, -6, 0],
];

/// The probabilities carried by a [`ProbabilityTable`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Probabilities {
    pub prob_skip_false: u8,
    pub prob_intra: u8,
    pub prob_last: u8,
    pub prob_golden: u8,
    pub segment_prob: [u8; 3],
    pub mode_probs: ModeProbs,
    pub mv_prob: [[u8; 19]; 2],
    pub coeff_prob: [[[[u8; 11]; 3]; 8]; 4],
}

impl From<&Frame> for Probabilities {
    fn from(frame: &Frame) -> Self {
        let hdr = &frame.header;

        Self {
            prob_skip_false: hdr.prob_skip_false,
            prob_intra: hdr.prob_intra,
            prob_last: hdr.prob_last,
            prob_golden: hdr.prob_golden,
            segment_prob: frame.segmentation.segment_prob,
            mode_probs: hdr.mode_probs.clone(),
            mv_prob: hdr.mv_prob,
            coeff_prob: hdr.coeff_prob,
        }
    }
}

/// Probability table in the layout expected by the hardware.
///
/// The table is made of 8-byte rows. Unused bytes are always zero.
#[derive(Clone, PartialEq, Eq)]
pub struct ProbabilityTable([u8; PROB_TABLE_SIZE]);

impl std::fmt::Debug for ProbabilityTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbabilityTable")
            .field("crc32", &crc32fast::hash(&self.0))
            .finish()
    }
}

impl ProbabilityTable {
    /// Packs the probabilities of `frame`.
    pub fn pack(frame: &Frame) -> Self {
        Self::from_probabilities(&Probabilities::from(frame))
    }

    pub fn from_probabilities(probs: &Probabilities) -> Self {
        let mut table = [0u8; PROB_TABLE_SIZE];

        table[0] = probs.prob_skip_false;
        table[1] = probs.prob_intra;
        table[2] = probs.prob_last;
        table[3] = probs.prob_golden;
        table[4..7].copy_from_slice(&probs.segment_prob);

        let modes = &mut table[MODE_PROBS_OFFSET..MODE_PROBS_OFFSET + 8];
        modes[0..4].copy_from_slice(&probs.mode_probs.intra_16x16_prob);
        modes[4..7].copy_from_slice(&probs.mode_probs.intra_chroma_prob);

        let mv = &probs.mv_prob;
        let mut pos = MV_PROBS_OFFSET;
        for byte in [
            mv[0][0], mv[1][0], mv[0][1], mv[1][1], mv[0][17], mv[0][18], mv[1][17], mv[1][18],
        ] {
            table[pos] = byte;
            pos += 1;
        }
        // Long vector bit probabilities.
        for comp in mv {
            table[pos..pos + 8].copy_from_slice(&comp[9..17]);
            pos += 8;
        }
        // Short vector tree probabilities, padded to a full row.
        for comp in mv {
            table[pos..pos + 7].copy_from_slice(&comp[2..9]);
            pos += 8;
        }
        debug_assert_eq!(pos, COEFF_HEADER_OFFSET);

        let mut header = COEFF_HEADER_OFFSET;
        let mut footer = COEFF_FOOTER_OFFSET;
        for ctx in probs.coeff_prob.iter().flatten().flatten() {
            table[header..header + COEFF_HEADER_PROBS].copy_from_slice(&ctx[..COEFF_HEADER_PROBS]);
            header += COEFF_HEADER_PROBS;
            table[footer..footer + 7].copy_from_slice(&ctx[COEFF_HEADER_PROBS..]);
            footer += 8;
        }
        debug_assert_eq!(header, COEFF_FOOTER_OFFSET);
        debug_assert_eq!(footer, PROB_TABLE_SIZE);

        Self(table)
    }

    /// Reads the probabilities back from the table.
    pub fn unpack(&self) -> Probabilities {
        let table = &self.0;
        let mut probs = Probabilities {
            prob_skip_false: table[0],
            prob_intra: table[1],
            prob_last: table[2],
            prob_golden: table[3],
            ..Default::default()
        };
        probs.segment_prob.copy_from_slice(&table[4..7]);
        probs
            .mode_probs
            .intra_16x16_prob
            .copy_from_slice(&table[MODE_PROBS_OFFSET..MODE_PROBS_OFFSET + 4]);
        probs
            .mode_probs
            .intra_chroma_prob
            .copy_from_slice(&table[MODE_PROBS_OFFSET + 4..MODE_PROBS_OFFSET + 7]);

        let row = &table[MV_PROBS_OFFSET..MV_PROBS_OFFSET + 8];
        let mv = &mut probs.mv_prob;
        mv[0][0] = row[0];
        mv[1][0] = row[1];
        mv[0][1] = row[2];
        mv[1][1] = row[3];
        mv[0][17] = row[4];
        mv[0][18] = row[5];
        mv[1][17] = row[6];
        mv[1][18] = row[7];

        let mut pos = MV_PROBS_OFFSET + 8;
        for comp in mv.iter_mut() {
            comp[9..17].copy_from_slice(&table[pos..pos + 8]);
            pos += 8;
        }
        for comp in mv.iter_mut() {
            comp[2..9].copy_from_slice(&table[pos..pos + 7]);
            pos += 8;
        }

        let mut header = COEFF_HEADER_OFFSET;
        let mut footer = COEFF_FOOTER_OFFSET;
        for ctx in probs.coeff_prob.iter_mut().flatten().flatten() {
            ctx[..COEFF_HEADER_PROBS].copy_from_slice(&table[header..header + COEFF_HEADER_PROBS]);
            header += COEFF_HEADER_PROBS;
            ctx[COEFF_HEADER_PROBS..].copy_from_slice(&table[footer..footer + 7]);
            footer += 8;
        }

        probs
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}
