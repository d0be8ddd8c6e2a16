// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Description of a decoded VP8 frame.
//!
//! A [`Frame`] is what the bitstream parser hands over for each compressed frame: the frame header
//! proper, the segmentation and loop filter adjustment state live at that frame, and the timestamps
//! of the reference frames it predicts from. It is immutable once built, and everything a stateless
//! decoder needs to program the hardware is derived from it.

use enumn::N;
use thiserror::Error;

use crate::codec::vp8::partitions::PartitionError;
use crate::codec::vp8::partitions::PartitionParams;

/// Size of the uncompressed data chunk preceding the first partition of key frames: 3 bytes of
/// frame tag, 3 bytes of start code and 4 bytes of dimensions.
pub const KEY_FRAME_CHUNK_SIZE: u32 = 10;
/// Size of the uncompressed data chunk preceding the first partition of inter frames (frame tag
/// only).
pub const INTER_FRAME_CHUNK_SIZE: u32 = 3;

/// Maximum number of DCT partitions.
pub const MAX_DCT_PARTITIONS: usize = 8;

/// Bitstream version, as found in the frame tag.
#[derive(N, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Version {
    /// Bicubic (6-tap) reconstruction filter and normal loop filter.
    Bicubic = 0,
    /// Bilinear reconstruction filter and simple loop filter.
    Bilinear = 1,
    /// Bilinear reconstruction filter and no loop filter.
    BilinearNoLoopFilter = 2,
    /// Full-pixel motion vectors and no loop filter.
    FullPixel = 3,
}

impl Version {
    /// Whether motion compensation only uses the bilinear filter, in which case the 6-tap filter
    /// coefficients are not needed.
    pub fn bilinear_mc(self) -> bool {
        self != Version::Bicubic
    }
}

/// Dequantization indices as parsed from the quant_indices() syntax.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuantIndices {
    /// The dequantization table index used for the luma AC coefficients (and
    /// other coefficient groups if no delta value is present).
    pub y_ac_qi: u8,
    /// Indicates the delta value that is added to the baseline index to obtain
    /// the luma DC coefficient dequantization index.
    pub y_dc_delta: i8,
    /// Indicates the delta value that is added to the baseline index to obtain
    /// the Y2 block DC coefficient dequantization index.
    pub y2_dc_delta: i8,
    /// Indicates the delta value that is added to the baseline index to obtain
    /// the Y2 block AC coefficient dequantization index.
    pub y2_ac_delta: i8,
    /// Indicates the delta value that is added to the baseline index to obtain
    /// the chroma DC coefficient dequantization index.
    pub uv_dc_delta: i8,
    /// Indicates the delta value that is added to the baseline index to obtain
    /// the chroma AC coefficient dequantization index.
    pub uv_ac_delta: i8,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MbLfAdjustments {
    /// Indicates if the MB-level loop filter adjustment (based on the used
    /// reference frame and coding mode) is on for the current frame.
    pub loop_filter_adj_enable: bool,
    /// Indicates the adjustment delta value corresponding to a certain used
    /// reference frame.
    pub ref_frame_delta: [i8; 4],
    /// Indicates the adjustment delta value corresponding to a certain MB
    /// prediction mode
    pub mb_mode_delta: [i8; 4],
}

/// How the per-segment quantizer and loop filter values are to be interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SegmentFeatureMode {
    /// Values are added to the frame-level quantizer index and loop filter level.
    #[default]
    Delta,
    /// Values replace the frame-level quantizer index and loop filter level.
    Absolute,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Segmentation {
    /// Enables the segmentation feature for the current frame.
    pub segmentation_enabled: bool,
    /// Determines if the MB segmentation map is updated in the current frame.
    pub update_mb_segmentation_map: bool,
    /// Interpretation of the quantizer and loop filter update values.
    pub segment_feature_mode: SegmentFeatureMode,
    /// Quantizer update value of each segment.
    pub quantizer_update_value: [i8; 4],
    /// Loop filter level update value of each segment.
    pub lf_update_value: [i8; 4],
    /// The branch probabilities of the segment id decoding tree.
    pub segment_prob: [u8; 3],
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModeProbs {
    /// Branch probabilities of the luma intra prediction mode decoding tree,
    /// kept live between frames.
    pub intra_16x16_prob: [u8; 4],
    /// Branch probabilities of the chroma intra prediction mode decoding tree,
    /// kept live between frames.
    pub intra_chroma_prob: [u8; 3],
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    /// Indicates if the current frame is a key frame or not.
    pub key_frame: bool,
    /// Determines the bitstream version. See [`Version`].
    pub version: u8,
    /// Determines the size of the first partition (control partition) excluding
    /// the size of the Uncompressed Data Chunk
    pub first_part_size: u32,
    /// The size in bits of the Frame Header within the first partition, i.e. the offset at which
    /// the per-macroblock data starts.
    pub header_size: u32,

    /// Determines whether the normal or the simple loop filter is used.
    pub filter_type: bool,
    /// Controls the deblocking filter.
    pub loop_filter_level: u8,
    /// Controls the deblocking filter.
    pub sharpness_level: u8,

    /// Number of separate partitions containing the DCT coefficients of the macroblocks. One of
    /// 1, 2, 4 or 8.
    pub num_dct_parts: u8,
    /// Size of each DCT partition, in bytes. Only the first `num_dct_parts` entries are
    /// meaningful.
    pub partition_size: [u32; MAX_DCT_PARTITIONS],

    /// Dequantizer indices.
    pub quant_indices: QuantIndices,

    /// Controls the sign of motion vectors when the golden frame is referenced.
    pub sign_bias_golden: bool,
    /// Controls the sign of motion vectors when the alternate frame is
    /// referenced.
    pub sign_bias_alternate: bool,

    /// The new branch probability for the DCT/WHT tree.
    pub coeff_prob: [[[[u8; 11]; 3]; 8]; 4],
    /// MV decoding probability.
    pub mv_prob: [[u8; 19]; 2],

    /// Enables or disables the skipping of macroblocks containing no non-zero
    /// coefficients.
    pub mb_no_coeff_skip: bool,
    /// The probability that the macroblock is not skipped (flag indicating
    /// skipped macroblock is false).
    pub prob_skip_false: u8,
    /// The probability of an intra macroblock.
    pub prob_intra: u8,
    /// The probability that the last reference frame is used for inter
    /// prediction.
    pub prob_last: u8,
    /// The probability that the golden reference frame is used for inter
    /// prediction.
    pub prob_golden: u8,
    /// Branch probabilities kept live across frames.
    pub mode_probs: ModeProbs,

    /// Boolean decoder `range` after parsing the frame header.
    pub bd_range: u8,
    /// Boolean decoder `value` after parsing the frame header.
    pub bd_value: u8,
    /// Boolean decoder `count` after parsing the frame header.
    pub bd_count: u8,
}

impl Header {
    /// Returns the number of separate partitions containing the DCT coefficients of the
    /// macroblocks.
    pub fn num_dct_partitions(&self) -> usize {
        self.num_dct_parts as usize
    }

    /// Returns the size of the uncompressed data chunk preceding the first partition.
    pub fn data_chunk_size(&self) -> u32 {
        if self.key_frame {
            KEY_FRAME_CHUNK_SIZE
        } else {
            INTER_FRAME_CHUNK_SIZE
        }
    }

    /// Returns the total size of the encoded frame in bytes, as computed from the header.
    pub fn frame_len(&self) -> usize {
        // Uncompressed chunk size.
        std::iter::once(self.data_chunk_size() as usize)
            // Size of first partition.
            .chain(std::iter::once(self.first_part_size as usize))
            // Size of the partitions description area.
            .chain(std::iter::once(self.num_dct_partitions().saturating_sub(1) * 3))
            // Size of other DCT partitions.
            .chain(
                self.partition_size
                    .iter()
                    .take(self.num_dct_partitions())
                    .map(|s| *s as usize),
            )
            .sum()
    }

    /// Returns the bitstream version, if valid.
    pub fn version(&self) -> Option<Version> {
        Version::n(self.version)
    }

    /// Returns the parameters needed to locate the partitions of this frame.
    pub fn partition_params(&self) -> PartitionParams<'_> {
        PartitionParams {
            key_frame: self.key_frame,
            first_part_size: self.first_part_size,
            header_bits: self.header_size,
            num_dct_parts: self.num_dct_parts,
            partition_size: &self.partition_size,
        }
    }
}

/// Timestamps of the reference frames used by a frame. A timestamp of 0 means the reference is not
/// used.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct References {
    pub last_frame_ts: u64,
    pub golden_frame_ts: u64,
    pub alt_frame_ts: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("unsupported bitstream version {0}")]
    InvalidVersion(u8),
    #[error("invalid partition layout: {0}")]
    Partitions(#[from] PartitionError),
}

/// A decoded VP8 frame, as consumed by the stateless decoders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    pub segmentation: Segmentation,
    pub mb_lf_adjust: MbLfAdjustments,
    pub refs: References,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            header: Header {
                num_dct_parts: 1,
                ..Default::default()
            },
            segmentation: Default::default(),
            mb_lf_adjust: Default::default(),
            refs: Default::default(),
        }
    }
}

impl Frame {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn set_header(&mut self, header: Header) -> &mut Self {
        self.header = header;
        self
    }

    pub fn set_segmentation(&mut self, segmentation: Segmentation) -> &mut Self {
        self.segmentation = segmentation;
        self
    }

    pub fn set_mb_lf_adjust(&mut self, mb_lf_adjust: MbLfAdjustments) -> &mut Self {
        self.mb_lf_adjust = mb_lf_adjust;
        self
    }

    pub fn set_references(
        &mut self,
        last_frame_ts: u64,
        golden_frame_ts: u64,
        alt_frame_ts: u64,
    ) -> &mut Self {
        self.refs = References {
            last_frame_ts,
            golden_frame_ts,
            alt_frame_ts,
        };
        self
    }

    /// Checks that this frame can be programmed into the hardware.
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.header.version().is_none() {
            return Err(FrameError::InvalidVersion(self.header.version));
        }

        self.header.partition_params().check()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_frame_is_valid() {
        let mut frame = Frame::new();
        frame.header.first_part_size = 16;
        assert_eq!(frame.header.num_dct_partitions(), 1);
        assert_eq!(frame.validate(), Ok(()));
    }

    #[test]
    fn partition_count() {
        let mut frame = Frame::new();
        frame.header.first_part_size = 16;

        for count in [1u8, 2, 4, 8] {
            frame.header.num_dct_parts = count;
            assert_eq!(frame.validate(), Ok(()));
        }

        for count in [0u8, 3, 5, 9, 16] {
            frame.header.num_dct_parts = count;
            assert_eq!(
                frame.validate(),
                Err(FrameError::Partitions(PartitionError::InvalidPartitionCount(
                    count
                )))
            );
        }
    }

    #[test]
    fn version() {
        let mut frame = Frame::new();
        frame.header.first_part_size = 16;
        frame.header.version = 3;
        assert_eq!(frame.validate(), Ok(()));
        assert_eq!(frame.header.version(), Some(Version::FullPixel));
        assert!(Version::Bilinear.bilinear_mc());
        assert!(!Version::Bicubic.bilinear_mc());

        frame.header.version = 4;
        assert_eq!(frame.validate(), Err(FrameError::InvalidVersion(4)));
    }

    #[test]
    fn frame_len() {
        let mut header = Header {
            key_frame: true,
            first_part_size: 100,
            num_dct_parts: 4,
            partition_size: [10, 20, 30, 40, 99, 99, 99, 99],
            ..Default::default()
        };
        assert_eq!(header.frame_len(), 10 + 100 + 9 + 100);

        header.key_frame = false;
        assert_eq!(header.frame_len(), 3 + 100 + 9 + 100);
    }
}
