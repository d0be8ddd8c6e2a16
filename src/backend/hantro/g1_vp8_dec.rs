// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! VP8 register programmer of the G1 core.

use anyhow::anyhow;

use crate::backend::hantro::g1_regs::*;
use crate::backend::hantro::vp8::mb_height;
use crate::backend::hantro::vp8::mb_width;
use crate::backend::hantro::vp8::Vp8AuxBuffers;
use crate::codec::vp8::frame::Frame;
use crate::codec::vp8::frame::Header;
use crate::codec::vp8::frame::SegmentFeatureMode;
use crate::codec::vp8::partitions::read_partition_sizes;
use crate::codec::vp8::partitions::PartitionLayout;
use crate::codec::vp8::probs::ProbabilityTable;
use crate::codec::vp8::probs::MC_FILTER;
use crate::codec::vp8::probs::PROB_TABLE_SIZE;
use crate::decoder::m2m::format::PixFormat;
use crate::decoder::m2m::CodecOps;
use crate::decoder::m2m::M2mError;
use crate::decoder::m2m::MissingReference;
use crate::decoder::m2m::RefSlot;
use crate::decoder::m2m::RunContext;
use crate::decoder::m2m::RunReport;
use crate::device::dma::DmaAddr;
use crate::device::dma::DmaAllocator;
use crate::device::regs::RegisterAccess;

/// Per-segment value derived from a frame-level value, following the segmentation mode.
fn segment_values(frame: &Frame, base: u8, updates: &[i8; 4], max: i32) -> [u32; 4] {
    match frame.segmentation.segment_feature_mode {
        SegmentFeatureMode::Delta => {
            updates.map(|update| (i32::from(base) + i32::from(update)).clamp(0, max) as u32)
        }
        SegmentFeatureMode::Absolute => updates.map(|update| update as i32 as u32),
    }
}

fn cfg_lf(regs: &mut dyn RegisterAccess, frame: &Frame) {
    let hdr = &frame.header;
    let seg = &frame.segmentation;

    if !seg.segmentation_enabled {
        VP8_DEC_LF_LEVEL[0].write(regs, u32::from(hdr.loop_filter_level));
    } else {
        let levels = segment_values(frame, hdr.loop_filter_level, &seg.lf_update_value, 63);
        for (field, level) in VP8_DEC_LF_LEVEL.iter().zip(levels) {
            field.write(regs, level);
        }
    }

    let mut reg = g1_reg_ref_pic_filt_sharpness(u32::from(hdr.sharpness_level));
    if hdr.filter_type {
        reg |= G1_REG_REF_PIC_FILT_TYPE_E;
    }
    regs.write_relaxed(g1_reg_ref_pic(0), reg);

    let adj = &frame.mb_lf_adjust;
    if adj.loop_filter_adj_enable {
        for i in 0..4 {
            VP8_DEC_MB_ADJ[i].write(regs, adj.mb_mode_delta[i] as i32 as u32);
            VP8_DEC_REF_ADJ[i].write(regs, adj.ref_frame_delta[i] as i32 as u32);
        }
    }
}

fn cfg_qp(regs: &mut dyn RegisterAccess, frame: &Frame) {
    let q = &frame.header.quant_indices;
    let seg = &frame.segmentation;

    if !seg.segmentation_enabled {
        VP8_DEC_QUANT[0].write(regs, u32::from(q.y_ac_qi));
    } else {
        let quants = segment_values(frame, q.y_ac_qi, &seg.quantizer_update_value, 127);
        for (field, quant) in VP8_DEC_QUANT.iter().zip(quants) {
            field.write(regs, quant);
        }
    }

    let deltas = [
        q.y_dc_delta,
        q.y2_dc_delta,
        q.y2_ac_delta,
        q.uv_dc_delta,
        q.uv_ac_delta,
    ];
    for (field, delta) in VP8_DEC_QUANT_DELTA.iter().zip(deltas) {
        field.write(regs, delta as i32 as u32);
    }
}

fn cfg_parts(
    regs: &mut dyn RegisterAccess,
    hdr: &Header,
    ctx: &RunContext,
) -> Result<PartitionLayout, M2mError> {
    let params = hdr.partition_params();
    let layout = params
        .layout(ctx.src_dma)
        .map_err(|e| M2mError::InvalidFrame(e.into()))?;

    let frame_len = hdr.frame_len();
    if !ctx.src_data.is_empty() {
        if frame_len > ctx.src_data.len() {
            log::warn!(
                "frame is {} bytes according to its header, but only {} bytes were queued",
                frame_len,
                ctx.src_data.len()
            );
        } else {
            let offset = (params.first_part_offset() + hdr.first_part_size) as usize;
            let coded = params.dct_part_sizes().len() - 1;
            match read_partition_sizes(&ctx.src_data[offset..frame_len], hdr.num_dct_parts) {
                Ok(sizes) if sizes[..coded] != params.dct_part_sizes()[..coded] => {
                    log::warn!(
                        "partition sizes {:?} do not match the stream ({:?})",
                        params.dct_part_sizes(),
                        &sizes[..=coded]
                    )
                }
                Ok(_) => (),
                Err(e) => log::warn!("cannot read partition sizes: {}", e),
            }
        }
    }

    // The control partition is fed through the second stream, the DCT partitions through the
    // main one.
    regs.write_relaxed(VP8_DEC_CTRL_BASE, layout.control.base);
    VP8_DEC_CTRL_START_BIT.write(regs, layout.control.start_bit);
    let num_parts = layout.dct.len() as u32;
    regs.write_relaxed(
        G1_REG_DEC_CTRL6,
        g1_reg_dec_ctrl6_coeffs_part_am(num_parts - 1)
            | g1_reg_dec_ctrl6_stream1_len(layout.control_len),
    );

    regs.write_relaxed(G1_REG_DEC_CTRL3, g1_reg_dec_ctrl3_stream_len(layout.dct_len));

    for (i, part) in layout.dct.iter().enumerate() {
        VP8_DEC_DCT_BASE[i].write(regs, part.base);
        VP8_DEC_DCT_START_BITS[i].write(regs, part.start_bit);
    }

    Ok(layout)
}

/// Programs the 6-tap filter coefficients, only used by the bicubic version.
fn cfg_tap(regs: &mut dyn RegisterAccess, hdr: &Header) {
    if hdr.version & 0x3 != 0 {
        return;
    }

    for (i, taps) in MC_FILTER.iter().enumerate() {
        for (field, tap) in VP8_DEC_PRED_BC_TAP[i].iter().zip(&taps[1..5]) {
            field.write(regs, *tap as u32);
        }

        let outer = match i {
            2 => &VP8_DEC_PRED_BC_TAP_OUTER[0],
            4 => &VP8_DEC_PRED_BC_TAP_OUTER[1],
            6 => &VP8_DEC_PRED_BC_TAP_OUTER[2],
            _ => continue,
        };
        outer.write(regs, ((taps[0] << 2) | taps[5]) as u32);
    }
}

fn resolve_ref(
    ctx: &RunContext,
    slot: RefSlot,
    timestamp: u64,
    missing: &mut Vec<MissingReference>,
) -> DmaAddr {
    match ctx.refs.find_reference(timestamp) {
        Some(addr) => addr,
        None => {
            if timestamp != 0 {
                log::warn!("no {:?} reference with timestamp {}", slot, timestamp);
                missing.push(MissingReference { slot, timestamp });
            }
            ctx.dst_dma
        }
    }
}

fn cfg_ref(regs: &mut dyn RegisterAccess, frame: &Frame, ctx: &RunContext) -> Vec<MissingReference> {
    let hdr = &frame.header;
    let refs = &frame.refs;
    let mut missing = Vec::new();

    let last = resolve_ref(ctx, RefSlot::Last, refs.last_frame_ts, &mut missing);
    regs.write_relaxed(g1_reg_addr_ref(0), last);

    let mut golden = resolve_ref(ctx, RefSlot::Golden, refs.golden_frame_ts, &mut missing);
    if hdr.sign_bias_golden {
        golden |= G1_REG_ADDR_REF_TOPC_E;
    }
    regs.write_relaxed(g1_reg_addr_ref(4), golden);

    let mut alt = resolve_ref(ctx, RefSlot::Alt, refs.alt_frame_ts, &mut missing);
    if hdr.sign_bias_alternate {
        alt |= G1_REG_ADDR_REF_TOPC_E;
    }
    regs.write_relaxed(g1_reg_addr_ref(5), alt);

    missing
}

fn cfg_buffers(
    regs: &mut dyn RegisterAccess,
    frame: &Frame,
    aux: &Vp8AuxBuffers,
    ctx: &RunContext,
) {
    let seg = &frame.segmentation;

    regs.write_relaxed(G1_REG_ADDR_QTABLE, aux.prob_tbl.dma());

    let mut reg = aux.segment_map.dma() & G1_REG_FWD_PIC1_SEGMENT_BASE_MASK;
    if seg.segmentation_enabled {
        reg |= G1_REG_FWD_PIC1_SEGMENT_E;
        if seg.update_mb_segmentation_map {
            reg |= G1_REG_FWD_PIC1_SEGMENT_UPD_E;
        }
    }
    regs.write_relaxed(g1_reg_fwd_pic(0), reg);

    regs.write_relaxed(G1_REG_ADDR_DST, ctx.dst_dma);
}

/// VP8 decoding state of a session on a G1 core.
#[derive(Debug, Default)]
pub struct Vp8Decoder {
    aux: Option<Vp8AuxBuffers>,
}

impl Vp8Decoder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn aux_buffers(&self) -> Option<&Vp8AuxBuffers> {
        self.aux.as_ref()
    }
}

impl CodecOps for Vp8Decoder {
    fn init(&mut self, alloc: &mut dyn DmaAllocator, dst_format: &PixFormat) -> Result<(), M2mError> {
        if let Some(aux) = self.aux.take() {
            aux.free(alloc);
        }

        self.aux = Some(Vp8AuxBuffers::new(alloc, dst_format.resolution())?);
        Ok(())
    }

    fn exit(&mut self, alloc: &mut dyn DmaAllocator) {
        if let Some(aux) = self.aux.take() {
            aux.free(alloc);
        }
    }

    fn run(&mut self, regs: &mut dyn RegisterAccess, ctx: &RunContext) -> Result<RunReport, M2mError> {
        let frame = ctx.frame.ok_or(M2mError::NoFrameControl)?;
        let aux = self
            .aux
            .as_mut()
            .ok_or_else(|| anyhow!("VP8 decoder used before init"))?;
        frame.validate()?;
        let hdr = &frame.header;

        // The segment map of the previous frames only carries over to inter frames.
        if hdr.key_frame {
            aux.segment_map.as_mut_slice().fill(0);
        }

        let probs = ProbabilityTable::pack(frame);
        aux.prob_tbl.as_mut_slice()[..PROB_TABLE_SIZE].copy_from_slice(probs.as_bytes());

        regs.write_relaxed(
            G1_REG_CONFIG,
            G1_REG_CONFIG_DEC_TIMEOUT_E
                | G1_REG_CONFIG_DEC_STRENDIAN_E
                | G1_REG_CONFIG_DEC_INSWAP32_E
                | G1_REG_CONFIG_DEC_STRSWAP32_E
                | G1_REG_CONFIG_DEC_OUTSWAP32_E
                | G1_REG_CONFIG_DEC_CLK_GATE_E
                | G1_REG_CONFIG_DEC_IN_ENDIAN
                | G1_REG_CONFIG_DEC_OUT_ENDIAN
                | g1_reg_config_dec_max_burst(16),
        );

        let mut reg = g1_reg_dec_ctrl0_dec_mode(G1_REG_DEC_CTRL0_DEC_MODE_VP8);
        if !hdr.key_frame {
            reg |= G1_REG_DEC_CTRL0_PIC_INTER_E;
        }
        if !hdr.mb_no_coeff_skip {
            reg |= G1_REG_DEC_CTRL0_SKIP_MODE;
        }
        if hdr.loop_filter_level == 0 {
            reg |= G1_REG_DEC_CTRL0_FILTERING_DIS;
        }
        regs.write_relaxed(G1_REG_DEC_CTRL0, reg);

        let mb_width = mb_width(ctx.dst_format.width);
        let mb_height = mb_height(ctx.dst_format.height);
        regs.write_relaxed(
            G1_REG_DEC_CTRL1,
            g1_reg_dec_ctrl1_pic_mb_width(mb_width)
                | g1_reg_dec_ctrl1_pic_mb_height_p(mb_height)
                | g1_reg_dec_ctrl1_pic_mb_w_ext(mb_width >> 9)
                | g1_reg_dec_ctrl1_pic_mb_h_ext(mb_height >> 8),
        );

        regs.write_relaxed(
            G1_REG_DEC_CTRL2,
            g1_reg_dec_ctrl2_boolean_range(u32::from(hdr.bd_range))
                | g1_reg_dec_ctrl2_boolean_value(u32::from(hdr.bd_value)),
        );

        let mut reg = 0;
        if hdr.version != 3 {
            reg |= G1_REG_DEC_CTRL4_VC1_HEIGHT_EXT;
        }
        if hdr.version & 0x3 != 0 {
            reg |= G1_REG_DEC_CTRL4_BILIN_MC_E;
        }
        regs.write_relaxed(G1_REG_DEC_CTRL4, reg);

        // The fields below are read-modify-written, their registers start from zero on every job.
        for offset in VP8_DEC_FIELD_REGS {
            regs.write_relaxed(offset, 0);
        }

        cfg_lf(regs, frame);
        cfg_qp(regs, frame);
        let partitions = cfg_parts(regs, hdr, ctx)?;
        log::debug!(
            "VP8 {} frame, {:?}, {:?}",
            if hdr.key_frame { "key" } else { "inter" },
            probs,
            partitions
        );
        cfg_tap(regs, hdr);
        let missing_refs = cfg_ref(regs, frame, ctx);
        cfg_buffers(regs, frame, aux, ctx);

        Ok(RunReport {
            missing_refs,
            partitions: Some(partitions),
        })
    }
}
