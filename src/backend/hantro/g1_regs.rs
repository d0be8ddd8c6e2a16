// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Register map of the Hantro G1 decoding core.

use crate::device::regs::RegisterField;

pub const G1_REG_INTERRUPT: u32 = 0x004;
pub const G1_REG_INTERRUPT_DEC_RDY_INT: u32 = 1 << 12;
pub const G1_REG_INTERRUPT_DEC_IRQ: u32 = 1 << 8;
pub const G1_REG_INTERRUPT_DEC_IRQ_DIS: u32 = 1 << 4;
pub const G1_REG_INTERRUPT_DEC_E: u32 = 1 << 0;

pub const G1_REG_CONFIG: u32 = 0x008;
pub const G1_REG_CONFIG_DEC_TIMEOUT_E: u32 = 1 << 23;
pub const G1_REG_CONFIG_DEC_STRSWAP32_E: u32 = 1 << 22;
pub const G1_REG_CONFIG_DEC_STRENDIAN_E: u32 = 1 << 21;
pub const G1_REG_CONFIG_DEC_INSWAP32_E: u32 = 1 << 20;
pub const G1_REG_CONFIG_DEC_OUTSWAP32_E: u32 = 1 << 19;
pub const G1_REG_CONFIG_DEC_CLK_GATE_E: u32 = 1 << 10;
pub const G1_REG_CONFIG_DEC_IN_ENDIAN: u32 = 1 << 9;
pub const G1_REG_CONFIG_DEC_OUT_ENDIAN: u32 = 1 << 8;

pub const fn g1_reg_config_dec_max_burst(x: u32) -> u32 {
    x & 0x1f
}

pub const G1_REG_DEC_CTRL0: u32 = 0x00c;
pub const G1_REG_DEC_CTRL0_SKIP_MODE: u32 = 1 << 26;
pub const G1_REG_DEC_CTRL0_PIC_INTER_E: u32 = 1 << 20;
pub const G1_REG_DEC_CTRL0_FILTERING_DIS: u32 = 1 << 14;

pub const G1_REG_DEC_CTRL0_DEC_MODE_VP8: u32 = 10;

pub const fn g1_reg_dec_ctrl0_dec_mode(x: u32) -> u32 {
    (x & 0xf) << 28
}

pub const G1_REG_DEC_CTRL1: u32 = 0x010;

pub const fn g1_reg_dec_ctrl1_pic_mb_width(x: u32) -> u32 {
    (x & 0x1ff) << 23
}

pub const fn g1_reg_dec_ctrl1_pic_mb_height_p(x: u32) -> u32 {
    (x & 0xff) << 11
}

pub const fn g1_reg_dec_ctrl1_pic_mb_w_ext(x: u32) -> u32 {
    (x & 0x7) << 3
}

pub const fn g1_reg_dec_ctrl1_pic_mb_h_ext(x: u32) -> u32 {
    x & 0x7
}

pub const G1_REG_DEC_CTRL2: u32 = 0x014;

pub const fn g1_reg_dec_ctrl2_boolean_value(x: u32) -> u32 {
    (x & 0xff) << 8
}

pub const fn g1_reg_dec_ctrl2_boolean_range(x: u32) -> u32 {
    x & 0xff
}

pub const G1_REG_DEC_CTRL3: u32 = 0x018;

pub const fn g1_reg_dec_ctrl3_stream_len(x: u32) -> u32 {
    x & 0xff_ffff
}

pub const G1_REG_DEC_CTRL4: u32 = 0x01c;
pub const G1_REG_DEC_CTRL4_VC1_HEIGHT_EXT: u32 = 1 << 13;
pub const G1_REG_DEC_CTRL4_BILIN_MC_E: u32 = 1 << 12;

pub const G1_REG_DEC_CTRL6: u32 = 0x024;

pub const fn g1_reg_dec_ctrl6_coeffs_part_am(x: u32) -> u32 {
    (x & 0xf) << 24
}

pub const fn g1_reg_dec_ctrl6_stream1_len(x: u32) -> u32 {
    x & 0xff_ffff
}

pub const fn g1_reg_fwd_pic(i: u32) -> u32 {
    0x028 + i * 0x4
}

pub const G1_REG_FWD_PIC1_SEGMENT_BASE_MASK: u32 = !0x3;
pub const G1_REG_FWD_PIC1_SEGMENT_UPD_E: u32 = 1 << 1;
pub const G1_REG_FWD_PIC1_SEGMENT_E: u32 = 1 << 0;

pub const G1_REG_DEC_CTRL7: u32 = 0x02c;
pub const G1_REG_ADDR_STR: u32 = 0x030;
pub const G1_REG_ADDR_DST: u32 = 0x034;

pub const fn g1_reg_addr_ref(i: u32) -> u32 {
    0x038 + i * 0x4
}

pub const G1_REG_ADDR_REF_TOPC_E: u32 = 1 << 0;

pub const fn g1_reg_ref_pic(i: u32) -> u32 {
    0x078 + i * 0x4
}

pub const G1_REG_REF_PIC_FILT_TYPE_E: u32 = 1 << 31;

pub const fn g1_reg_ref_pic_filt_sharpness(x: u32) -> u32 {
    (x & 0x7) << 28
}

pub const G1_REG_LT_REF: u32 = 0x098;
pub const G1_REG_VALID_REF: u32 = 0x09c;
pub const G1_REG_ADDR_QTABLE: u32 = 0x0a0;

pub const fn g1_reg_bd_ref_pic(i: u32) -> u32 {
    0x0a8 + i * 0x4
}

pub const G1_REG_BD_P_REF_PIC: u32 = 0x0bc;
pub const G1_REG_PRED_FLT: u32 = 0x0c4;
pub const G1_REG_SOFT_RESET: u32 = 0x194;

/// Size of the register space covered by the map above.
pub const G1_REG_SPACE_SIZE: u32 = 0x200;

/// Decoding enable bit, cleared by the hardware when it is ready for the next job.
pub const G1_DEC_E: RegisterField = RegisterField::new(G1_REG_INTERRUPT, 0, 0x1);

const fn field(base: u32, shift: u8, mask: u32) -> RegisterField {
    RegisterField::new(base, shift, mask)
}

/// DCT partition base addresses.
pub const VP8_DEC_DCT_BASE: [RegisterField; 8] = [
    field(G1_REG_ADDR_STR, 0, 0xffff_ffff),
    field(g1_reg_addr_ref(8), 0, 0xffff_ffff),
    field(g1_reg_addr_ref(9), 0, 0xffff_ffff),
    field(g1_reg_addr_ref(10), 0, 0xffff_ffff),
    field(g1_reg_addr_ref(11), 0, 0xffff_ffff),
    field(g1_reg_addr_ref(12), 0, 0xffff_ffff),
    field(g1_reg_addr_ref(14), 0, 0xffff_ffff),
    field(g1_reg_addr_ref(15), 0, 0xffff_ffff),
];

/// Control partition base address.
pub const VP8_DEC_CTRL_BASE: u32 = g1_reg_addr_ref(13);

/// Loop filter levels, per segment.
pub const VP8_DEC_LF_LEVEL: [RegisterField; 4] = [
    field(g1_reg_ref_pic(2), 18, 0x3f),
    field(g1_reg_ref_pic(2), 12, 0x3f),
    field(g1_reg_ref_pic(2), 6, 0x3f),
    field(g1_reg_ref_pic(2), 0, 0x3f),
];

/// Loop filter deltas, per macroblock mode.
pub const VP8_DEC_MB_ADJ: [RegisterField; 4] = [
    field(g1_reg_ref_pic(0), 21, 0x7f),
    field(g1_reg_ref_pic(0), 14, 0x7f),
    field(g1_reg_ref_pic(0), 7, 0x7f),
    field(g1_reg_ref_pic(0), 0, 0x7f),
];

/// Loop filter deltas, per reference frame.
pub const VP8_DEC_REF_ADJ: [RegisterField; 4] = [
    field(g1_reg_ref_pic(1), 21, 0x7f),
    field(g1_reg_ref_pic(1), 14, 0x7f),
    field(g1_reg_ref_pic(1), 7, 0x7f),
    field(g1_reg_ref_pic(1), 0, 0x7f),
];

/// Quantizer indices, per segment.
pub const VP8_DEC_QUANT: [RegisterField; 4] = [
    field(g1_reg_ref_pic(3), 11, 0x7ff),
    field(g1_reg_ref_pic(3), 0, 0x7ff),
    field(g1_reg_bd_ref_pic(4), 11, 0x7ff),
    field(g1_reg_bd_ref_pic(4), 0, 0x7ff),
];

/// Quantizer deltas: Y1 DC, Y2 DC, Y2 AC, UV DC and UV AC.
pub const VP8_DEC_QUANT_DELTA: [RegisterField; 5] = [
    field(g1_reg_ref_pic(3), 27, 0x1f),
    field(g1_reg_ref_pic(3), 22, 0x1f),
    field(g1_reg_bd_ref_pic(4), 27, 0x1f),
    field(g1_reg_bd_ref_pic(4), 22, 0x1f),
    field(G1_REG_BD_P_REF_PIC, 27, 0x1f),
];

/// DCT partition start bits.
pub const VP8_DEC_DCT_START_BITS: [RegisterField; 8] = [
    field(G1_REG_DEC_CTRL2, 26, 0x3f),
    field(G1_REG_DEC_CTRL4, 26, 0x3f),
    field(G1_REG_DEC_CTRL4, 20, 0x3f),
    field(G1_REG_DEC_CTRL7, 24, 0x3f),
    field(G1_REG_DEC_CTRL7, 18, 0x3f),
    field(G1_REG_DEC_CTRL7, 12, 0x3f),
    field(G1_REG_DEC_CTRL7, 6, 0x3f),
    field(G1_REG_DEC_CTRL7, 0, 0x3f),
];

/// Control partition start bit.
pub const VP8_DEC_CTRL_START_BIT: RegisterField = field(G1_REG_DEC_CTRL2, 18, 0x3f);

/// Taps 1 to 4 of the 6-tap prediction filters, per eighth-pixel position.
pub const VP8_DEC_PRED_BC_TAP: [[RegisterField; 4]; 8] = [
    [
        field(G1_REG_PRED_FLT, 22, 0x3ff),
        field(G1_REG_PRED_FLT, 12, 0x3ff),
        field(G1_REG_PRED_FLT, 2, 0x3ff),
        field(g1_reg_ref_pic(4), 22, 0x3ff),
    ],
    [
        field(g1_reg_ref_pic(4), 12, 0x3ff),
        field(g1_reg_ref_pic(4), 2, 0x3ff),
        field(g1_reg_ref_pic(5), 22, 0x3ff),
        field(g1_reg_ref_pic(5), 12, 0x3ff),
    ],
    [
        field(g1_reg_ref_pic(5), 2, 0x3ff),
        field(g1_reg_ref_pic(6), 22, 0x3ff),
        field(g1_reg_ref_pic(6), 12, 0x3ff),
        field(g1_reg_ref_pic(6), 2, 0x3ff),
    ],
    [
        field(g1_reg_ref_pic(7), 22, 0x3ff),
        field(g1_reg_ref_pic(7), 12, 0x3ff),
        field(g1_reg_ref_pic(7), 2, 0x3ff),
        field(G1_REG_LT_REF, 22, 0x3ff),
    ],
    [
        field(G1_REG_LT_REF, 12, 0x3ff),
        field(G1_REG_LT_REF, 2, 0x3ff),
        field(G1_REG_VALID_REF, 22, 0x3ff),
        field(G1_REG_VALID_REF, 12, 0x3ff),
    ],
    [
        field(G1_REG_VALID_REF, 2, 0x3ff),
        field(g1_reg_bd_ref_pic(0), 22, 0x3ff),
        field(g1_reg_bd_ref_pic(0), 12, 0x3ff),
        field(g1_reg_bd_ref_pic(0), 2, 0x3ff),
    ],
    [
        field(g1_reg_bd_ref_pic(1), 22, 0x3ff),
        field(g1_reg_bd_ref_pic(1), 12, 0x3ff),
        field(g1_reg_bd_ref_pic(1), 2, 0x3ff),
        field(g1_reg_bd_ref_pic(2), 22, 0x3ff),
    ],
    [
        field(g1_reg_bd_ref_pic(2), 12, 0x3ff),
        field(g1_reg_bd_ref_pic(2), 2, 0x3ff),
        field(g1_reg_bd_ref_pic(3), 22, 0x3ff),
        field(g1_reg_bd_ref_pic(3), 12, 0x3ff),
    ],
];

/// Outer taps (0 and 5) of the filters at half-pixel and quarter-pixel positions 2, 4 and 6,
/// packed as `tap0 << 2 | tap5`.
pub const VP8_DEC_PRED_BC_TAP_OUTER: [RegisterField; 3] = [
    field(g1_reg_bd_ref_pic(3), 8, 0xf),
    field(g1_reg_bd_ref_pic(3), 4, 0xf),
    field(g1_reg_bd_ref_pic(3), 0, 0xf),
];

/// Registers made only of the VP8 bitfields above.
pub const VP8_DEC_FIELD_REGS: [u32; 17] = [
    g1_reg_ref_pic(1),
    g1_reg_ref_pic(2),
    g1_reg_ref_pic(3),
    g1_reg_ref_pic(4),
    g1_reg_ref_pic(5),
    g1_reg_ref_pic(6),
    g1_reg_ref_pic(7),
    G1_REG_LT_REF,
    G1_REG_VALID_REF,
    g1_reg_bd_ref_pic(0),
    g1_reg_bd_ref_pic(1),
    g1_reg_bd_ref_pic(2),
    g1_reg_bd_ref_pic(3),
    g1_reg_bd_ref_pic(4),
    G1_REG_BD_P_REF_PIC,
    G1_REG_PRED_FLT,
    G1_REG_DEC_CTRL7,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tap_fields_do_not_overlap() {
        let fields = VP8_DEC_PRED_BC_TAP
            .into_iter()
            .flatten()
            .chain(VP8_DEC_PRED_BC_TAP_OUTER)
            .collect::<Vec<_>>();

        for (i, a) in fields.iter().enumerate() {
            for b in &fields[i + 1..] {
                if a.base == b.base {
                    let a_bits = a.mask << a.shift;
                    let b_bits = b.mask << b.shift;
                    assert_eq!(a_bits & b_bits, 0, "{:?} overlaps {:?}", a, b);
                }
            }
        }
    }

    #[test]
    fn ctrl2_fields_do_not_overlap() {
        let bool_bits = g1_reg_dec_ctrl2_boolean_value(0xff) | g1_reg_dec_ctrl2_boolean_range(0xff);
        let ctrl_bits = VP8_DEC_CTRL_START_BIT.bits(0x3f);
        let dct_bits = VP8_DEC_DCT_START_BITS[0].bits(0x3f);

        assert_eq!(bool_bits & ctrl_bits, 0);
        assert_eq!(bool_bits & dct_bits, 0);
        assert_eq!(ctrl_bits & dct_bits, 0);
    }

    #[test]
    fn field_registers_are_covered() {
        // These are written as whole words before their fields are.
        let whole = [G1_REG_DEC_CTRL2, G1_REG_DEC_CTRL4, g1_reg_ref_pic(0)];

        let fields = VP8_DEC_LF_LEVEL
            .into_iter()
            .chain(VP8_DEC_MB_ADJ)
            .chain(VP8_DEC_REF_ADJ)
            .chain(VP8_DEC_QUANT)
            .chain(VP8_DEC_QUANT_DELTA)
            .chain(VP8_DEC_DCT_START_BITS)
            .chain(VP8_DEC_PRED_BC_TAP.into_iter().flatten())
            .chain(VP8_DEC_PRED_BC_TAP_OUTER);

        for field in fields {
            if field.mask == 0xffff_ffff || whole.contains(&field.base) {
                continue;
            }
            assert!(
                VP8_DEC_FIELD_REGS.contains(&field.base),
                "{:?} is not cleared",
                field
            );
        }
    }

    #[test]
    fn offsets() {
        assert_eq!(g1_reg_addr_ref(13), 0x06c);
        assert_eq!(g1_reg_ref_pic(7), 0x094);
        assert_eq!(g1_reg_bd_ref_pic(4), 0x0b8);
        assert_eq!(g1_reg_fwd_pic(0), 0x028);
    }
}
