// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Utility functions used by several parts of this crate.
//!
//! This module is for anything that doesn't fit into the other top-level modules. Try not to add
//! new code here unless it really doesn't belong anywhere else.

/// Returns `value` rounded up to the next multiple of `alignment`, which must be a power of two.
pub const fn align_up(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Returns `value` rounded down to the previous multiple of `alignment`, which must be a power of
/// two.
pub const fn align_down(value: u32, alignment: u32) -> u32 {
    value & !(alignment - 1)
}

/// Integer division of `n` by `d`, rounding up.
pub const fn div_round_up(n: u32, d: u32) -> u32 {
    (n + d - 1) / d
}

/// Rounds `value` up to the next multiple of `step`, which doesn't need to be a power of two.
pub const fn round_up(value: u32, step: u32) -> u32 {
    div_round_up(value, step) * step
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_down(15, 8), 8);
        assert_eq!(align_down(7, 8), 0);
    }

    #[test]
    fn rounding() {
        assert_eq!(div_round_up(176, 16), 11);
        assert_eq!(div_round_up(177, 16), 12);
        assert_eq!(round_up(99, 64), 128);
        assert_eq!(round_up(50, 48), 96);
    }
}
