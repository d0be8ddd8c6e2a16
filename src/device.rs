// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Hardware access primitives.
//!
//! Decoder cores are programmed through a flat space of 32-bit registers and read their inputs
//! from DMA-visible memory. [`regs`] abstracts the former, [`dma`] the latter.

pub mod dma;
pub mod regs;
