// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Codec-specific, hardware-independent code.
//!
//! This module contains the description of decoded frames as handed over by the bitstream parser,
//! and the codec-level arithmetic every hardware backend needs to consume them.

pub mod vp8;
