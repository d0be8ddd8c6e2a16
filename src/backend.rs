// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Hardware backends.
//!
//! A backend turns the codec-level description of a frame into the register program of a given
//! decoding core, and drives that core through the lifetime of a job.

pub mod hantro;
