// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Decoding sessions.
//!
//! The only session model supported is the stateless memory-to-memory one: the client parses the
//! bitstream itself and hands the frame parameters along with each coded buffer.

pub mod m2m;
