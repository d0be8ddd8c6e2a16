// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Codec controls and per-request control overrides.

use crate::codec::vp8::frame::Frame;
use crate::decoder::m2m::format::CodecMode;
use crate::decoder::m2m::format::FormatDesc;
use crate::decoder::m2m::M2mError;

/// Current values of the controls of a session.
#[derive(Debug, Default)]
pub struct ControlHandler {
    /// VP8 frame parameters, present if the hardware can decode VP8.
    vp8_frame: Option<Frame>,
}

impl ControlHandler {
    /// Creates the controls needed by the coded formats in `formats`.
    pub fn new(formats: &[FormatDesc]) -> Self {
        let mut handler = Self::default();

        for mode in formats.iter().filter_map(|f| f.codec_mode) {
            match mode {
                CodecMode::Vp8Dec => handler.vp8_frame = Some(Frame::new()),
            }
        }

        handler
    }

    pub fn vp8_frame(&self) -> Option<&Frame> {
        self.vp8_frame.as_ref()
    }

    pub fn set_vp8_frame(&mut self, frame: Frame) -> Result<(), M2mError> {
        let ctrl = self.vp8_frame.as_mut().ok_or(M2mError::NoFrameControl)?;
        frame.validate()?;
        *ctrl = frame;

        Ok(())
    }
}

#[derive(Debug, Default)]
enum RequestState {
    /// Controls waiting to be applied.
    Queued(Frame),
    /// Controls applied to the handler for the running job.
    Applied,
    /// The job using the controls has finished.
    Completed,
    #[default]
    Unknown,
}

/// Control values attached to a source buffer, applied when that buffer is decoded.
#[derive(Debug)]
pub struct ControlRequest(RequestState);

impl ControlRequest {
    /// Creates a request carrying `frame`, which must be valid.
    pub fn new(frame: Frame) -> Result<Self, M2mError> {
        frame.validate()?;
        Ok(Self(RequestState::Queued(frame)))
    }

    /// Applies the controls of this request to `handler`.
    pub fn apply(&mut self, handler: &mut ControlHandler) -> Result<(), M2mError> {
        match std::mem::take(&mut self.0) {
            RequestState::Queued(frame) => {
                self.0 = RequestState::Applied;
                handler.set_vp8_frame(frame)
            }
            state => {
                log::warn!("cannot apply request in state {:?}", state);
                self.0 = state;
                Ok(())
            }
        }
    }

    /// Marks this request as completed.
    pub fn complete(&mut self) {
        match std::mem::take(&mut self.0) {
            RequestState::Applied | RequestState::Queued(_) => self.0 = RequestState::Completed,
            state => self.0 = state,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.0, RequestState::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::hantro::G1_VARIANT;
    use crate::codec::vp8::frame::FrameError;
    use crate::codec::vp8::partitions::PartitionError;

    #[test]
    fn default_frame() {
        let handler = ControlHandler::new(G1_VARIANT.formats);
        let frame = handler.vp8_frame().unwrap();

        assert_eq!(frame.header.num_dct_parts, 1);
        assert!(ControlHandler::new(&[]).vp8_frame().is_none());
    }

    #[test]
    fn invalid_frames_are_rejected() {
        let mut handler = ControlHandler::new(G1_VARIANT.formats);

        let mut frame = Frame::new();
        frame.header.num_dct_parts = 3;
        assert!(matches!(
            handler.set_vp8_frame(frame.clone()),
            Err(M2mError::InvalidFrame(FrameError::Partitions(
                PartitionError::InvalidPartitionCount(3)
            )))
        ));
        assert!(ControlRequest::new(frame).is_err());

        let mut frame = Frame::new();
        frame.header.version = 5;
        assert!(handler.set_vp8_frame(frame).is_err());
        assert_eq!(handler.vp8_frame().unwrap().header.version, 0);
    }

    #[test]
    fn request_lifecycle() {
        let mut handler = ControlHandler::new(G1_VARIANT.formats);
        let mut frame = Frame::new();
        frame.header.key_frame = true;
        frame.header.first_part_size = 32;

        let mut request = ControlRequest::new(frame.clone()).unwrap();
        assert!(!request.is_complete());

        request.apply(&mut handler).unwrap();
        assert_eq!(handler.vp8_frame(), Some(&frame));

        request.complete();
        assert!(request.is_complete());
    }
}
