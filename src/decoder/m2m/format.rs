// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Pixel formats and format negotiation.

use crate::decoder::m2m::M2mError;
use crate::utils::round_up;
use crate::Fourcc;
use crate::Resolution;

/// VP8 frames, as parsed by the client.
pub const VP8F: Fourcc = Fourcc(u32::from_le_bytes(*b"VP8F"));
/// Y/CbCr 4:2:0 with interleaved chroma.
pub const NV12: Fourcc = Fourcc(u32::from_le_bytes(*b"NV12"));

/// The two queues of a mem2mem decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueType {
    /// Coded bitstream, from the client to the decoder.
    Output,
    /// Decoded pictures, from the decoder to the client.
    Capture,
}

impl QueueType {
    /// Whether this queue carries coded data.
    pub fn is_coded(self) -> bool {
        self == QueueType::Output
    }
}

/// Codec handled by a coded format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodecMode {
    Vp8Dec,
}

/// Range of frame sizes supported by a coded format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSizeRange {
    pub min_width: u32,
    pub max_width: u32,
    pub step_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub step_height: u32,
}

impl FrameSizeRange {
    /// Returns `resolution` clamped to this range, then rounded up to its steps.
    pub fn apply(&self, resolution: Resolution) -> Resolution {
        let clamp_roundup = |x: u32, min: u32, max: u32, step: u32| {
            let x = x.clamp(min, max);
            if step > 1 {
                round_up(x, step)
            } else {
                x
            }
        };

        Resolution {
            width: clamp_roundup(
                resolution.width,
                self.min_width,
                self.max_width,
                self.step_width,
            ),
            height: clamp_roundup(
                resolution.height,
                self.min_height,
                self.max_height,
                self.step_height,
            ),
        }
    }

    pub fn min(&self) -> Resolution {
        Resolution::from((self.min_width, self.min_height))
    }
}

/// Description of a format supported by a hardware variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatDesc {
    pub fourcc: Fourcc,
    /// Codec of coded formats, `None` for raw formats.
    pub codec_mode: Option<CodecMode>,
    /// Maximum bytes per pixel of coded data, used to size coded buffers.
    pub max_depth: u32,
    /// Size of the per-frame header preceding coded data, if any.
    pub header_size: u32,
    /// Supported frame sizes. Only meaningful for coded formats.
    pub frmsize: Option<FrameSizeRange>,
}

impl FormatDesc {
    pub fn is_coded(&self) -> bool {
        self.codec_mode.is_some()
    }
}

/// Single-planar format of a queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PixFormat {
    pub fourcc: Fourcc,
    pub width: u32,
    pub height: u32,
    /// Bytes per line of the first plane. Zero for coded formats.
    pub bytesperline: u32,
    /// Size of the buffers of this format, in bytes.
    pub sizeimage: u32,
}

impl PixFormat {
    pub fn new(fourcc: Fourcc, resolution: Resolution) -> Self {
        Self {
            fourcc,
            width: resolution.width,
            height: resolution.height,
            bytesperline: 0,
            sizeimage: 0,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::from((self.width, self.height))
    }
}

/// Returns the format of `formats` matching `fourcc`.
pub fn find_format(formats: &[FormatDesc], fourcc: Fourcc) -> Option<&FormatDesc> {
    formats.iter().find(|f| f.fourcc == fourcc)
}

/// Returns the first coded (or raw) format of `formats`.
pub fn default_format(formats: &[FormatDesc], coded: bool) -> Option<&FormatDesc> {
    formats.iter().find(|f| f.is_coded() == coded)
}

/// Returns the formats of `formats` that can be set on `queue`.
pub fn enum_formats(formats: &[FormatDesc], queue: QueueType) -> impl Iterator<Item = Fourcc> + '_ {
    formats
        .iter()
        .filter(move |f| f.is_coded() == queue.is_coded())
        .map(|f| f.fourcc)
}

/// Fills the layout fields of a raw format.
fn fill_raw_layout(fmt: &mut PixFormat) -> Result<(), M2mError> {
    match fmt.fourcc {
        NV12 => {
            fmt.bytesperline = fmt.width;
            fmt.sizeimage = fmt.width * fmt.height * 3 / 2;
            Ok(())
        }
        fourcc => Err(M2mError::InvalidArgument(format!(
            "no layout for raw format {}",
            fourcc
        ))),
    }
}

/// Adjusts `requested` to the closest format `queue` supports.
///
/// `src_fmt` and `src_desc` are the current format of the coded queue, which dictates the size of
/// decoded pictures.
pub fn try_format(
    formats: &[FormatDesc],
    queue: QueueType,
    requested: &PixFormat,
    src_fmt: &PixFormat,
    src_desc: &FormatDesc,
) -> Result<PixFormat, M2mError> {
    let coded = queue.is_coded();
    let mut fmt = *requested;

    let desc = match find_format(formats, fmt.fourcc).filter(|f| f.is_coded() == coded) {
        Some(desc) => desc,
        None => {
            let desc = default_format(formats, coded).ok_or_else(|| {
                M2mError::InvalidArgument(format!("no format available for {:?} queue", queue))
            })?;
            log::debug!(
                "format {} not supported on {:?} queue, using {}",
                fmt.fourcc,
                queue,
                desc.fourcc
            );
            fmt.fourcc = desc.fourcc;
            desc
        }
    };

    // The size of decoded pictures is dictated by the coded stream.
    let frmsize = if coded {
        desc.frmsize
    } else {
        fmt.width = src_fmt.width;
        fmt.height = src_fmt.height;
        src_desc.frmsize
    };

    if let Some(frmsize) = frmsize {
        let resolution = frmsize.apply(fmt.resolution());
        fmt.width = resolution.width;
        fmt.height = resolution.height;
    }

    if coded {
        fmt.bytesperline = 0;
        if fmt.sizeimage == 0 {
            fmt.sizeimage = desc.header_size + fmt.width * fmt.height * desc.max_depth;
        }
    } else {
        fill_raw_layout(&mut fmt)?;
    }

    Ok(fmt)
}

/// Returns the default raw format for pictures of `resolution`.
pub fn default_raw_format(
    formats: &[FormatDesc],
    resolution: Resolution,
) -> Result<PixFormat, M2mError> {
    let desc = default_format(formats, false)
        .ok_or_else(|| M2mError::InvalidArgument("no raw format available".into()))?;
    let mut fmt = PixFormat::new(desc.fourcc, resolution);
    fill_raw_layout(&mut fmt)?;

    Ok(fmt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::hantro::G1_VARIANT;

    fn vp8_src() -> (PixFormat, &'static FormatDesc) {
        let desc = find_format(G1_VARIANT.formats, VP8F).unwrap();
        let fmt = try_format(
            G1_VARIANT.formats,
            QueueType::Output,
            &PixFormat::new(VP8F, Resolution::from((1280, 720))),
            &PixFormat::default(),
            desc,
        )
        .unwrap();

        (fmt, desc)
    }

    #[test]
    fn coded_defaults() {
        let (fmt, desc) = vp8_src();

        assert_eq!(fmt.fourcc, VP8F);
        assert_eq!(fmt.resolution(), Resolution::from((1280, 720)));
        assert_eq!(fmt.sizeimage, desc.header_size + 1280 * 720 * desc.max_depth);
    }

    #[test]
    fn coded_size_is_clamped_and_aligned() {
        let (_, desc) = vp8_src();

        let fmt = try_format(
            G1_VARIANT.formats,
            QueueType::Output,
            &PixFormat::new(VP8F, Resolution::from((17, 4000))),
            &PixFormat::default(),
            desc,
        )
        .unwrap();
        assert_eq!(fmt.resolution(), Resolution::from((48, 2160)));

        let fmt = try_format(
            G1_VARIANT.formats,
            QueueType::Output,
            &PixFormat::new(VP8F, Resolution::from((1921, 1080))),
            &PixFormat::default(),
            desc,
        )
        .unwrap();
        assert_eq!(fmt.resolution(), Resolution::from((1936, 1088)));
    }

    #[test]
    fn client_sizeimage_is_kept() {
        let (_, desc) = vp8_src();

        let requested = PixFormat {
            sizeimage: 4096,
            ..PixFormat::new(VP8F, Resolution::from((640, 480)))
        };
        let fmt = try_format(
            G1_VARIANT.formats,
            QueueType::Output,
            &requested,
            &PixFormat::default(),
            desc,
        )
        .unwrap();
        assert_eq!(fmt.sizeimage, 4096);
    }

    #[test]
    fn capture_follows_output() {
        let (src, desc) = vp8_src();

        let fmt = try_format(
            G1_VARIANT.formats,
            QueueType::Capture,
            &PixFormat::new(NV12, Resolution::from((64, 64))),
            &src,
            desc,
        )
        .unwrap();

        assert_eq!(fmt.fourcc, NV12);
        assert_eq!(fmt.resolution(), Resolution::from((1280, 720)));
        assert_eq!(fmt.bytesperline, 1280);
        assert_eq!(fmt.sizeimage, 1280 * 720 * 3 / 2);
    }

    #[test]
    fn unknown_formats_fall_back() {
        let (src, desc) = vp8_src();

        let fmt = try_format(
            G1_VARIANT.formats,
            QueueType::Capture,
            &PixFormat::new(Fourcc::from(b"YUYV"), Resolution::default()),
            &src,
            desc,
        )
        .unwrap();
        assert_eq!(fmt.fourcc, NV12);

        // Coded formats are not valid on the capture queue, and conversely.
        let fmt = try_format(
            G1_VARIANT.formats,
            QueueType::Output,
            &PixFormat::new(NV12, Resolution::from((320, 240))),
            &PixFormat::default(),
            desc,
        )
        .unwrap();
        assert_eq!(fmt.fourcc, VP8F);
    }

    #[test]
    fn enumeration() {
        assert_eq!(
            enum_formats(G1_VARIANT.formats, QueueType::Output).collect::<Vec<_>>(),
            vec![VP8F]
        );
        assert_eq!(
            enum_formats(G1_VARIANT.formats, QueueType::Capture).collect::<Vec<_>>(),
            vec![NV12]
        );
    }
}
