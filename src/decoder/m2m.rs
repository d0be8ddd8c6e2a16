// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Memory-to-memory decoding sessions.
//!
//! A [`CodecContext`] is the state of one client of a decoding device: the formats negotiated on
//! its coded (output) and picture (capture) queues, its buffers, its controls, and the codec state
//! used by the hardware programmer. Decode jobs pair the next queued source buffer with the next
//! queued destination buffer, program the hardware through the [`CodecOps`] of the active codec,
//! and return both buffers to the client when the hardware reports completion or the job watchdog
//! expires.
//!
//! The session moves through the following states:
//!
//! * [`SessionState::Idle`]: nothing negotiated yet, or streaming stopped.
//! * [`SessionState::FormatNegotiated`]: the coded format has been set.
//! * [`SessionState::Streaming`]: both queues are streaming, jobs can run.

pub mod controls;
pub mod format;
pub mod job;
pub mod queue;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::backend::hantro::HantroDevice;
use crate::codec::vp8::frame::Frame;
use crate::codec::vp8::frame::FrameError;
use crate::codec::vp8::partitions::PartitionLayout;
use crate::decoder::m2m::controls::ControlHandler;
use crate::decoder::m2m::format::CodecMode;
use crate::decoder::m2m::format::FormatDesc;
use crate::decoder::m2m::format::FrameSizeRange;
use crate::decoder::m2m::format::PixFormat;
use crate::decoder::m2m::format::QueueType;
use crate::decoder::m2m::job::Job;
use crate::decoder::m2m::job::JobOutcome;
use crate::decoder::m2m::queue::BufferQueue;
use crate::decoder::m2m::queue::BufferState;
use crate::decoder::m2m::queue::DequeuedBuffer;
use crate::decoder::m2m::queue::QBuffer;
use crate::device::dma::DmaAddr;
use crate::device::dma::DmaAllocator;
use crate::device::dma::DmaError;
use crate::device::regs::RegisterAccess;
use crate::device::regs::RegisterError;
use crate::Fourcc;

const EBUSY: i32 = 16;
const EINVAL: i32 = 22;
const ENOMEM: i32 = 12;
const ETIMEDOUT: i32 = 110;
const EIO: i32 = 5;

#[derive(Debug, Error)]
pub enum M2mError {
    #[error("resource busy")]
    Busy,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid frame parameters: {0}")]
    InvalidFrame(#[from] FrameError),
    #[error("out of DMA memory: {0}")]
    NoMemory(#[from] DmaError),
    #[error("hardware not ready: {0}")]
    HardwareNotReady(#[from] RegisterError),
    #[error("no frame parameters control for the current codec")]
    NoFrameControl,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl M2mError {
    /// Returns the negative status code matching this error.
    pub fn errno(&self) -> i32 {
        let errno = match self {
            M2mError::Busy => EBUSY,
            M2mError::InvalidArgument(_) | M2mError::InvalidFrame(_) | M2mError::NoFrameControl => {
                EINVAL
            }
            M2mError::NoMemory(_) => ENOMEM,
            M2mError::HardwareNotReady(_) => ETIMEDOUT,
            M2mError::Backend(_) => EIO,
        };

        -errno
    }
}

/// Lookup of reference pictures among the decoded pictures of a session.
pub trait ReferenceLookup {
    /// Returns the address of the decoded picture with `timestamp`, if it is still around.
    fn find_reference(&self, timestamp: u64) -> Option<DmaAddr>;
}

/// Everything a codec needs to program one decode job.
pub struct RunContext<'a> {
    /// Current frame parameters, if the session has such a control.
    pub frame: Option<&'a Frame>,
    pub src_dma: DmaAddr,
    /// Coded data of the source buffer.
    pub src_data: &'a [u8],
    pub dst_dma: DmaAddr,
    pub dst_format: &'a PixFormat,
    pub refs: &'a dyn ReferenceLookup,
}

/// Reference slot of a VP8 frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefSlot {
    Last,
    Golden,
    Alt,
}

/// A reference that could not be found, and was replaced by the destination picture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissingReference {
    pub slot: RefSlot,
    pub timestamp: u64,
}

/// Diagnostics of a programmed job.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    pub missing_refs: Vec<MissingReference>,
    pub partitions: Option<PartitionLayout>,
}

/// Hooks implemented by each hardware codec.
pub trait CodecOps: Send {
    /// Allocates the per-session state needed to decode pictures of `dst_format`.
    fn init(&mut self, alloc: &mut dyn DmaAllocator, dst_format: &PixFormat) -> Result<(), M2mError>;

    /// Releases what `init` allocated.
    fn exit(&mut self, alloc: &mut dyn DmaAllocator);

    /// Writes the register program of one decode job, without starting the hardware.
    fn run(
        &mut self,
        regs: &mut dyn RegisterAccess,
        ctx: &RunContext,
    ) -> Result<RunReport, M2mError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    FormatNegotiated,
    Streaming,
}

/// A decoding session.
pub struct CodecContext<R: RegisterAccess + Send + 'static> {
    device: HantroDevice<R>,
    alloc: Box<dyn DmaAllocator + Send>,
    state: SessionState,

    src_fmt: PixFormat,
    src_desc: &'static FormatDesc,
    dst_fmt: PixFormat,

    output: BufferQueue,
    capture: BufferQueue,
    controls: ControlHandler,

    codec_mode: CodecMode,
    codec: Option<Box<dyn CodecOps>>,
    job: Option<Job>,
    last_report: Option<RunReport>,
}

impl<R: RegisterAccess + Send + 'static> CodecContext<R> {
    /// Opens a new session on `device`, allocating auxiliary buffers from `alloc`.
    pub fn new(device: HantroDevice<R>, alloc: Box<dyn DmaAllocator + Send>) -> Result<Self, M2mError> {
        let formats = device.variant().formats;
        let src_desc = format::default_format(formats, true)
            .ok_or_else(|| M2mError::InvalidArgument("no coded format available".into()))?;
        let codec_mode = src_desc
            .codec_mode
            .ok_or_else(|| M2mError::InvalidArgument("coded format without codec".into()))?;

        let resolution = src_desc.frmsize.map(|f| f.min()).unwrap_or_default();
        let src_fmt = format::try_format(
            formats,
            QueueType::Output,
            &PixFormat::new(src_desc.fourcc, resolution),
            &PixFormat::default(),
            src_desc,
        )?;
        let dst_fmt = format::default_raw_format(formats, resolution)?;

        log::debug!(
            "new {} session: {} {}x{}, {}",
            device.variant().name,
            src_fmt.fourcc,
            src_fmt.width,
            src_fmt.height,
            dst_fmt.fourcc
        );

        Ok(Self {
            controls: ControlHandler::new(formats),
            device,
            alloc,
            state: SessionState::Idle,
            src_fmt,
            src_desc,
            dst_fmt,
            output: BufferQueue::new(QueueType::Output),
            capture: BufferQueue::new(QueueType::Capture),
            codec_mode,
            codec: None,
            job: None,
            last_report: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn device(&self) -> &HantroDevice<R> {
        &self.device
    }

    fn queue(&self, queue: QueueType) -> &BufferQueue {
        match queue {
            QueueType::Output => &self.output,
            QueueType::Capture => &self.capture,
        }
    }

    fn queue_mut(&mut self, queue: QueueType) -> &mut BufferQueue {
        match queue {
            QueueType::Output => &mut self.output,
            QueueType::Capture => &mut self.capture,
        }
    }

    /// Returns the current format of `queue`.
    pub fn format(&self, queue: QueueType) -> &PixFormat {
        match queue {
            QueueType::Output => &self.src_fmt,
            QueueType::Capture => &self.dst_fmt,
        }
    }

    pub fn enum_formats(&self, queue: QueueType) -> Vec<Fourcc> {
        format::enum_formats(self.device.variant().formats, queue).collect()
    }

    pub fn enum_framesizes(&self, fourcc: Fourcc) -> Option<FrameSizeRange> {
        format::find_format(self.device.variant().formats, fourcc).and_then(|f| f.frmsize)
    }

    /// Returns the format `queue` would use if `fmt` were set on it.
    pub fn try_format(&self, queue: QueueType, fmt: &PixFormat) -> Result<PixFormat, M2mError> {
        format::try_format(
            self.device.variant().formats,
            queue,
            fmt,
            &self.src_fmt,
            self.src_desc,
        )
    }

    /// Sets the format of `queue` to the closest match of `fmt`, and returns it.
    pub fn set_format(&mut self, queue: QueueType, fmt: &PixFormat) -> Result<PixFormat, M2mError> {
        let new_fmt = self.try_format(queue, fmt)?;
        let formats = self.device.variant().formats;

        match queue {
            QueueType::Output => {
                // A new coded format can only be set while no buffers are allocated, unless only
                // the resolution changes and streaming has not started.
                if self.output.is_streaming()
                    || (self.output.is_busy() && new_fmt.fourcc != self.src_fmt.fourcc)
                {
                    return Err(M2mError::Busy);
                }

                // Changing the coded format resets the picture format.
                if self.capture.is_busy() {
                    return Err(M2mError::Busy);
                }

                let desc = format::find_format(formats, new_fmt.fourcc)
                    .ok_or_else(|| M2mError::InvalidArgument("unknown coded format".into()))?;
                self.codec_mode = desc
                    .codec_mode
                    .ok_or_else(|| M2mError::InvalidArgument("coded format without codec".into()))?;
                self.src_desc = desc;
                self.src_fmt = new_fmt;
                self.dst_fmt = format::default_raw_format(formats, new_fmt.resolution())?;

                if self.state == SessionState::Idle {
                    self.state = SessionState::FormatNegotiated;
                }
            }
            QueueType::Capture => {
                if self.capture.is_busy() {
                    return Err(M2mError::Busy);
                }

                // The decoder may be using the current resolution already.
                if self.output.is_busy() && fmt.resolution() != self.dst_fmt.resolution() {
                    return Err(M2mError::Busy);
                }

                self.dst_fmt = new_fmt;
            }
        }

        log::debug!(
            "{:?} format set to {} {}x{} ({} bytes)",
            queue,
            new_fmt.fourcc,
            new_fmt.width,
            new_fmt.height,
            new_fmt.sizeimage
        );

        Ok(new_fmt)
    }

    /// Registers buffers at `dma_addrs` on `queue`, or frees all buffers of `queue` if empty.
    pub fn request_buffers(&mut self, queue: QueueType, dma_addrs: &[DmaAddr]) -> Result<usize, M2mError> {
        let length = self.format(queue).sizeimage;
        self.queue_mut(queue).request_buffers(dma_addrs, length)
    }

    /// Queues buffer `index` of `queue`.
    pub fn queue_buffer(&mut self, queue: QueueType, index: usize, qbuf: QBuffer) -> Result<(), M2mError> {
        let min_length = match queue {
            QueueType::Output => 0,
            QueueType::Capture => self.dst_fmt.sizeimage,
        };

        self.queue_mut(queue).queue(index, qbuf, min_length)
    }

    /// Returns the next buffer of `queue` that has been processed.
    pub fn dequeue_buffer(&mut self, queue: QueueType) -> Option<DequeuedBuffer> {
        self.queue_mut(queue).dequeue()
    }

    /// Sets the frame parameters used by the jobs that do not carry their own.
    pub fn set_vp8_frame(&mut self, frame: Frame) -> Result<(), M2mError> {
        self.controls.set_vp8_frame(frame)
    }

    pub fn controls(&self) -> &ControlHandler {
        &self.controls
    }

    /// Starts streaming on `queue`. Starting the coded queue initializes the codec.
    pub fn stream_on(&mut self, queue: QueueType) -> Result<(), M2mError> {
        if self.queue(queue).is_streaming() {
            return Ok(());
        }

        if queue.is_coded() {
            let mut codec = (self.device.variant().codec_ops)(self.codec_mode).ok_or_else(|| {
                M2mError::InvalidArgument(format!("{:?} not supported", self.codec_mode))
            })?;
            codec.init(self.alloc.as_mut(), &self.dst_fmt)?;
            self.codec = Some(codec);
        }

        self.queue_mut(queue).stream_on();

        if self.output.is_streaming() && self.capture.is_streaming() {
            log::debug!("session streaming");
            self.state = SessionState::Streaming;
        }

        Ok(())
    }

    /// Stops streaming on `queue`. Stopping the coded queue releases the codec state.
    pub fn stream_off(&mut self, queue: QueueType) {
        if !self.queue(queue).is_streaming() {
            return;
        }

        // The running job uses buffers of both queues.
        if self.job.is_some() {
            self.wait_job(None);
        }

        self.queue_mut(queue).stream_off();

        if queue.is_coded() {
            if let Some(mut codec) = self.codec.take() {
                codec.exit(self.alloc.as_mut());
            }
        }

        if self.state == SessionState::Streaming {
            log::debug!("session stopped");
            self.state = SessionState::Idle;
        }
    }

    /// Diagnostics of the last job that was started.
    pub fn last_report(&self) -> Option<&RunReport> {
        self.last_report.as_ref()
    }

    pub fn has_pending_job(&self) -> bool {
        self.job.is_some()
    }

    /// Starts a decode job if buffers are available on both queues.
    ///
    /// Returns `Ok(true)` if a job has been started. If the job could not be started, its buffers
    /// are returned in the error state and the error is returned.
    pub fn try_run(&mut self) -> Result<bool, M2mError> {
        if self.state != SessionState::Streaming
            || self.job.is_some()
            || self.output.num_ready() == 0
            || self.capture.num_ready() == 0
            || self.device.is_busy()
        {
            return Ok(false);
        }

        let (src, dst) = match (self.output.take_ready(), self.capture.take_ready()) {
            (Some(src), Some(dst)) => (src, dst),
            _ => return Ok(false),
        };

        match self.run_job(src, dst) {
            Ok(job) => {
                self.job = Some(job);
                Ok(true)
            }
            Err(e) => {
                log::error!("failed to start job: {}", e);
                self.complete_buffers(src, dst, BufferState::Error);
                Err(e)
            }
        }
    }

    fn run_job(&mut self, src: usize, dst: usize) -> Result<Job, M2mError> {
        let (src_dma, src_data, meta) = {
            let src_buf = self
                .output
                .buffer_mut(src)
                .ok_or_else(|| M2mError::InvalidArgument(format!("no source buffer {}", src)))?;
            if let Some(request) = src_buf.request.as_mut() {
                request.apply(&mut self.controls)?;
            }
            (src_buf.dma, src_buf.data.clone(), src_buf.meta)
        };

        let dst_buf = self
            .capture
            .buffer_mut(dst)
            .ok_or_else(|| M2mError::InvalidArgument(format!("no destination buffer {}", dst)))?;
        dst_buf.meta = meta;
        let dst_dma = dst_buf.dma;

        let codec = self
            .codec
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("no codec initialized"))?;

        let ctx = RunContext {
            frame: self.controls.vp8_frame(),
            src_dma,
            src_data: &src_data,
            dst_dma,
            dst_format: &self.dst_fmt,
            refs: &self.capture,
        };

        let (report, completion) = self.device.run(codec.as_mut(), &ctx)?;
        self.last_report = Some(report);

        Ok(Job {
            src,
            dst,
            completion,
        })
    }

    /// Finishes the running job if it has completed, or waits for it for at most `timeout`.
    /// `None` waits until the job completes, which the watchdog bounds.
    pub fn wait_job(&mut self, timeout: Option<Duration>) -> Option<JobOutcome> {
        let completion = Arc::clone(&self.job.as_ref()?.completion);
        let outcome = completion.wait(timeout)?;
        self.finish_job(outcome);

        Some(outcome)
    }

    fn finish_job(&mut self, outcome: JobOutcome) {
        let Some(job) = self.job.take() else {
            return;
        };

        log::debug!(
            "job {}->{} finished: {:?}",
            job.src,
            job.dst,
            outcome
        );

        let state = outcome.buffer_state();
        if state == BufferState::Done {
            let sizeimage = self.dst_fmt.sizeimage;
            if let Some(dst) = self.capture.buffer_mut(job.dst) {
                dst.bytesused = sizeimage;
            }
        }

        self.complete_buffers(job.src, job.dst, state);
    }

    fn complete_buffers(&mut self, src: usize, dst: usize, state: BufferState) {
        if let Some(request) = self.output.buffer_mut(src).and_then(|b| b.request.as_mut()) {
            request.complete();
        }

        self.output.finish(src, state);
        self.capture.finish(dst, state);
    }
}

impl<R: RegisterAccess + Send + 'static> Drop for CodecContext<R> {
    fn drop(&mut self) {
        if self.job.is_some() {
            self.wait_job(None);
        }

        if let Some(mut codec) = self.codec.take() {
            codec.exit(self.alloc.as_mut());
        }
    }
}
