// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Buffer queues of a mem2mem session.
//!
//! Buffers are allocated by the client and registered with [`BufferQueue::request_buffers`]. They
//! then cycle between the client and the decoder: queued by the client, picked up by a job, and
//! returned done (or in error) to be dequeued again.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::codec::vp8::frame::Frame;
use crate::decoder::m2m::controls::ControlRequest;
use crate::decoder::m2m::format::QueueType;
use crate::decoder::m2m::M2mError;
use crate::decoder::m2m::ReferenceLookup;
use crate::device::dma::DmaAddr;

/// Where a buffer currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferState {
    /// Owned by the client.
    Dequeued,
    /// Waiting to be picked up by a job.
    Queued,
    /// Used by the running job.
    Active,
    /// Processed successfully, waiting to be dequeued.
    Done,
    /// Processing failed, waiting to be dequeued.
    Error,
}

/// Metadata travelling from a source buffer to the picture decoded from it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferMetadata {
    pub timestamp: u64,
    pub flags: u32,
}

/// Parameters of a buffer being queued.
#[derive(Debug, Default)]
pub struct QBuffer {
    data: Bytes,
    meta: BufferMetadata,
    frame: Option<Frame>,
}

impl QBuffer {
    pub fn new() -> Self {
        Default::default()
    }

    /// Coded data carried by an output buffer.
    pub fn data(mut self, data: Bytes) -> Self {
        self.data = data;
        self
    }

    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.meta.timestamp = timestamp;
        self
    }

    pub fn flags(mut self, flags: u32) -> Self {
        self.meta.flags = flags;
        self
    }

    /// Frame parameters to apply when this buffer is decoded.
    pub fn frame(mut self, frame: Frame) -> Self {
        self.frame = Some(frame);
        self
    }
}

#[derive(Debug)]
pub struct Buffer {
    pub index: usize,
    pub dma: DmaAddr,
    /// Size of the buffer memory.
    pub length: u32,
    /// Coded data of output buffers.
    pub data: Bytes,
    /// Bytes of the buffer holding valid data.
    pub bytesused: u32,
    pub meta: BufferMetadata,
    pub sequence: u32,
    pub state: BufferState,
    pub request: Option<ControlRequest>,
    /// Whether a picture has been decoded into this buffer.
    decoded: bool,
}

/// A buffer handed back to the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DequeuedBuffer {
    pub index: usize,
    pub state: BufferState,
    pub bytesused: u32,
    pub meta: BufferMetadata,
    pub sequence: u32,
    /// Whether the request attached to this buffer, if any, has completed.
    pub request_completed: Option<bool>,
}

#[derive(Debug)]
pub struct BufferQueue {
    queue_type: QueueType,
    buffers: Vec<Buffer>,
    ready: VecDeque<usize>,
    done: VecDeque<usize>,
    streaming: bool,
    sequence: u32,
}

impl BufferQueue {
    pub fn new(queue_type: QueueType) -> Self {
        Self {
            queue_type,
            buffers: Vec::new(),
            ready: VecDeque::new(),
            done: VecDeque::new(),
            streaming: false,
            sequence: 0,
        }
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    /// Whether buffers are allocated on this queue, in which case its format cannot change.
    pub fn is_busy(&self) -> bool {
        !self.buffers.is_empty()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn num_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn num_ready(&self) -> usize {
        self.ready.len()
    }

    pub fn buffer(&self, index: usize) -> Option<&Buffer> {
        self.buffers.get(index)
    }

    pub fn buffer_mut(&mut self, index: usize) -> Option<&mut Buffer> {
        self.buffers.get_mut(index)
    }

    /// Replaces the buffers of this queue with buffers at `dma_addrs`, each of `length` bytes. An
    /// empty `dma_addrs` frees all buffers.
    pub fn request_buffers(&mut self, dma_addrs: &[DmaAddr], length: u32) -> Result<usize, M2mError> {
        if self.streaming {
            return Err(M2mError::Busy);
        }

        self.ready.clear();
        self.done.clear();
        self.buffers = dma_addrs
            .iter()
            .enumerate()
            .map(|(index, dma)| Buffer {
                index,
                dma: *dma,
                length,
                data: Bytes::new(),
                bytesused: 0,
                meta: Default::default(),
                sequence: 0,
                state: BufferState::Dequeued,
                request: None,
                decoded: false,
            })
            .collect();

        log::debug!(
            "{:?} queue: {} buffers of {} bytes",
            self.queue_type,
            self.buffers.len(),
            length
        );

        Ok(self.buffers.len())
    }

    /// Queues buffer `index`, whose memory must be able to hold `min_length` bytes.
    pub fn queue(&mut self, index: usize, qbuf: QBuffer, min_length: u32) -> Result<(), M2mError> {
        let queue_type = self.queue_type;
        let buffer = self.buffers.get_mut(index).ok_or_else(|| {
            M2mError::InvalidArgument(format!("no buffer {} on {:?} queue", index, queue_type))
        })?;

        match buffer.state {
            BufferState::Dequeued | BufferState::Done | BufferState::Error => (),
            state => {
                return Err(M2mError::InvalidArgument(format!(
                    "buffer {} of {:?} queue is {:?}",
                    index, queue_type, state
                )))
            }
        }

        if buffer.length < min_length {
            return Err(M2mError::InvalidArgument(format!(
                "buffer {} is too small: {} < {} bytes",
                index, buffer.length, min_length
            )));
        }

        if qbuf.data.len() > buffer.length as usize {
            return Err(M2mError::InvalidArgument(format!(
                "{} bytes of payload do not fit in buffer {} ({} bytes)",
                qbuf.data.len(),
                index,
                buffer.length
            )));
        }

        let request = match qbuf.frame {
            Some(frame) => Some(ControlRequest::new(frame)?),
            None => None,
        };

        self.done.retain(|i| *i != index);

        buffer.bytesused = qbuf.data.len() as u32;
        buffer.data = qbuf.data;
        buffer.meta = qbuf.meta;
        buffer.request = request;
        buffer.state = BufferState::Queued;
        self.ready.push_back(index);

        Ok(())
    }

    /// Takes the next queued buffer for a job.
    pub fn take_ready(&mut self) -> Option<usize> {
        let index = self.ready.pop_front()?;
        if let Some(buffer) = self.buffers.get_mut(index) {
            buffer.state = BufferState::Active;
        }

        Some(index)
    }

    /// Returns buffer `index` to the client with `state`.
    pub fn finish(&mut self, index: usize, state: BufferState) {
        let Some(buffer) = self.buffers.get_mut(index) else {
            log::warn!("finishing unknown buffer {} of {:?} queue", index, self.queue_type);
            return;
        };

        buffer.state = state;
        buffer.sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        if self.queue_type == QueueType::Capture {
            buffer.decoded = state == BufferState::Done;
        }
        self.done.push_back(index);
    }

    /// Returns the next processed buffer, if any.
    pub fn dequeue(&mut self) -> Option<DequeuedBuffer> {
        let index = self.done.pop_front()?;
        let buffer = self.buffers.get_mut(index)?;
        let state = buffer.state;
        buffer.state = BufferState::Dequeued;

        Some(DequeuedBuffer {
            index,
            state,
            bytesused: buffer.bytesused,
            meta: buffer.meta,
            sequence: buffer.sequence,
            request_completed: buffer.request.as_ref().map(|r| r.is_complete()),
        })
    }

    pub fn stream_on(&mut self) {
        self.streaming = true;
        self.sequence = 0;
    }

    /// Stops streaming. Buffers still queued or active are returned in the error state.
    pub fn stream_off(&mut self) {
        self.streaming = false;

        let outstanding = self
            .buffers
            .iter()
            .filter(|b| matches!(b.state, BufferState::Queued | BufferState::Active))
            .map(|b| b.index)
            .collect::<Vec<_>>();
        self.ready.clear();

        for index in outstanding {
            if let Some(buffer) = self.buffers.get_mut(index) {
                buffer.state = BufferState::Error;
                self.done.push_back(index);
            }
        }
    }
}

impl ReferenceLookup for BufferQueue {
    fn find_reference(&self, timestamp: u64) -> Option<DmaAddr> {
        self.buffers
            .iter()
            .find(|b| b.decoded && b.state != BufferState::Active && b.meta.timestamp == timestamp)
            .map(|b| b.dma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture_queue() -> BufferQueue {
        let mut queue = BufferQueue::new(QueueType::Capture);
        queue
            .request_buffers(&[0x1000, 0x2000, 0x3000], 0x800)
            .unwrap();
        queue
    }

    #[test]
    fn cycle() {
        let mut queue = capture_queue();
        queue.stream_on();

        queue.queue(1, QBuffer::new(), 0x800).unwrap();
        queue.queue(0, QBuffer::new(), 0x800).unwrap();
        assert_eq!(queue.num_ready(), 2);

        assert_eq!(queue.take_ready(), Some(1));
        assert_eq!(queue.buffer(1).unwrap().state, BufferState::Active);
        assert_eq!(queue.dequeue(), None);

        queue.finish(1, BufferState::Done);
        let buf = queue.dequeue().unwrap();
        assert_eq!(buf.index, 1);
        assert_eq!(buf.state, BufferState::Done);
        assert_eq!(buf.sequence, 0);
        assert_eq!(queue.buffer(1).unwrap().state, BufferState::Dequeued);
    }

    #[test]
    fn invalid_queue() {
        let mut queue = capture_queue();

        assert!(matches!(
            queue.queue(3, QBuffer::new(), 0),
            Err(M2mError::InvalidArgument(_))
        ));
        assert!(matches!(
            queue.queue(0, QBuffer::new(), 0x801),
            Err(M2mError::InvalidArgument(_))
        ));

        queue.queue(0, QBuffer::new(), 0).unwrap();
        assert!(matches!(
            queue.queue(0, QBuffer::new(), 0),
            Err(M2mError::InvalidArgument(_))
        ));

        let mut output = BufferQueue::new(QueueType::Output);
        output.request_buffers(&[0x4000], 16).unwrap();
        assert!(matches!(
            output.queue(0, QBuffer::new().data(Bytes::from_static(&[0u8; 17])), 0),
            Err(M2mError::InvalidArgument(_))
        ));
    }

    #[test]
    fn realloc_while_streaming() {
        let mut queue = capture_queue();
        queue.stream_on();
        assert!(matches!(queue.request_buffers(&[], 0), Err(M2mError::Busy)));

        queue.stream_off();
        assert_eq!(queue.request_buffers(&[], 0).unwrap(), 0);
        assert!(!queue.is_busy());
    }

    #[test]
    fn stream_off_returns_outstanding_buffers() {
        let mut queue = capture_queue();
        queue.stream_on();
        queue.queue(0, QBuffer::new(), 0).unwrap();
        queue.queue(2, QBuffer::new(), 0).unwrap();
        queue.take_ready();

        queue.stream_off();

        let mut returned = vec![];
        while let Some(buf) = queue.dequeue() {
            assert_eq!(buf.state, BufferState::Error);
            returned.push(buf.index);
        }
        returned.sort();
        assert_eq!(returned, vec![0, 2]);
    }

    #[test]
    fn reference_lookup() {
        let mut queue = capture_queue();
        queue.stream_on();

        queue.queue(2, QBuffer::new(), 0).unwrap();
        let index = queue.take_ready().unwrap();
        queue.buffer_mut(index).unwrap().meta.timestamp = 42;
        // Not decoded yet.
        assert_eq!(queue.find_reference(42), None);

        queue.finish(index, BufferState::Done);
        assert_eq!(queue.find_reference(42), Some(0x3000));
        // Dequeued pictures remain valid references.
        queue.dequeue();
        assert_eq!(queue.find_reference(42), Some(0x3000));
        assert_eq!(queue.find_reference(0), None);
    }

    #[test]
    fn failed_pictures_are_not_references() {
        let mut queue = capture_queue();
        queue.stream_on();

        let decode = |queue: &mut BufferQueue, state: BufferState| {
            queue.queue(2, QBuffer::new(), 0).unwrap();
            let index = queue.take_ready().unwrap();
            queue.buffer_mut(index).unwrap().meta.timestamp = 42;
            queue.finish(index, state);
            queue.dequeue().unwrap()
        };

        assert_eq!(decode(&mut queue, BufferState::Error).state, BufferState::Error);
        assert_eq!(queue.find_reference(42), None);

        decode(&mut queue, BufferState::Done);
        assert_eq!(queue.find_reference(42), Some(0x3000));

        // A picture overwritten by a failed job is not a reference anymore.
        decode(&mut queue, BufferState::Error);
        assert_eq!(queue.find_reference(42), None);
    }
}
