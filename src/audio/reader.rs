//! Incremental ring-buffer reader over a microphone device.
//!
//! The device's circular buffer is shared state: the device owns the write
//! head, the reader owns a read cursor. Each poll drains everything written
//! since the previous poll, splitting wrapped ranges into two reads.

use crate::audio::device::MicrophoneDevice;
use crate::error::Result;

/// Reads newly captured samples from a device's circular buffer.
pub struct RingBufferReader<M: MicrophoneDevice> {
    device: M,
    cursor: usize,
}

impl<M: MicrophoneDevice> RingBufferReader<M> {
    /// Wrap a device, with the read cursor at the buffer start.
    pub fn new(device: M) -> Self {
        Self { device, cursor: 0 }
    }

    /// Move the read cursor to the device's current write head.
    ///
    /// Called after the device has settled post-start, and again when a new
    /// recording begins, so stale buffer content is not replayed.
    pub fn sync_cursor(&mut self) {
        self.cursor = self.device.position();
    }

    /// All samples written since the previous poll, in chronological order.
    ///
    /// Returns an empty buffer when the device is not recording or no new
    /// samples have arrived. A write head behind the cursor means the device
    /// wrapped: the samples span cursor→end followed by start→head.
    pub fn poll(&mut self) -> Result<Vec<f32>> {
        if !self.device.is_recording() {
            return Ok(Vec::new());
        }

        let head = self.device.position();
        if head == self.cursor {
            return Ok(Vec::new());
        }

        let buffer_len = self.device.buffer_len();
        let available = if head > self.cursor {
            head - self.cursor
        } else {
            (buffer_len - self.cursor) + head
        };

        let mut samples = vec![0.0f32; available];
        if head > self.cursor {
            self.device.read(self.cursor, &mut samples)?;
        } else {
            let first_part = buffer_len - self.cursor;
            self.device.read(self.cursor, &mut samples[..first_part])?;
            if head > 0 {
                self.device.read(0, &mut samples[first_part..])?;
            }
        }

        self.cursor = head;
        Ok(samples)
    }

    pub fn device(&self) -> &M {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut M {
        &mut self.device
    }

    /// Release the wrapped device.
    pub fn into_device(self) -> M {
        self.device
    }
}
