// Fixed-capacity ring buffers for plotting
//
// One buffer per channel plus one shared timestamp buffer. All of them are
// written together per sample, so index i of every buffer refers to the same
// originating sample tuple.
//
// Empty-state convention: reads return only the samples pushed since the last
// allocation or resize, oldest first. A fresh buffer reads as empty.

use crate::types::{SampleTuple, StreamError, StreamResult};

/// Circular buffer of f64 that overwrites its oldest value when full
#[derive(Debug, Clone)]
pub struct RingBuffer {
    data: Vec<f64>,
    write_pos: usize,
    len: usize,
}

impl RingBuffer {
    /// Allocate a buffer holding `capacity` values
    ///
    /// Fails instead of aborting when the allocation cannot be satisfied.
    pub fn new(capacity: usize) -> StreamResult<Self> {
        if capacity == 0 {
            return Err(StreamError::Configuration(
                "Window size must be greater than zero".to_string(),
            ));
        }

        let mut data = Vec::new();
        data.try_reserve_exact(capacity).map_err(|e| {
            StreamError::Configuration(format!(
                "Cannot allocate a window of {} samples: {}",
                capacity, e
            ))
        })?;
        data.resize(capacity, 0.0);

        Ok(Self {
            data,
            write_pos: 0,
            len: 0,
        })
    }

    pub fn push(&mut self, value: f64) {
        let capacity = self.data.len();
        self.data[self.write_pos] = value;
        self.write_pos = (self.write_pos + 1) % capacity;
        if self.len < capacity {
            self.len += 1;
        }
    }

    /// Values oldest to newest
    pub fn read(&self) -> Vec<f64> {
        let capacity = self.data.len();
        let start = (self.write_pos + capacity - self.len) % capacity;
        let mut out = Vec::with_capacity(self.len);
        if start + self.len <= capacity {
            out.extend_from_slice(&self.data[start..start + self.len]);
        } else {
            out.extend_from_slice(&self.data[start..]);
            out.extend_from_slice(&self.data[..self.write_pos]);
        }
        out
    }

    pub fn latest(&self) -> Option<f64> {
        if self.len == 0 {
            return None;
        }
        let capacity = self.data.len();
        Some(self.data[(self.write_pos + capacity - 1) % capacity])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn clear(&mut self) {
        self.data.iter_mut().for_each(|v| *v = 0.0);
        self.write_pos = 0;
        self.len = 0;
    }
}

/// The aligned set of channel buffers plus the timestamp buffer
#[derive(Debug, Clone)]
pub struct SampleBuffers {
    time: RingBuffer,
    channels: Vec<RingBuffer>,
}

impl SampleBuffers {
    pub fn new(channel_count: usize, capacity: usize) -> StreamResult<Self> {
        let time = RingBuffer::new(capacity)?;
        let channels = (0..channel_count)
            .map(|_| RingBuffer::new(capacity))
            .collect::<StreamResult<Vec<_>>>()?;
        Ok(Self { time, channels })
    }

    /// Write one value to one channel buffer
    ///
    /// Callers that push per channel are responsible for keeping channels and
    /// timestamps aligned; `push_sample` does it for them.
    pub fn push(&mut self, channel: usize, value: f64) -> bool {
        match self.channels.get_mut(channel) {
            Some(buffer) => {
                buffer.push(value);
                true
            }
            None => false,
        }
    }

    pub fn push_time(&mut self, timestamp: f64) {
        self.time.push(timestamp);
    }

    /// Write a whole sample; rejected if its width does not match the channel count
    pub fn push_sample(&mut self, sample: &SampleTuple) -> bool {
        if sample.num_channels() != self.channels.len() {
            return false;
        }
        self.time.push(sample.timestamp);
        for (buffer, value) in self.channels.iter_mut().zip(&sample.values) {
            buffer.push(*value);
        }
        true
    }

    /// Reallocate every buffer at the new capacity, discarding history
    ///
    /// On failure the current buffers are left untouched.
    pub fn resize(&mut self, capacity: usize) -> StreamResult<()> {
        *self = Self::new(self.channels.len(), capacity)?;
        Ok(())
    }

    pub fn read(&self, channel: usize) -> Option<Vec<f64>> {
        self.channels.get(channel).map(RingBuffer::read)
    }

    pub fn read_time(&self) -> Vec<f64> {
        self.time.read()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn capacity(&self) -> usize {
        self.time.capacity()
    }

    /// Number of aligned samples currently held
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_fill_reads_in_order() {
        let mut buffer = RingBuffer::new(4).unwrap();
        assert!(buffer.read().is_empty());
        buffer.push(1.0);
        buffer.push(2.0);
        assert_eq!(buffer.read(), vec![1.0, 2.0]);
        assert_eq!(buffer.latest(), Some(2.0));
        assert_eq!(buffer.capacity(), 4);
    }

    #[test]
    fn test_overwrite_keeps_most_recent_window() {
        let mut buffer = RingBuffer::new(3).unwrap();
        for i in 0..10 {
            buffer.push(i as f64);
            assert!(buffer.read().len() <= 3);
        }
        assert_eq!(buffer.read(), vec![7.0, 8.0, 9.0]);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_capacity_one() {
        let mut buffer = RingBuffer::new(1).unwrap();
        buffer.push(5.0);
        buffer.push(6.0);
        assert_eq!(buffer.read(), vec![6.0]);
    }

    #[test]
    fn test_window_matches_tail_for_any_length() {
        for capacity in 1..6 {
            for pushes in 0..15 {
                let mut buffer = RingBuffer::new(capacity).unwrap();
                let values: Vec<f64> = (0..pushes).map(|i| i as f64).collect();
                values.iter().for_each(|v| buffer.push(*v));

                let expected_start = values.len().saturating_sub(capacity);
                assert_eq!(buffer.read(), values[expected_start..].to_vec());
            }
        }
    }

    #[test]
    fn test_sample_buffers_stay_aligned() {
        let mut buffers = SampleBuffers::new(2, 3).unwrap();
        let samples = [
            SampleTuple::new(0.0, vec![1.0, 2.0]),
            SampleTuple::new(1.0, vec![3.0, 4.0]),
            SampleTuple::new(2.0, vec![5.0, 6.0]),
            SampleTuple::new(3.0, vec![7.0, 8.0]),
        ];
        for sample in &samples {
            assert!(buffers.push_sample(sample));
        }

        assert_eq!(buffers.read(0).unwrap(), vec![3.0, 5.0, 7.0]);
        assert_eq!(buffers.read(1).unwrap(), vec![4.0, 6.0, 8.0]);
        assert_eq!(buffers.read_time(), vec![1.0, 2.0, 3.0]);
        assert!(buffers.read(2).is_none());
    }

    #[test]
    fn test_push_sample_rejects_wrong_width() {
        let mut buffers = SampleBuffers::new(2, 3).unwrap();
        assert!(!buffers.push_sample(&SampleTuple::new(0.0, vec![1.0])));
        assert!(buffers.is_empty());
        assert!(buffers.read_time().is_empty());
    }

    #[test]
    fn test_resize_clears_history() {
        let mut buffers = SampleBuffers::new(2, 3).unwrap();
        buffers.push_sample(&SampleTuple::new(0.0, vec![1.0, 2.0]));
        buffers.resize(5).unwrap();

        assert_eq!(buffers.capacity(), 5);
        assert_eq!(buffers.channel_count(), 2);
        assert!(buffers.read(0).unwrap().is_empty());
        assert!(buffers.read_time().is_empty());
        assert!(buffers.resize(0).is_err());
        assert_eq!(buffers.capacity(), 5);
    }

    #[test]
    fn test_per_channel_push() {
        let mut buffers = SampleBuffers::new(1, 2).unwrap();
        assert!(buffers.push(0, 1.5));
        assert!(!buffers.push(1, 1.5));
        buffers.push_time(0.25);
        assert_eq!(buffers.read(0).unwrap(), vec![1.5]);
        assert_eq!(buffers.read_time(), vec![0.25]);
    }

    #[test]
    fn test_oversized_window_is_an_error() {
        assert!(matches!(
            RingBuffer::new(usize::MAX),
            Err(StreamError::Configuration(_))
        ));

        let mut buffers = SampleBuffers::new(2, 3).unwrap();
        buffers.push_sample(&SampleTuple::new(0.0, vec![1.0, 2.0]));
        assert!(matches!(
            buffers.resize(usize::MAX),
            Err(StreamError::Configuration(_))
        ));
        assert_eq!(buffers.capacity(), 3);
        assert_eq!(buffers.read(0).unwrap(), vec![1.0]);
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(matches!(
            SampleBuffers::new(2, 0),
            Err(StreamError::Configuration(_))
        ));
    }
}
