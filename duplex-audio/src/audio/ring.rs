//! Lock-free sample ring buffers
//!
//! Bridges cpal's real-time callbacks and the blocking read/write calls of
//! [`CpalStream`](crate::audio::cpal_backend::CpalStream). The callback side
//! never blocks or allocates.
//!
//! # Example
//!
//! ```
//! use duplex_audio::audio::ring::SampleRing;
//!
//! let (mut producer, mut consumer) = SampleRing::new::<f32>(4096);
//!
//! producer.push_slice(&[0.5f32; 480]);
//!
//! let mut output = vec![0.0f32; 480];
//! assert_eq!(consumer.pop_slice(&mut output), 480);
//! ```

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};

use crate::audio::native::Sample;

/// Sample ring buffer constructor
pub struct SampleRing;

/// Writing half of a sample ring
pub struct RingProducer<S: Sample> {
    producer: HeapProd<S>,
}

/// Reading half of a sample ring
pub struct RingConsumer<S: Sample> {
    consumer: HeapCons<S>,
}

impl SampleRing {
    /// Create a ring holding `capacity` samples
    ///
    /// # Returns
    ///
    /// A (producer, consumer) pair
    pub fn new<S: Sample>(capacity: usize) -> (RingProducer<S>, RingConsumer<S>) {
        let rb = HeapRb::<S>::new(capacity);
        let (producer, consumer) = rb.split();

        (RingProducer { producer }, RingConsumer { consumer })
    }
}

impl<S: Sample> RingProducer<S> {
    /// Write as many samples as fit
    ///
    /// # Returns
    ///
    /// Number of samples written
    pub fn push_slice(&mut self, samples: &[S]) -> usize {
        self.producer.push_slice(samples)
    }

    /// Samples written but not yet consumed
    pub fn pending(&self) -> usize {
        self.producer.occupied_len()
    }
}

impl<S: Sample> RingConsumer<S> {
    /// Read as many samples as are available into `output`
    ///
    /// # Returns
    ///
    /// Number of samples read
    pub fn pop_slice(&mut self, output: &mut [S]) -> usize {
        self.consumer.pop_slice(output)
    }
}
