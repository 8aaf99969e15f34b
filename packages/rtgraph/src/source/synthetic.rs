// Synthetic sample source
//
// Generates samples at a fixed cadence without any hardware:
// - channel 0: 1 Hz sine, deterministic
// - channel 1: uniform noise in [-1, 1), reproducible when seeded
//
// Timestamps are nominal (sample index / rate), so they are monotonic and
// independent of scheduling jitter.

use super::SampleSource;
use crate::types::{SampleTuple, StreamError, StreamResult};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::TAU;
use tokio::time::{interval, Duration, Interval, MissedTickBehavior};

/// Number of channels the synthetic source produces
pub const SYNTHETIC_CHANNELS: usize = 2;

const SINE_FREQUENCY_HZ: f64 = 1.0;

pub struct SyntheticSampleSource {
    rate: u32,
    seed: Option<u64>,
    rng: StdRng,
    ticker: Option<Interval>,
    sample_index: u64,
}

impl SyntheticSampleSource {
    pub fn new(rate: u32, seed: Option<u64>) -> Self {
        Self {
            rate: rate.max(1),
            seed,
            rng: Self::make_rng(seed),
            ticker: None,
            sample_index: 0,
        }
    }

    fn make_rng(seed: Option<u64>) -> StdRng {
        match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate as f64)
    }

    /// Produce the sample for the current index and advance
    fn next_sample(&mut self) -> SampleTuple {
        let t = self.sample_index as f64 / self.rate as f64;
        self.sample_index += 1;

        let sine = (TAU * SINE_FREQUENCY_HZ * t).sin();
        let noise = self.rng.random_range(-1.0..1.0);
        SampleTuple::new(t, vec![sine, noise])
    }
}

#[async_trait]
impl SampleSource for SyntheticSampleSource {
    async fn open(&mut self) -> StreamResult<()> {
        if self.ticker.is_some() {
            return Ok(());
        }

        let mut ticker = interval(self.period());
        // Catch up after a stall so the nominal rate holds on average
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        self.ticker = Some(ticker);
        self.sample_index = 0;
        self.rng = Self::make_rng(self.seed);

        log::info!("Synthetic source started at {} samples/s", self.rate);
        Ok(())
    }

    async fn read_next(&mut self) -> StreamResult<SampleTuple> {
        let ticker = self.ticker.as_mut().ok_or(StreamError::SourceClosed)?;
        ticker.tick().await;
        Ok(self.next_sample())
    }

    async fn close(&mut self) {
        if self.ticker.take().is_some() {
            log::info!(
                "Synthetic source stopped after {} samples",
                self.sample_index
            );
        }
    }

    fn is_open(&self) -> bool {
        self.ticker.is_some()
    }

    fn fixed_channel_count(&self) -> Option<usize> {
        Some(SYNTHETIC_CHANNELS)
    }

    fn describe(&self) -> String {
        format!("synthetic @ {} samples/s", self.rate)
    }
}
