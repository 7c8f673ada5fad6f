//! Round-robin current sampling over the multiplexed ADC.

use egs_common::consts::{NUM_SOLENOIDS, SAMPLES_PER_BLOCK};
use egs_common::control_unit::solenoid::SolenoidId;
use egs_common::hal::driver::{AdcMux, HalError};

/// Averages ADC blocks for one channel at a time.
///
/// A visit routes the mux to the channel, reads `samples_per_visit` blocks
/// and averages the block means.
pub struct CurrentSampler {
    adc: Box<dyn AdcMux>,
    block: Box<[u16]>,
    samples_per_visit: usize,
    next: usize,
}

impl CurrentSampler {
    pub fn new(adc: Box<dyn AdcMux>, samples_per_visit: usize) -> Self {
        Self {
            adc,
            block: vec![0u16; SAMPLES_PER_BLOCK].into_boxed_slice(),
            samples_per_visit: samples_per_visit.max(1),
            next: 0,
        }
    }

    /// Averaged raw reading of `id`.
    pub fn sample(&mut self, id: SolenoidId) -> Result<u16, HalError> {
        self.adc.select(id.adc_channel())?;

        let mut total: u64 = 0;
        for _ in 0..self.samples_per_visit {
            let n = self.adc.read_block(&mut self.block)?.min(self.block.len());
            if n == 0 {
                return Err(HalError::CommunicationError(format!(
                    "{id}: ADC returned an empty block"
                )));
            }
            let sum: u64 = self.block[..n].iter().map(|&s| s as u64).sum();
            total += sum / n as u64;
        }
        Ok((total / self.samples_per_visit as u64) as u16)
    }

    /// Channel the next round-robin visit goes to.
    pub fn next_channel(&mut self) -> SolenoidId {
        let id = SolenoidId::ALL[self.next];
        self.next = (self.next + 1) % NUM_SOLENOIDS;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns `channel * 100 + block_index` for every sample.
    struct StepAdc {
        channel: Option<u8>,
        blocks: u16,
    }

    impl AdcMux for StepAdc {
        fn select(&mut self, channel: u8) -> Result<(), HalError> {
            self.channel = Some(channel);
            self.blocks = 0;
            Ok(())
        }

        fn read_block(&mut self, buf: &mut [u16]) -> Result<usize, HalError> {
            let ch = self
                .channel
                .ok_or_else(|| HalError::CommunicationError("no channel".into()))?;
            buf.fill(ch as u16 * 100 + self.blocks);
            self.blocks += 1;
            Ok(buf.len())
        }
    }

    struct EmptyAdc;

    impl AdcMux for EmptyAdc {
        fn select(&mut self, _channel: u8) -> Result<(), HalError> {
            Ok(())
        }

        fn read_block(&mut self, _buf: &mut [u16]) -> Result<usize, HalError> {
            Ok(0)
        }
    }

    #[test]
    fn averages_blocks_of_selected_channel() {
        let adc = StepAdc {
            channel: None,
            blocks: 0,
        };
        let mut sampler = CurrentSampler::new(Box::new(adc), 3);
        // Blocks 0, 1, 2 on channel 4 (SPC).
        assert_eq!(sampler.sample(SolenoidId::Spc).unwrap(), 401);
        assert_eq!(sampler.sample(SolenoidId::Y3).unwrap(), 1);
    }

    #[test]
    fn round_robin_wraps() {
        let mut sampler = CurrentSampler::new(Box::new(EmptyAdc), 1);
        let visited: Vec<_> = (0..NUM_SOLENOIDS + 1).map(|_| sampler.next_channel()).collect();
        assert_eq!(&visited[..NUM_SOLENOIDS], &SolenoidId::ALL);
        assert_eq!(visited[NUM_SOLENOIDS], SolenoidId::Y3);
    }

    #[test]
    fn empty_block_is_an_error() {
        let mut sampler = CurrentSampler::new(Box::new(EmptyAdc), 2);
        assert!(matches!(
            sampler.sample(SolenoidId::Tcc),
            Err(HalError::CommunicationError(_))
        ));
    }
}
