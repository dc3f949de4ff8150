//! Synthetic pump-signal generator
//!
//! Produces raw-rate voltage blocks for a scripted delivery cycle:
//! steady baseline, ramped voltage drop as flow starts, steady running
//! phase with the pump's cyclic ripple superimposed, then recovery.
//! Gaussian sensor noise rides on everything. Used by the `simulate`
//! binary, the in-process simulated source, and the regression tests.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::types::SampleBlock;

/// Scenario parameters. Defaults describe the 10 kHz rev-B front end
/// driving a rotary pump at 300 flow units.
#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub raw_rate_hz: f64,
    pub block_len: usize,
    /// Flow-channel baseline (V).
    pub base_volts: f64,
    /// Full voltage drop at running flow (V).
    pub drop_volts: f64,
    /// Cyclic ripple amplitude at running flow (V).
    pub ripple_volts: f64,
    /// Gaussian sensor noise sigma (V).
    pub noise_volts: f64,
    /// Seconds of idle baseline before flow starts.
    pub idle_s: f64,
    /// Seconds the start/stop ramps take.
    pub ramp_s: f64,
    /// Seconds of steady running flow.
    pub run_s: f64,
    /// Simulated flow rate (device flow units).
    pub flow_units: f64,
    /// Ripple calibration (Hz per flow unit) — keep in sync with the
    /// profile under test.
    pub cal_hz_per_unit: f64,
    /// Thermistor divider voltage (V); default sits at 25 °C.
    pub temp_volts: f64,
    pub seed: u64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            raw_rate_hz: 10_000.0,
            block_len: 1000,
            base_volts: 2.5,
            drop_volts: 0.25,
            ripple_volts: 1.5e-3,
            noise_volts: 2.0e-3,
            idle_s: 20.0,
            ramp_s: 30.0,
            run_s: 120.0,
            flow_units: 300.0,
            cal_hz_per_unit: 5.8e-4,
            temp_volts: 2.728,
            seed: 7,
        }
    }
}

impl SynthConfig {
    /// Total scripted duration: idle, start ramp, run, stop ramp, and
    /// a trailing idle equal to the leading one.
    pub fn duration_s(&self) -> f64 {
        self.idle_s + self.ramp_s + self.run_s + self.ramp_s + self.idle_s
    }
}

/// Streaming generator, one [`SampleBlock`] pair per driver cadence.
pub struct PumpSignalSynth {
    cfg: SynthConfig,
    rng: StdRng,
    noise: Normal<f64>,
    sample_index: u64,
    seq: u64,
}

impl PumpSignalSynth {
    pub fn new(cfg: SynthConfig) -> Self {
        let noise = Normal::new(0.0, cfg.noise_volts.max(f64::MIN_POSITIVE))
            .unwrap_or_else(|_| Normal::new(0.0, 1e-9).expect("valid sigma"));
        Self {
            rng: StdRng::seed_from_u64(cfg.seed),
            noise,
            sample_index: 0,
            seq: 0,
            cfg,
        }
    }

    pub fn config(&self) -> &SynthConfig {
        &self.cfg
    }

    /// Driver block period (seconds).
    pub fn block_period_s(&self) -> f64 {
        self.cfg.block_len as f64 / self.cfg.raw_rate_hz
    }

    pub fn finished(&self) -> bool {
        self.sample_index as f64 / self.cfg.raw_rate_hz >= self.cfg.duration_s()
    }

    /// Flow envelope (0..1) at scenario time `t`.
    fn envelope(&self, t: f64) -> f64 {
        let c = &self.cfg;
        let start_ramp = c.idle_s;
        let running = start_ramp + c.ramp_s;
        let stop_ramp = running + c.run_s;
        let stopped = stop_ramp + c.ramp_s;
        if t < start_ramp {
            0.0
        } else if t < running {
            (t - start_ramp) / c.ramp_s
        } else if t < stop_ramp {
            1.0
        } else if t < stopped {
            1.0 - (t - stop_ramp) / c.ramp_s
        } else {
            0.0
        }
    }

    /// Next driver batch (flow block + temperature block), or `None`
    /// once the scenario is over.
    pub fn next_batch(&mut self) -> Option<Vec<SampleBlock>> {
        if self.finished() {
            return None;
        }
        let c = self.cfg.clone();
        let ripple_hz = c.flow_units * c.cal_hz_per_unit;

        let mut flow = Vec::with_capacity(c.block_len);
        let mut temp = Vec::with_capacity(c.block_len);
        for _ in 0..c.block_len {
            let t = self.sample_index as f64 / c.raw_rate_hz;
            let env = self.envelope(t);
            let ripple = c.ripple_volts * env
                * (2.0 * std::f64::consts::PI * ripple_hz * t).sin();
            flow.push(
                c.base_volts - c.drop_volts * env + ripple + self.noise.sample(&mut self.rng),
            );
            temp.push(c.temp_volts + 0.1 * self.noise.sample(&mut self.rng));
            self.sample_index += 1;
        }

        let seq = self.seq;
        self.seq += 1;
        Some(vec![
            SampleBlock::new(0, seq, flow),
            SampleBlock::new(1, seq, temp),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_config() -> SynthConfig {
        SynthConfig {
            raw_rate_hz: 100.0,
            block_len: 50,
            idle_s: 1.0,
            ramp_s: 1.0,
            run_s: 2.0,
            seed: 42,
            ..SynthConfig::default()
        }
    }

    #[test]
    fn scenario_produces_the_expected_sample_count() {
        let cfg = short_config();
        let expected = (cfg.duration_s() * cfg.raw_rate_hz) as usize;
        let mut synth = PumpSignalSynth::new(cfg);
        let mut samples = 0;
        while let Some(batch) = synth.next_batch() {
            assert_eq!(batch.len(), 2);
            assert_eq!(batch[0].channel, 0);
            assert_eq!(batch[1].channel, 1);
            assert_eq!(batch[0].samples.len(), batch[1].samples.len());
            samples += batch[0].samples.len();
        }
        assert_eq!(samples, expected);
    }

    #[test]
    fn running_phase_sits_below_the_baseline() {
        let cfg = short_config();
        let mut synth = PumpSignalSynth::new(cfg.clone());

        let mut idle_avg = None;
        let mut run_avg = None;
        let mut t = 0.0;
        while let Some(batch) = synth.next_batch() {
            let avg: f64 =
                batch[0].samples.iter().sum::<f64>() / batch[0].samples.len() as f64;
            if t < cfg.idle_s && idle_avg.is_none() {
                idle_avg = Some(avg);
            }
            // Midway through the running phase.
            if t > cfg.idle_s + cfg.ramp_s + 0.5 && run_avg.is_none() {
                run_avg = Some(avg);
            }
            t += batch[0].samples.len() as f64 / cfg.raw_rate_hz;
        }

        let idle_avg = idle_avg.expect("idle block seen");
        let run_avg = run_avg.expect("running block seen");
        assert!((idle_avg - cfg.base_volts).abs() < 0.01, "idle {idle_avg}");
        assert!(
            (idle_avg - run_avg - cfg.drop_volts).abs() < 0.02,
            "drop {}",
            idle_avg - run_avg
        );
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let a: Vec<f64> = PumpSignalSynth::new(short_config())
            .next_batch()
            .expect("first batch")[0]
            .samples
            .clone();
        let b: Vec<f64> = PumpSignalSynth::new(short_config())
            .next_batch()
            .expect("first batch")[0]
            .samples
            .clone();
        assert_eq!(a, b);
    }
}
