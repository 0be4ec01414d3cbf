//! Purpose: Palmgren-Miner fatigue damage from an S-N curve, with simple run timing.
//! Exports: `SnCurve`, `synthetic_stress`, `damage_loop`, `damage_vectorized`, `time_runs`, `fatigue_report`.
//! Invariants: Only strictly positive stress samples contribute damage.
//! Invariants: Both damage strategies agree to a relative 1e-9.

use std::f64::consts::PI;
use std::time::{Duration, Instant};

use ndarray::Array1;
use serde::Serialize;

use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_SAMPLES: usize = 1_000_000;
pub const DEFAULT_AMPLITUDE: f64 = 120.0;
pub const DEFAULT_HALF_PERIODS: f64 = 200.0;
pub const DEFAULT_A: f64 = 1e12;
pub const DEFAULT_M: f64 = 3.0;
pub const DEFAULT_RUNS: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SnCurve {
    a: f64,
    m: f64,
}

impl SnCurve {
    pub fn new(a: f64, m: f64) -> Result<Self, Error> {
        if !(a.is_finite() && a > 0.0) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("S-N coefficient A must be a finite, positive number"));
        }
        if !(m.is_finite() && m > 0.0) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("S-N exponent m must be a finite, positive number"));
        }
        Ok(Self { a, m })
    }

    /// Cycles to failure at stress amplitude `stress`: `N = A * s^-m`.
    pub fn cycles_to_failure(&self, stress: f64) -> f64 {
        self.a * stress.powf(-self.m)
    }
}

impl Default for SnCurve {
    fn default() -> Self {
        Self {
            a: DEFAULT_A,
            m: DEFAULT_M,
        }
    }
}

/// `|amplitude * sin(t)|` sampled over `t in [0, half_periods * pi]`.
pub fn synthetic_stress(samples: usize, amplitude: f64, half_periods: f64) -> Array1<f64> {
    Array1::linspace(0.0, half_periods * PI, samples).mapv(|t| (amplitude * t.sin()).abs())
}

pub fn damage_loop(curve: &SnCurve, stress: &[f64]) -> f64 {
    let mut damage = 0.0;
    for &s in stress {
        if s > 0.0 {
            damage += 1.0 / curve.cycles_to_failure(s);
        }
    }
    damage
}

// 1/N rewritten as s^m / A so the whole history maps in one pass.
pub fn damage_vectorized(curve: &SnCurve, stress: &Array1<f64>) -> f64 {
    let (a, m) = (curve.a, curve.m);
    stress
        .mapv(|s| if s > 0.0 { s.powf(m) / a } else { 0.0 })
        .sum()
}

#[derive(Clone, Copy, Debug)]
pub struct Timing {
    pub runs: u32,
    pub average: Duration,
    pub result: f64,
}

pub fn time_runs<F>(runs: u32, mut f: F) -> Result<Timing, Error>
where
    F: FnMut() -> f64,
{
    if runs == 0 {
        return Err(Error::new(ErrorKind::Usage).with_message("--runs must be greater than zero"));
    }
    let started = Instant::now();
    let mut result = 0.0;
    for _ in 0..runs {
        result = f();
    }
    Ok(Timing {
        runs,
        average: started.elapsed() / runs,
        result,
    })
}

#[derive(Clone, Debug, Serialize)]
pub struct FatigueReport {
    pub samples: usize,
    pub runs: u32,
    pub damage_loop: f64,
    pub damage_vectorized: f64,
    pub loop_avg_secs: f64,
    pub vectorized_avg_secs: f64,
    pub speedup: Option<f64>,
}

pub fn fatigue_report(
    curve: SnCurve,
    samples: usize,
    amplitude: f64,
    runs: u32,
) -> Result<FatigueReport, Error> {
    if samples == 0 {
        return Err(Error::new(ErrorKind::Usage).with_message("--samples must be greater than zero"));
    }
    if !amplitude.is_finite() {
        return Err(Error::new(ErrorKind::Usage).with_message("--amplitude must be finite"));
    }
    let stress = synthetic_stress(samples, amplitude, DEFAULT_HALF_PERIODS);
    let slice = stress.as_slice().ok_or_else(|| {
        Error::new(ErrorKind::Internal).with_message("stress history is not contiguous")
    })?;

    let looped = time_runs(runs, || damage_loop(&curve, slice))?;
    let vectorized = time_runs(runs, || damage_vectorized(&curve, &stress))?;
    tracing::debug!(
        samples,
        runs,
        loop_secs = looped.average.as_secs_f64(),
        vectorized_secs = vectorized.average.as_secs_f64(),
        "fatigue timing"
    );

    let vectorized_secs = vectorized.average.as_secs_f64();
    Ok(FatigueReport {
        samples,
        runs,
        damage_loop: looped.result,
        damage_vectorized: vectorized.result,
        loop_avg_secs: looped.average.as_secs_f64(),
        vectorized_avg_secs: vectorized_secs,
        speedup: (vectorized_secs > 0.0).then(|| looped.average.as_secs_f64() / vectorized_secs),
    })
}
