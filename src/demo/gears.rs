//! Purpose: Ideal two-gear kinematics over a linear driver-speed ramp.
//! Exports: `GearTrain`, `GearReport`, `speed_ramp`, `gear_report`.
//! Invariants: `omega2 * r2 == omega1 * r1` (no slip); `torque1 * omega1 == torque2 * omega2`.

use ndarray::Array1;
use serde::Serialize;

use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_DRIVER_RADIUS: f64 = 0.05;
pub const DEFAULT_DRIVEN_RADIUS: f64 = 0.1;
pub const DEFAULT_MAX_SPEED: f64 = 100.0;
pub const DEFAULT_SAMPLES: usize = 500;
pub const DEFAULT_DRIVER_TORQUE: f64 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GearTrain {
    driver_radius: f64,
    driven_radius: f64,
}

impl GearTrain {
    pub fn new(driver_radius: f64, driven_radius: f64) -> Result<Self, Error> {
        ensure_positive("driver radius", driver_radius)?;
        ensure_positive("driven radius", driven_radius)?;
        Ok(Self {
            driver_radius,
            driven_radius,
        })
    }

    pub fn ratio(&self) -> f64 {
        self.driver_radius / self.driven_radius
    }

    pub fn driven_speed(&self, driver_speed: f64) -> f64 {
        self.ratio() * driver_speed
    }

    pub fn driven_speeds(&self, driver_speeds: &Array1<f64>) -> Array1<f64> {
        driver_speeds * self.ratio()
    }

    /// Output torque assuming lossless power transfer.
    pub fn driven_torque(&self, driver_torque: f64) -> f64 {
        (self.driven_radius / self.driver_radius) * driver_torque
    }
}

impl Default for GearTrain {
    fn default() -> Self {
        Self {
            driver_radius: DEFAULT_DRIVER_RADIUS,
            driven_radius: DEFAULT_DRIVEN_RADIUS,
        }
    }
}

/// Evenly spaced speeds from 0 to `max_speed`, both ends included.
pub fn speed_ramp(max_speed: f64, samples: usize) -> Result<Array1<f64>, Error> {
    if !max_speed.is_finite() || max_speed < 0.0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("max speed must be a finite, non-negative number"));
    }
    if samples < 2 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("a speed ramp needs at least 2 samples"));
    }
    Ok(Array1::linspace(0.0, max_speed, samples))
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GearReport {
    pub driver_radius_m: f64,
    pub driven_radius_m: f64,
    pub ratio: f64,
    pub samples: usize,
    pub speed_step: f64,
    pub driver_speed_max: f64,
    pub driven_speed_max: f64,
    pub driver_torque: f64,
    pub driven_torque: f64,
}

pub fn gear_report(
    train: GearTrain,
    max_speed: f64,
    samples: usize,
    driver_torque: f64,
) -> Result<GearReport, Error> {
    if !driver_torque.is_finite() {
        return Err(Error::new(ErrorKind::Usage).with_message("torque must be finite"));
    }
    let ramp = speed_ramp(max_speed, samples)?;
    let driven = train.driven_speeds(&ramp);
    Ok(GearReport {
        driver_radius_m: train.driver_radius,
        driven_radius_m: train.driven_radius,
        ratio: train.ratio(),
        samples: ramp.len(),
        speed_step: ramp[1] - ramp[0],
        driver_speed_max: ramp.iter().last().copied().unwrap_or_default(),
        driven_speed_max: driven.iter().last().copied().unwrap_or_default(),
        driver_torque,
        driven_torque: train.driven_torque(driver_torque),
    })
}

fn ensure_positive(label: &str, value: f64) -> Result<(), Error> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::Usage)
            .with_message(format!("{label} must be a finite, positive number"))
            .with_hint("Radii are in meters, e.g. 0.05."))
    }
}
