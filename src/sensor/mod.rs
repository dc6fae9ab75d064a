use crate::error::AppError;

pub mod beam;
pub mod mock;

/// One raw distance sample. `valid` is false on echo timeout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceSample {
    pub valid: bool,
    pub centimeters: f32,
}

impl DistanceSample {
    pub fn valid(centimeters: f32) -> Self {
        Self {
            valid: true,
            centimeters,
        }
    }

    pub fn no_echo() -> Self {
        Self {
            valid: false,
            centimeters: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gate {
    Entry,
    Exit,
}

impl Gate {
    pub fn as_str(self) -> &'static str {
        match self {
            Gate::Entry => "entry",
            Gate::Exit => "exit",
        }
    }
}

/// Per-bay distance sensor bank.
pub trait DistanceSensor {
    fn read_distance(&mut self, bay: usize) -> Result<DistanceSample, AppError>;
}

/// Entry and exit break-beam sensors.
pub trait BeamSensor {
    /// Returns true while the beam is broken.
    fn read_beam(&mut self, gate: Gate) -> Result<bool, AppError>;
}

impl<T: DistanceSensor + ?Sized> DistanceSensor for Box<T> {
    fn read_distance(&mut self, bay: usize) -> Result<DistanceSample, AppError> {
        (**self).read_distance(bay)
    }
}

impl<T: BeamSensor + ?Sized> BeamSensor for Box<T> {
    fn read_beam(&mut self, gate: Gate) -> Result<bool, AppError> {
        (**self).read_beam(gate)
    }
}
