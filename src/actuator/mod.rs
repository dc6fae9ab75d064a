//! Actuator and output interfaces consumed by the control loop.
//!
//! Every command returns `Ok(())` as its acknowledgement. An `Err` means the
//! actuator could not take the command and the current session is aborted.

use crate::error::AppError;
use serde::Serialize;

pub mod mock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BarrierPosition {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorState {
    Off,
    Available,
    Unavailable,
    Fault,
}

pub trait PlatformActuator {
    /// Command the platform to an absolute angle in degrees.
    fn rotate_to(&mut self, angle: i32) -> Result<(), AppError>;

    /// False while the platform is still moving. Drivers without feedback
    /// keep the default.
    fn is_settled(&self) -> bool {
        true
    }
}

pub trait BarrierActuator {
    fn set_barrier(&mut self, position: BarrierPosition) -> Result<(), AppError>;

    fn is_settled(&self) -> bool {
        true
    }
}

pub trait IndicatorOutput {
    fn set_indicator(&mut self, bay: usize, state: IndicatorState) -> Result<(), AppError>;
}

pub trait TextDisplay {
    fn show(&mut self, lines: &[String]) -> Result<(), AppError>;
}

impl<T: PlatformActuator + ?Sized> PlatformActuator for Box<T> {
    fn rotate_to(&mut self, angle: i32) -> Result<(), AppError> {
        (**self).rotate_to(angle)
    }

    fn is_settled(&self) -> bool {
        (**self).is_settled()
    }
}

impl<T: BarrierActuator + ?Sized> BarrierActuator for Box<T> {
    fn set_barrier(&mut self, position: BarrierPosition) -> Result<(), AppError> {
        (**self).set_barrier(position)
    }

    fn is_settled(&self) -> bool {
        (**self).is_settled()
    }
}

impl<T: IndicatorOutput + ?Sized> IndicatorOutput for Box<T> {
    fn set_indicator(&mut self, bay: usize, state: IndicatorState) -> Result<(), AppError> {
        (**self).set_indicator(bay, state)
    }
}

impl<T: TextDisplay + ?Sized> TextDisplay for Box<T> {
    fn show(&mut self, lines: &[String]) -> Result<(), AppError> {
        (**self).show(lines)
    }
}
