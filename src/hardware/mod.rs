//! Collaborators the core talks to but does not own.
//!
//! The core only sees these traits. Real drivers (PWM bridges, multiplexed
//! ADC pads, serial range finders, servo heads) live outside this crate;
//! [`sim`] provides stand-ins for the binary, tests and benches.

pub mod fusion;
pub mod sim;

/// Range finder. Returns positive centimeters, or a negative sentinel on
/// timeout / checksum failure. Must return within a bounded time.
pub trait DistanceSensor: Send {
    fn sample_distance(&mut self) -> f32;
}

/// Positions the scanning head. Fire-and-forget: the caller waits its own settle delay.
pub trait ScanHead: Send {
    fn set_angle(&mut self, degrees: u16);
}

/// Motor drive. `duty` is a signed percentage: positive forward, negative
/// reverse, zero brake. The driver clamps the magnitude to `[0, 100]`.
pub trait ActuatorDriver: Send {
    fn drive(&mut self, motor: usize, duty: f32);
}

/// Per-motor force/pressure pad, averaged over `samples` reads, in the configured unit.
pub trait PressureSource: Send {
    fn read_measurement(&mut self, motor: usize, samples: usize) -> f32;
}

impl<T: DistanceSensor + ?Sized> DistanceSensor for Box<T> {
    fn sample_distance(&mut self) -> f32 {
        (**self).sample_distance()
    }
}

impl<T: ScanHead + ?Sized> ScanHead for Box<T> {
    fn set_angle(&mut self, degrees: u16) {
        (**self).set_angle(degrees)
    }
}

impl<T: ActuatorDriver + ?Sized> ActuatorDriver for Box<T> {
    fn drive(&mut self, motor: usize, duty: f32) {
        (**self).drive(motor, duty)
    }
}

impl<T: PressureSource + ?Sized> PressureSource for Box<T> {
    fn read_measurement(&mut self, motor: usize, samples: usize) -> f32 {
        (**self).read_measurement(motor, samples)
    }
}
