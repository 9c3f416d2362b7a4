//! Shared state between the pipeline threads.
//!
//! Every stage publishes its latest output into a [`Latest`] cell owned by
//! exactly one producer; consumers take whole-value snapshots, so a reader
//! can never observe a mix of fields from different cycles. Cancellation
//! and fatal-fault signalling go through [`SharedFlag`]s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use gnc_math::{EulerAngles, EulerRates};

/// Single-producer, multiple-consumer latest-value cell.
///
/// The whole value is replaced under the lock on publish and copied out on
/// snapshot; partial writes are never visible.
#[derive(Debug, Clone)]
pub struct Latest<T> {
    inner: Arc<Mutex<T>>,
}

impl<T: Copy> Latest<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn publish(&self, value: T) {
        *self.inner.lock().unwrap() = value;
    }

    pub fn snapshot(&self) -> T {
        *self.inner.lock().unwrap()
    }
}

impl<T: Copy + Default> Default for Latest<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// One-way boolean signal (quit request, fatal fault).
#[derive(Debug, Clone, Default)]
pub struct SharedFlag(Arc<AtomicBool>);

impl SharedFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The most recent raw frame from the attitude sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawSample {
    /// Microseconds since program start at reception
    pub elapsed_us: u64,
    /// Raw Euler angles as sent by the sensor [rad]
    pub euler: EulerAngles,
    /// Linear accelerations [m/s²]
    pub accel: [f64; 3],
    /// Running frame counter
    pub seq: u64,
}

/// The estimator's published attitude solution.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AttitudeSnapshot {
    pub elapsed_us: u64,
    /// Estimator step used for differentiation and filtering [s]
    pub dt: f64,
    /// Zeroed, unwrapped Euler angles before filtering [rad]
    pub zeroed: EulerAngles,
    /// Backward-difference Euler rates before filtering [rad/s]
    pub raw_rates: EulerRates,
    /// Kalman-filtered Euler angles [rad]
    pub filtered: EulerAngles,
    /// Kalman-filtered Euler rates [rad/s]
    pub filtered_rates: EulerRates,
    /// Body rates (ω_x, ω_y, ω_z) derived from the filtered signals [rad/s]
    pub body_rates: [f64; 3],
    /// Accelerations carried through for logging [m/s²]
    pub accel: [f64; 3],
}

/// The control law's published demand.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlDemand {
    pub elapsed_us: u64,
    /// Pitch force F_θ [N]
    pub pitch_force: f64,
    /// Yaw force F_ψ [N]
    pub yaw_force: f64,
    /// Roll moment M_φ [N·m]
    pub roll_moment: f64,
}

/// The allocator's published thrust/PWM assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThrustAssignment {
    pub elapsed_us: u64,
    /// Per-nozzle thrust [N]
    pub thrust: [f64; 4],
    /// Per-nozzle 10-bit PWM command
    pub pwm: [u16; 4],
    /// Index of the nozzle the optimum drove to zero
    pub zero_valve: usize,
}

/// The latest decoded pressure readings (radial, axial).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PressureReadings {
    pub elapsed_us: u64,
    pub radial_mbar: f64,
    pub radial_temp_c: f64,
    pub axial_mbar: f64,
    pub axial_temp_c: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_latest_publish_snapshot() {
        let cell = Latest::new(0u64);
        assert_eq!(cell.snapshot(), 0);
        cell.publish(42);
        assert_eq!(cell.snapshot(), 42);
    }

    #[test]
    fn test_snapshots_never_tear() {
        // A published pair always satisfies b == 2a; concurrent readers must
        // never see a half-updated pair.
        let cell = Latest::new((0u64, 0u64));
        let writer_cell = cell.clone();
        let writer = thread::spawn(move || {
            for i in 1..=20_000u64 {
                writer_cell.publish((i, 2 * i));
            }
        });

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cell = cell.clone();
                thread::spawn(move || {
                    for _ in 0..20_000 {
                        let (a, b) = cell.snapshot();
                        assert_eq!(b, 2 * a, "torn snapshot: ({a}, {b})");
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn test_shared_flag() {
        let flag = SharedFlag::new();
        assert!(!flag.is_raised());
        let clone = flag.clone();
        clone.raise();
        assert!(flag.is_raised());
    }
}
