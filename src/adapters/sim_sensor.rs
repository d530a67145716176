//! Simulated environmental sensor.
//!
//! Produces plausible temperature / humidity / pressure readings from a
//! seeded PRNG so host runs are reproducible.  Readings are stamped with
//! the node clock in seconds.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::app::ports::{ClockPort, SensorPort};
use crate::messages::TelemetrySample;

/// Centi-degrees Celsius (15.00 .. 35.00 C).
const TEMPERATURE_RANGE: core::ops::RangeInclusive<u32> = 1_500..=3_500;
/// Centi-percent relative humidity (30.00 .. 90.00 %).
const HUMIDITY_RANGE: core::ops::RangeInclusive<u32> = 3_000..=9_000;
/// Pascals.
const PRESSURE_RANGE: core::ops::RangeInclusive<u32> = 98_000..=103_000;

pub struct SimSensor<C> {
    rng: SmallRng,
    clock: C,
}

impl<C: ClockPort> SimSensor<C> {
    pub fn new(seed: u64, clock: C) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            clock,
        }
    }
}

impl<C: ClockPort> SensorPort for SimSensor<C> {
    fn take_reading(&mut self) -> TelemetrySample {
        TelemetrySample {
            timestamp: self.clock.uptime_secs(),
            temperature: self.rng.gen_range(TEMPERATURE_RANGE),
            humidity: self.rng.gen_range(HUMIDITY_RANGE),
            pressure: self.rng.gen_range(PRESSURE_RANGE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClock(u32);

    impl ClockPort for FixedClock {
        fn uptime_secs(&self) -> u32 {
            self.0
        }

        fn uptime_ms(&self) -> u64 {
            u64::from(self.0) * 1_000
        }
    }

    #[test]
    fn readings_are_in_range_and_stamped() {
        let mut s = SimSensor::new(7, FixedClock(42));
        for _ in 0..100 {
            let r = s.take_reading();
            assert_eq!(r.timestamp, 42);
            assert!(TEMPERATURE_RANGE.contains(&r.temperature));
            assert!(HUMIDITY_RANGE.contains(&r.humidity));
            assert!(PRESSURE_RANGE.contains(&r.pressure));
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = SimSensor::new(1, FixedClock(0));
        let mut b = SimSensor::new(1, FixedClock(0));
        for _ in 0..10 {
            assert_eq!(a.take_reading(), b.take_reading());
        }
    }
}
