//! Seeded column generators.
//!
//! Each helper owns a `StdRng` seeded once, so a catalog built from the same
//! seeds produces the same data run after run.

use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use crate::column::{Generator, Value};

fn seeded<F>(seed: u64, draw: F) -> Generator
where
    F: FnMut(&mut StdRng) -> Value + Send + 'static,
{
    let state = Mutex::new((StdRng::seed_from_u64(seed), draw));
    Arc::new(move || {
        let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
        let (rng, draw) = &mut *guard;
        let value = draw(rng);
        drop(guard);
        value
    })
}

/// Random version-4 UUIDs.
#[must_use]
pub fn uuid_v4(seed: u64) -> Generator {
    seeded(seed, |rng| {
        let mut bytes = [0_u8; 16];
        rng.fill_bytes(&mut bytes);
        Value::Uuid(uuid::Builder::from_random_bytes(bytes).into_uuid())
    })
}

/// Uniform integers in `range`.
#[must_use]
pub fn int_range(seed: u64, range: RangeInclusive<i64>) -> Generator {
    seeded(seed, move |rng| Value::Int(rng.random_range(range.clone())))
}

/// Uniform floats in `[low, high)`, rounded to two decimals.
#[must_use]
pub fn float_range(seed: u64, low: f64, high: f64) -> Generator {
    seeded(seed, move |rng| {
        let x = if high > low {
            rng.random_range(low..high)
        } else {
            low
        };
        Value::Float((x * 100.0).round() / 100.0)
    })
}

/// One of `options`, uniformly. An empty list yields `Null`.
#[must_use]
pub fn choice(seed: u64, options: &[&str]) -> Generator {
    let options: Vec<String> = options.iter().map(|s| (*s).to_owned()).collect();
    seeded(seed, move |rng| {
        if options.is_empty() {
            return Value::Null;
        }
        Value::Text(options[rng.random_range(0..options.len())].clone())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn take(generator: &Generator, n: usize) -> Vec<Value> {
        (0..n).map(|_| generator()).collect()
    }

    #[test]
    fn test_same_seed_same_sequence() {
        assert_eq!(take(&uuid_v4(7), 5), take(&uuid_v4(7), 5));
        assert_eq!(take(&int_range(7, 1..=100), 5), take(&int_range(7, 1..=100), 5));
        assert_ne!(take(&uuid_v4(7), 5), take(&uuid_v4(8), 5));
    }

    #[test]
    fn test_uuid_is_version_4() {
        for value in take(&uuid_v4(1), 10) {
            let Value::Uuid(id) = value else {
                panic!("expected uuid, got {value:?}");
            };
            assert_eq!(id.get_version_num(), 4);
        }
    }

    #[test]
    fn test_int_range_bounds() {
        for value in take(&int_range(3, -2..=2), 200) {
            let Value::Int(n) = value else {
                panic!("expected int");
            };
            assert!((-2..=2).contains(&n));
        }
    }

    #[test]
    fn test_float_range_bounds_and_rounding() {
        for value in take(&float_range(3, 1.0, 5.0), 100) {
            let Value::Float(x) = value else {
                panic!("expected float");
            };
            assert!((1.0..=5.0).contains(&x));
            assert!(((x * 100.0).round() - x * 100.0).abs() < 1e-6);
        }
        assert_eq!(float_range(0, 2.0, 2.0)(), Value::Float(2.0));
    }

    #[test]
    fn test_choice() {
        let options = ["north", "south", "east"];
        for value in take(&choice(9, &options), 50) {
            let Value::Text(s) = value else {
                panic!("expected text");
            };
            assert!(options.contains(&s.as_str()));
        }
        assert_eq!(choice(9, &[])(), Value::Null);
    }
}
