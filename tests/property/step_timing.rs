// tests/property/step_timing.rs

use std::sync::{Arc, Mutex};
use std::time::Duration;

use proptest::prelude::*;
use tickdag::step::timing::next_on_grid;
use tickdag::step::{Schedule, StepScheduler};

fn dts_strategy() -> impl Strategy<Value = Vec<u64>> {
    // Mix of zero passes, short frames and occasional long stalls.
    proptest::collection::vec(
        prop_oneof![
            3 => Just(0u64),
            6 => 1u64..20,
            1 => 20u64..200,
        ],
        1..80,
    )
}

/// Whether some grid point `k * interval` (k >= 1) lies in `(prev, now]`.
fn grid_point_between(interval: u64, prev: u64, now: u64) -> bool {
    now / interval > prev / interval
}

proptest! {
    #[test]
    fn periodic_fires_exactly_when_a_grid_point_is_crossed(
        interval in 1u64..50,
        dts in dts_strategy(),
    ) {
        let mut scheduler = StepScheduler::default();
        let fires = Arc::new(Mutex::new(Vec::new()));

        let f = Arc::clone(&fires);
        scheduler.every(
            Duration::from_millis(interval),
            move |ctx| {
                f.lock().unwrap().push(ctx.ticks());
                Ok(())
            },
            false,
        );

        let mut expected = Vec::new();
        let mut elapsed = 0u64;
        for (pass, dt) in dts.iter().enumerate() {
            let prev = elapsed;
            elapsed += dt;
            scheduler.update(Some(Duration::from_millis(*dt))).unwrap();
            if grid_point_between(interval, prev, elapsed) {
                expected.push(pass as u64 + 1);
            }
        }

        prop_assert_eq!(fires.lock().unwrap().clone(), expected);
    }

    #[test]
    fn every_ticks_fires_on_multiples_of_its_interval(
        interval in 1u64..10,
        passes in 1u64..100,
    ) {
        let mut scheduler = StepScheduler::default();
        let fires = Arc::new(Mutex::new(Vec::new()));

        let f = Arc::clone(&fires);
        scheduler.every_ticks(
            interval,
            move |ctx| {
                f.lock().unwrap().push(ctx.ticks());
                Ok(())
            },
            false,
        );

        for _ in 0..passes {
            scheduler.update(Some(Duration::ZERO)).unwrap();
        }

        let expected: Vec<u64> = (1..=passes).filter(|t| t % interval == 0).collect();
        prop_assert_eq!(fires.lock().unwrap().clone(), expected);
    }

    #[test]
    fn next_on_grid_lands_strictly_after_now_on_the_grid(
        prev in 0u64..10_000,
        interval in 1u64..500,
        ahead in 0u64..20_000,
    ) {
        let now = prev + ahead;
        let (next, skipped) = next_on_grid(
            Duration::from_millis(prev),
            Duration::from_millis(interval),
            Duration::from_millis(now),
        );
        let next = next.as_millis() as u64;

        prop_assert!(next > now);
        prop_assert_eq!((next - prev) % interval, 0);
        prop_assert!(next - interval <= now, "no grid point after now was skipped");
        let crossed = (next - prev) / interval - 1;
        prop_assert_eq!(skipped, crossed);
    }
}
