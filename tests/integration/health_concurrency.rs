//! Circuit breaker behavior under concurrent callers.

use proptest::prelude::*;
use qforge::resilience::{CircuitState, HealthSettings, ManualClock, ProviderHealthTracker};
use qforge::types::ProviderId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const CALLERS: usize = 16;

fn tracker(threshold: u32, cooldown: Duration) -> (Arc<ProviderHealthTracker>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let tracker = Arc::new(ProviderHealthTracker::with_clock(
        HealthSettings::new(threshold, cooldown),
        clock.clone(),
    ));
    (tracker, clock)
}

#[test]
fn test_exactly_one_half_open_trial_among_concurrent_callers() {
    let (tracker, clock) = tracker(2, Duration::from_secs(30));
    tracker.record_outcome(ProviderId::Xai, false);
    tracker.record_outcome(ProviderId::Xai, false);
    assert!(!tracker.is_available(ProviderId::Xai));

    clock.advance(Duration::from_secs(30));

    let admitted = AtomicUsize::new(0);
    let barrier = Barrier::new(CALLERS);
    thread::scope(|scope| {
        for _ in 0..CALLERS {
            scope.spawn(|| {
                barrier.wait();
                let permit = tracker.try_acquire(ProviderId::Xai);
                if let Ok(permit) = &permit {
                    assert!(permit.is_trial());
                    admitted.fetch_add(1, Ordering::SeqCst);
                }
                // Hold the permit until every caller has tried.
                barrier.wait();
                drop(permit);
            });
        }
    });

    assert_eq!(admitted.load(Ordering::SeqCst), 1);
    // The unsettled trial was released; the next caller gets it.
    assert_eq!(tracker.circuit_state(ProviderId::Xai), CircuitState::HalfOpen);
    assert!(tracker.is_available(ProviderId::Xai));
}

#[test]
fn test_concurrent_failures_on_one_provider_leave_others_closed() {
    let (tracker, _) = tracker(5, Duration::from_secs(60));

    thread::scope(|scope| {
        for _ in 0..CALLERS {
            scope.spawn(|| {
                tracker.record_outcome(ProviderId::Gemini, false);
                tracker.record_outcome(ProviderId::Anthropic, true);
            });
        }
    });

    // Failures arriving after the circuit opened are not counted.
    assert_eq!(tracker.circuit_state(ProviderId::Gemini), CircuitState::Open);
    assert_eq!(tracker.snapshot(ProviderId::Gemini).consecutive_failures, 5);
    assert_eq!(tracker.circuit_state(ProviderId::Anthropic), CircuitState::Closed);
    assert!(!tracker.available_providers().contains(&ProviderId::Gemini));
}

#[test]
fn test_successful_trial_closes_circuit_for_everyone() {
    let (tracker, clock) = tracker(1, Duration::from_secs(10));
    tracker.record_outcome(ProviderId::OpenAI, false);
    clock.advance(Duration::from_secs(10));

    let trial = tracker.try_acquire(ProviderId::OpenAI).unwrap();
    assert!(tracker.try_acquire(ProviderId::OpenAI).is_err());
    trial.record(true);

    let permits: Vec<_> = (0..4)
        .map(|_| tracker.try_acquire(ProviderId::OpenAI).unwrap())
        .collect();
    assert!(permits.iter().all(|p| !p.is_trial()));
}

proptest! {
    #[test]
    fn prop_circuit_opens_after_exactly_threshold_failures(
        threshold in 1u32..20,
        cooldown_secs in 1u64..600,
    ) {
        let (tracker, clock) = tracker(threshold, Duration::from_secs(cooldown_secs));
        for _ in 1..threshold {
            tracker.record_outcome(ProviderId::Anthropic, false);
            prop_assert!(tracker.is_available(ProviderId::Anthropic));
        }
        tracker.record_outcome(ProviderId::Anthropic, false);
        prop_assert!(!tracker.is_available(ProviderId::Anthropic));

        clock.advance(Duration::from_secs(cooldown_secs - 1));
        prop_assert!(!tracker.is_available(ProviderId::Anthropic));
        clock.advance(Duration::from_secs(1));
        prop_assert!(tracker.is_available(ProviderId::Anthropic));
    }
}
