//! Resolution properties over the shared assignment table.

use super::support;
use proptest::prelude::*;
use qforge::error::ResolutionError;
use qforge::resilience::RetryPolicy;
use qforge::types::{ModelId, ProviderId, Tier};
use std::collections::BTreeSet;
use std::time::Duration;

fn subset(mask: u8) -> BTreeSet<ProviderId> {
    ProviderId::ALL
        .into_iter()
        .enumerate()
        .filter(|(i, _)| mask & (1 << i) != 0)
        .map(|(_, p)| p)
        .collect()
}

fn tier_strategy() -> impl Strategy<Value = Tier> {
    prop_oneof![Just(Tier::Primary), Just(Tier::Fallback), Just(Tier::Any)]
}

fn question_type_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("math"),
        Just("spatial"),
        Just("verbal"),
        Just("logic"),
        Just("unknown"),
    ]
}

#[test]
fn test_open_primary_resolves_to_configured_fallback() {
    let resolver = support::resolver();
    let available: BTreeSet<_> = [ProviderId::Anthropic, ProviderId::OpenAI].into();

    let resolution = resolver.resolve("math", Tier::Primary, &available).unwrap();
    assert_eq!(resolution.provider, ProviderId::Anthropic);
    assert_eq!(resolution.model, Some(ModelId::new("claude-sonnet-4-5")));
}

#[test]
fn test_fallback_without_model_signals_provider_default() {
    let resolver = support::resolver();
    let available: BTreeSet<_> = [ProviderId::OpenAI, ProviderId::Gemini].into();

    let resolution = resolver.resolve("verbal", Tier::Primary, &available).unwrap();
    assert_eq!(resolution.provider, ProviderId::OpenAI);
    assert_eq!(resolution.model, None);
    assert_eq!(resolution.satisfied_by, Tier::Fallback);
}

#[test]
fn test_explicit_fallback_with_unavailable_fallback_degrades_to_any() {
    let resolver = support::resolver();
    let available: BTreeSet<_> = [ProviderId::Xai, ProviderId::Gemini].into();

    let resolution = resolver.resolve("math", Tier::Fallback, &available).unwrap();
    assert_eq!(resolution.satisfied_by, Tier::Any);
    assert_eq!(resolution.provider, ProviderId::Xai);
    assert_eq!(resolution.model, None);
}

proptest! {
    #[test]
    fn prop_resolve_is_idempotent(
        mask in 0u8..16,
        tier in tier_strategy(),
        question_type in question_type_strategy(),
    ) {
        let resolver = support::resolver();
        let available = subset(mask);
        let first = resolver.resolve(question_type, tier, &available);
        for _ in 0..3 {
            prop_assert_eq!(&resolver.resolve(question_type, tier, &available), &first);
        }
    }

    #[test]
    fn prop_any_nonempty_set_resolves_known_types(
        mask in 1u8..16,
        tier in tier_strategy(),
        question_type in prop_oneof![Just("math"), Just("spatial"), Just("verbal"), Just("logic")],
    ) {
        let resolver = support::resolver();
        let available = subset(mask);
        let resolution = resolver.resolve(question_type, tier, &available).unwrap();
        prop_assert!(available.contains(&resolution.provider));
        // Only a Fallback request without a configured fallback may land on Primary.
        prop_assert!(resolution.satisfied_by >= tier || tier == Tier::Fallback);
    }

    #[test]
    fn prop_open_primary_yields_fallback_model(mask in 0u8..16) {
        let resolver = support::resolver();
        let mut available = subset(mask);
        available.remove(&ProviderId::Xai);
        available.insert(ProviderId::Anthropic);

        for question_type in ["math", "spatial"] {
            let resolution = resolver.resolve(question_type, Tier::Primary, &available).unwrap();
            prop_assert_eq!(resolution.provider, ProviderId::Anthropic);
            prop_assert_eq!(resolution.model, Some(ModelId::new("claude-sonnet-4-5")));
        }
    }

    #[test]
    fn prop_empty_set_never_resolves(
        tier in tier_strategy(),
        question_type in question_type_strategy(),
    ) {
        let resolver = support::resolver();
        let err = resolver.resolve(question_type, tier, &BTreeSet::new()).unwrap_err();
        let expected_unknown = question_type == "unknown";
        prop_assert_eq!(
            matches!(err, ResolutionError::UnknownQuestionType(_)),
            expected_unknown
        );
    }

    #[test]
    fn prop_backoff_delay_is_bounded(
        attempt in 1u32..40,
        base_ms in 1u64..2_000,
        max_ms in 1u64..60_000,
        jitter in 0.0f64..1.0,
    ) {
        let policy = RetryPolicy::new(
            5,
            Duration::from_millis(base_ms),
            Duration::from_millis(max_ms),
            jitter,
        );
        let backoff = policy.backoff(attempt);
        prop_assert!(backoff <= policy.max_delay);
        prop_assert!(backoff >= policy.base_delay.min(policy.max_delay));

        let delay = policy.delay_before_attempt(attempt);
        let ceiling = backoff
            + Duration::from_secs_f64(backoff.as_secs_f64() * policy.jitter_fraction)
            + Duration::from_micros(1);
        prop_assert!(delay >= backoff);
        prop_assert!(delay <= ceiling);
    }
}
