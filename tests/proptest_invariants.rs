//! Property-based invariant tests for the trial engine.
//!
//! 1. Response readings always stay inside `[1, x_max]` for any pixel scale
//! 2. Test plans are duplicate-free with an even seen/novel split
//! 3. Response counts track the trial index under arbitrary event sequences
//! 4. Exactly one report is produced, and only at the final trial

use function_learning::render::NullRenderer;
use function_learning::session::{MemorySink, SessionEvent};
use function_learning::{
    ExperimentConfig, Phase, ResponseMapper, Session, StimulusGenerator, TrainingSet,
};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

// ── Strategies ──────────────────────────────────────────────────────────

fn event_strategy() -> impl Strategy<Value = SessionEvent> {
    prop_oneof![
        (-200.0f64..800.0).prop_map(|page_y| SessionEvent::PointerMove { page_y }),
        Just(SessionEvent::Commit),
        Just(SessionEvent::Proceed),
    ]
}

/// Training set of `m` pairs with distinct integer inputs drawn from `1..=x_max`
fn training_strategy(max_pairs: usize) -> impl Strategy<Value = (TrainingSet, u32)> {
    (1usize..=max_pairs).prop_flat_map(|m| {
        // Leave room for `m - m/2` novel values
        let x_max = (m * 3) as u32;
        (
            proptest::sample::subsequence((1..=x_max).collect::<Vec<u32>>(), m),
            proptest::collection::vec(1.0f64..100.0, m),
            Just(x_max),
        )
    })
    .prop_map(|(xs, ys, x_max)| {
        let set = TrainingSet::from_columns(xs.into_iter().map(f64::from).collect(), ys)
            .expect("non-empty finite training set");
        (set, x_max)
    })
}

fn session_for(set: TrainingSet, x_max: u32, seed: u64) -> Session<NullRenderer, MemorySink> {
    let config = ExperimentConfig::default().with_x_max(x_max).with_seed(seed);
    let stimuli = StimulusGenerator::generate(set, &config).expect("plan fits");
    Session::with_stimuli(config, stimuli, NullRenderer, MemorySink::new()).expect("loads")
}

// ═══════════════════════════════════════════════════════════════════════
// 1. Mapper clamp
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn mapped_response_is_always_in_range(
        page_y in prop_oneof![any::<f64>(), -1.0e9f64..1.0e9],
        x_max in 1u32..500,
        ppu in 0.01f64..10.0,
    ) {
        let config = ExperimentConfig::default().with_x_max(x_max).with_ppu(ppu);
        let reading = ResponseMapper::map(page_y, &config);
        prop_assert!(reading.value >= 1.0);
        prop_assert!(reading.value <= f64::from(x_max));
        prop_assert!(reading.extent_px >= config.to_pixels(1.0));
        prop_assert!(reading.extent_px <= config.to_pixels(f64::from(x_max)));
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 2. Test plan shape
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn plan_is_unique_and_split_evenly(
        (set, x_max) in training_strategy(40),
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let plan = StimulusGenerator::test_plan(&set, x_max, &mut rng).unwrap();
        let m = set.len();
        prop_assert_eq!(plan.len(), m);

        let mut sorted = plan.as_slice().to_vec();
        sorted.sort_by(f64::total_cmp);
        sorted.dedup();
        prop_assert_eq!(sorted.len(), m);

        let seen = plan
            .as_slice()
            .iter()
            .filter(|x| set.xs().any(|t| t == **x))
            .count();
        prop_assert_eq!(seen, m / 2);
        prop_assert!(plan
            .as_slice()
            .iter()
            .all(|x| (1.0..=f64::from(x_max)).contains(x) && x.fract() == 0.0));
    }

    #[test]
    fn seeded_plans_are_deterministic(
        (set, x_max) in training_strategy(20),
        seed in any::<u64>(),
    ) {
        let a = StimulusGenerator::test_plan(&set, x_max, &mut StdRng::seed_from_u64(seed)).unwrap();
        let b = StimulusGenerator::test_plan(&set, x_max, &mut StdRng::seed_from_u64(seed)).unwrap();
        prop_assert_eq!(a, b);
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 3-4. Event sequences
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn response_counts_track_trial_index(
        (set, x_max) in training_strategy(8),
        seed in any::<u64>(),
        events in proptest::collection::vec(event_strategy(), 0..400),
    ) {
        let mut session = session_for(set, x_max, seed);
        let half = session.machine().training_trials().unwrap();

        for event in events {
            session.dispatch(event);

            let machine = session.machine();
            let index = machine.trial_index();
            prop_assert_eq!(
                machine.training_responses().len() + machine.test_responses().len(),
                index
            );
            prop_assert_eq!(machine.training_responses().len(), index.min(half));
            prop_assert_eq!(machine.test_responses().len(), index.saturating_sub(half));
            prop_assert!(index <= 2 * half);

            let reports = session.sink().reports().len();
            if session.phase() == Phase::Complete {
                prop_assert_eq!(reports, 1);
                prop_assert_eq!(index, 2 * half);
            } else {
                prop_assert_eq!(reports, 0);
            }
        }
    }

    #[test]
    fn proceed_without_commit_never_advances(
        (set, x_max) in training_strategy(8),
        seed in any::<u64>(),
        proceeds in 1usize..50,
    ) {
        let mut session = session_for(set, x_max, seed);
        for _ in 0..proceeds {
            session.dispatch(SessionEvent::Proceed);
        }
        prop_assert_eq!(session.machine().trial_index(), 0);
        prop_assert_eq!(session.phase(), Phase::Training);
    }
}
