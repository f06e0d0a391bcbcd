//! Property tests for the clamp and middle-out truncation.

use proptest::prelude::*;
use specflow_packet::{
    BudgetPolicy, ContextFile, ContextFileFilter, OMISSION_MARKER, SplitRatios,
    TokenBudgetEnforcer, middle_out_truncate,
};

fn prose() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z ,.\n]{0,4000}",
        "[a-z ]{0,200}".prop_map(|s| s.repeat(200)),
        "[a-zé漢 ]{0,3000}",
    ]
}

fn marker_tokens() -> usize {
    BudgetPolicy::default().estimate_tokens(OMISSION_MARKER)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn clamp_is_idempotent(
        system in prose(),
        user in prose(),
        limit in 600usize..40_000,
        max_out in 0usize..4_000,
    ) {
        let enforcer = TokenBudgetEnforcer::default();
        let once = enforcer.clamp(&system, &user, limit, max_out);
        let twice = enforcer.clamp(&once.system, &once.user, limit, max_out);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn clamp_respects_budget(
        system in prose(),
        user in prose(),
        limit in 600usize..40_000,
        max_out in 0usize..4_000,
    ) {
        let enforcer = TokenBudgetEnforcer::default();
        let out = enforcer.clamp(&system, &user, limit, max_out);
        let combined = format!("{}{}", out.system, out.user);

        // Each truncated prompt may overshoot by at most one marker.
        let tolerance = 2 * marker_tokens() + 2;
        let budget = limit.saturating_sub(max_out);
        prop_assert!(
            enforcer.estimate_tokens(&combined) <= budget + tolerance,
            "{} > {} + {}",
            enforcer.estimate_tokens(&combined),
            budget,
            tolerance
        );
    }

    #[test]
    fn middle_out_preserves_edges(text in "[a-zA-Z0-9 é]{1,3000}", fraction in 0.0f64..1.0) {
        let len = text.chars().count();
        let k = ((len as f64) * fraction) as usize;
        prop_assume!(k < len);

        let ratios = SplitRatios::default();
        let out = middle_out_truncate(&text, k, ratios);
        let (head, tail) = ratios.split(k);

        let original: Vec<char> = text.chars().collect();
        let truncated: Vec<char> = out.chars().collect();

        prop_assert_eq!(&truncated[..head], &original[..head]);
        prop_assert_eq!(
            &truncated[truncated.len() - tail..],
            &original[original.len() - tail..]
        );
    }

    #[test]
    fn filtered_context_stays_within_aggregate(sizes in proptest::collection::vec(0usize..3_000, 0..12)) {
        let files: Vec<_> = sizes
            .iter()
            .enumerate()
            .map(|(i, size)| ContextFile::new(format!("f{i}.txt"), "text/plain", "x".repeat(*size), i as u64))
            .collect();

        let filtered = ContextFileFilter::default().filter(&files);

        prop_assert!(filtered.total_bytes <= 5 * 1024);
        prop_assert_eq!(filtered.included.len() + filtered.excluded.len(), files.len());
        prop_assert!(filtered.included.iter().all(|f| f.content.len() <= 2 * 1024));
    }
}
