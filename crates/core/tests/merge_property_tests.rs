//! Property-based integration tests for the priority merge engine.
//!
//! Verifies tier precedence across random field sets using `proptest`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use opsdesk_core::clients::{
    ClientMergeService, ClientMergeServiceTrait, ClientSource, ClientTier, ClientView,
    MergeConfig, MergedClientView,
};
use opsdesk_core::Result;
use proptest::prelude::*;
use serde_json::Value;

// =============================================================================
// Fixtures
// =============================================================================

struct StaticSource(Vec<ClientView>);

#[async_trait]
impl ClientSource for StaticSource {
    async fn fetch_all(&self) -> Result<Vec<ClientView>> {
        Ok(self.0.clone())
    }
}

fn view(tier: ClientTier, name: &str, fields: &BTreeMap<String, String>) -> ClientView {
    let mut view = ClientView::new(tier, name);
    for (field, value) in fields {
        view.fields.insert(field.clone(), Value::String(value.clone()));
    }
    view
}

fn merge(
    self_reported: Option<ClientView>,
    reported: &ClientView,
    registry: &[ClientView],
) -> MergedClientView {
    let source = StaticSource(self_reported.into_iter().collect());
    let engine = ClientMergeService::new(Arc::new(source), MergeConfig::default());
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
        .block_on(engine.merge_one(reported, registry))
}

// =============================================================================
// Generators
// =============================================================================

/// Field names drawn from a small pool so tiers overlap often.
fn arb_fields() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map(
        prop_oneof![
            Just("industry".to_string()),
            Just("email".to_string()),
            Just("phone".to_string()),
            Just("team".to_string()),
            Just("website".to_string()),
            Just("companySize".to_string()),
        ],
        "[a-z]{1,12}",
        0..6,
    )
}

fn arb_name() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{2,10}"
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every self-reported field wins over registry and reported-by-other.
    #[test]
    fn prop_self_reported_fields_always_win(
        name in arb_name(),
        self_fields in arb_fields(),
        registry_fields in arb_fields(),
        reported_fields in arb_fields(),
    ) {
        let merged = merge(
            Some(view(ClientTier::SelfReported, &name, &self_fields)),
            &view(ClientTier::ReportedByOther, &name, &reported_fields),
            &[view(ClientTier::Registry, &name.to_uppercase(), &registry_fields)],
        );

        for (field, value) in &self_fields {
            prop_assert_eq!(merged.fields.get(field), Some(&Value::String(value.clone())));
        }
        prop_assert_eq!(merged.data_source, ClientTier::SelfReported);
        prop_assert!(merged.has_highest_tier_data);
    }

    /// Fields missing from the self-reported view fall back to the registry.
    #[test]
    fn prop_registry_fills_fields_absent_from_self_reported(
        name in arb_name(),
        self_fields in arb_fields(),
        registry_fields in arb_fields(),
        reported_fields in arb_fields(),
    ) {
        let merged = merge(
            Some(view(ClientTier::SelfReported, &name, &self_fields)),
            &view(ClientTier::ReportedByOther, &name, &reported_fields),
            &[view(ClientTier::Registry, &name, &registry_fields)],
        );

        for (field, value) in registry_fields.iter().filter(|(f, _)| !self_fields.contains_key(*f)) {
            prop_assert_eq!(merged.fields.get(field), Some(&Value::String(value.clone())));
        }
    }

    /// Reported-by-other values survive only where no higher tier speaks.
    #[test]
    fn prop_reported_fields_survive_when_uncontested(
        name in arb_name(),
        registry_fields in arb_fields(),
        reported_fields in arb_fields(),
    ) {
        let merged = merge(
            None,
            &view(ClientTier::ReportedByOther, &name, &reported_fields),
            &[view(ClientTier::Registry, &name, &registry_fields)],
        );

        for (field, value) in reported_fields.iter().filter(|(f, _)| !registry_fields.contains_key(*f)) {
            prop_assert_eq!(merged.fields.get(field), Some(&Value::String(value.clone())));
        }
        prop_assert_eq!(merged.data_source, ClientTier::Registry);
        prop_assert!(!merged.has_highest_tier_data);
    }

    /// Merging the same inputs twice yields identical output.
    #[test]
    fn prop_merge_is_idempotent(
        name in arb_name(),
        self_fields in arb_fields(),
        registry_fields in arb_fields(),
        reported_fields in arb_fields(),
    ) {
        let self_reported = view(ClientTier::SelfReported, &name, &self_fields);
        let reported = view(ClientTier::ReportedByOther, &name, &reported_fields);
        let registry = [view(ClientTier::Registry, &name, &registry_fields)];

        let first = merge(Some(self_reported.clone()), &reported, &registry);
        let second = merge(Some(self_reported), &reported, &registry);
        prop_assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        prop_assert!(first.completeness_percent <= 100);
    }
}
