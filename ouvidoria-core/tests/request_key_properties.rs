use ouvidoria_core::{FilterPredicate, FilterSnapshot, ResourceRequest};
use proptest::prelude::*;

fn param_strategy() -> impl Strategy<Value = (String, String)> {
    ("[A-Za-z]{1,8}", "[A-Za-z0-9 çãéí&=?+]{0,10}")
}

proptest! {
    #[test]
    fn key_ignores_parameter_order(params in prop::collection::vec(param_strategy(), 0..6)) {
        let forward = ResourceRequest::parse("/api/aggregate/count-by")
            .with_params(params.clone());
        let mut reversed_params = params.clone();
        reversed_params.reverse();
        let reversed = ResourceRequest::parse("/api/aggregate/count-by")
            .with_params(reversed_params);

        prop_assert_eq!(forward.key(), reversed.key());
    }

    #[test]
    fn key_survives_locator_round_trip(params in prop::collection::vec(param_strategy(), 1..6)) {
        let request = ResourceRequest::parse("/api/zeladoria/count-by").with_params(params);
        let key = request.key();
        let reparsed = ResourceRequest::parse(key.as_str());

        prop_assert_eq!(reparsed.key(), key);
    }

    #[test]
    fn snapshot_is_unique_by_dimension(
        predicates in prop::collection::vec(("[A-C]", "[a-z]{1,4}"), 0..12)
    ) {
        let snapshot = FilterSnapshot::from_predicates(
            predicates.iter().map(|(d, v)| FilterPredicate::new(d.clone(), v.clone())),
        );
        let mut dimensions: Vec<&str> = snapshot.iter().map(|p| p.dimension.as_str()).collect();
        let total = dimensions.len();
        dimensions.sort();
        dimensions.dedup();

        prop_assert_eq!(dimensions.len(), total);
    }
}
