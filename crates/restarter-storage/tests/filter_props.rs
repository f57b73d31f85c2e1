//! Property-based tests for query filter composition.

use proptest::prelude::*;
use restarter_storage::filter::{build, Filter, FilterError};
use rusqlite::types::Value;

const BASE: &str = "SELECT resourceone_id FROM resourceone WHERE 1 = 1";

/// Generates a filter binding a single parameter named after `index`.
fn indexed_filter(index: usize, label: String) -> Filter {
    Filter::new(
        "indexed",
        format!("label <> :p{index}"),
        vec![(format!("p{index}"), Value::Text(label))],
    )
}

proptest! {
    /// Property: predicates appear after the base query in caller order.
    #[test]
    fn prop_predicates_keep_order(labels in prop::collection::vec("[a-z]{1,8}", 0..12)) {
        let filters: Vec<Filter> = labels
            .into_iter()
            .enumerate()
            .map(|(i, label)| indexed_filter(i, label))
            .collect();

        let built = build(BASE, &filters).unwrap();

        let expected: String = std::iter::once(BASE.to_string())
            .chain(filters.iter().map(|f| format!(" AND {}", f.predicate())))
            .collect();
        prop_assert_eq!(&built.sql, &expected);
        prop_assert_eq!(built.params.len(), filters.len());
        for (i, (name, _)) in built.params.iter().enumerate() {
            prop_assert_eq!(name, &format!(":p{}", i));
        }
    }

    /// Property: any repeated parameter name is reported, whatever its position.
    #[test]
    fn prop_repeated_name_is_rejected(
        count in 2usize..10,
        first in 0usize..10,
        second in 0usize..10,
    ) {
        let first = first % count;
        let second = second % count;
        prop_assume!(first != second);

        let mut filters: Vec<Filter> = (0..count)
            .map(|i| indexed_filter(i, "x".into()))
            .collect();
        filters[second] = indexed_filter(first, "y".into());

        let err = build(BASE, &filters).unwrap_err();
        let FilterError::DuplicateParameterName { name, .. } = err;
        prop_assert_eq!(name, format!("p{}", first));
    }

    /// Property: the standard identity and freshness filters never collide.
    #[test]
    fn prop_standard_filters_compose(id in any::<i64>(), micros in 0i64..4_000_000_000_000_000) {
        let at = chrono::DateTime::from_timestamp_micros(micros).unwrap();
        let built = build(BASE, &[Filter::by_id(id), Filter::updated_after(at), Filter::label_is("a")]).unwrap();
        prop_assert_eq!(built.params.len(), 3);
        prop_assert_eq!(&built.params[0].1, &Value::Integer(id));
        prop_assert_eq!(&built.params[1].1, &Value::Integer(micros));
    }
}
