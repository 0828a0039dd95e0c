use bson::{Bson, Document, doc};
use docbridge::query::{compile, decode_options};
use docbridge::{QueryOptions, SortDirection, SortKey};
use proptest::prelude::*;

fn sort_keys() -> impl Strategy<Value = Vec<SortKey>> {
    proptest::collection::vec(("[a-z]{1,6}", any::<bool>()), 0..8)
        .prop_map(|v| v.into_iter().map(|(field, ascending)| SortKey { field, ascending }).collect())
}

proptest! {
    #[test]
    fn prop_compile_preserves_sort_order(keys in sort_keys(), limit in any::<u32>()) {
        let opts = QueryOptions { limit: u64::from(limit), sort: keys.clone() };
        let q = compile(Document::new(), &opts, None);
        prop_assert_eq!(q.sort.len(), keys.len());
        for ((field, dir), key) in q.sort.iter().zip(&keys) {
            prop_assert_eq!(field, &key.field);
            let expected = if key.ascending { SortDirection::Ascending } else { SortDirection::Descending };
            prop_assert_eq!(*dir, expected);
        }
        if limit == 0 {
            prop_assert!(q.limit.is_none());
        } else {
            prop_assert_eq!(q.limit, Some(i64::from(limit)));
        }
    }

    #[test]
    fn prop_decode_then_compile_matches_input(keys in sort_keys(), limit in 0i64..1_000_000) {
        let sort: Vec<Bson> = keys
            .iter()
            .map(|k| Bson::Document(doc! { "field": k.field.clone(), "asc": k.ascending }))
            .collect();
        let raw = Bson::Document(doc! { "limit": limit, "sort": sort });
        let opts = decode_options(&raw).unwrap();
        prop_assert_eq!(&opts.sort, &keys);
        prop_assert_eq!(opts.limit, u64::try_from(limit).unwrap());
    }

    #[test]
    fn prop_filter_survives_native_rendering(name in "[a-z]{0,12}", age in any::<i32>(), tags in proptest::collection::vec("[a-z]{1,4}", 0..5)) {
        let filter = doc! { "name": name, "age": { "$gte": age }, "tags": { "$in": tags } };
        let q = compile(filter.clone(), &QueryOptions::default(), Some(doc! { "_id": 0 }));
        let native = q.to_native().unwrap();
        let back = Document::from_reader(native.filter.as_slice()).unwrap();
        prop_assert_eq!(back, filter);
        prop_assert_eq!(native.projection, Some(doc! { "_id": 0 }));
    }
}
