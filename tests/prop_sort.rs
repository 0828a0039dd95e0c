use bson::{Bson, doc};
use docbridge::{Client, MemoryStore};
use proptest::prelude::*;
use std::sync::Arc;

proptest! {
    #[test]
    fn prop_multi_key_sort_non_decreasing(v in proptest::collection::vec((any::<i64>(), any::<i64>()), 0..50)) {
        let client = Client::new(Arc::new(MemoryStore::new()));
        for (a, b) in &v {
            client.insert("prop", "srt", doc! { "a": *a, "b": *b }).unwrap();
        }
        let opts = Bson::Document(doc! {
            "sort": [ { "field": "a", "asc": true }, { "field": "b", "asc": false } ]
        });
        let docs = client.find_with_limit("prop", "srt", &Bson::Null, &opts, &Bson::Null).unwrap();
        prop_assert_eq!(docs.len(), v.len());
        // (a asc, b desc)
        for w in docs.windows(2) {
            let a0 = w[0].get_i64("a").unwrap();
            let b0 = w[0].get_i64("b").unwrap();
            let a1 = w[1].get_i64("a").unwrap();
            let b1 = w[1].get_i64("b").unwrap();
            prop_assert!(a0 < a1 || (a0 == a1 && b0 >= b1));
        }
    }

    #[test]
    fn prop_limit_caps_result_size(n in 0usize..30, limit in 0u32..40) {
        let client = Client::new(Arc::new(MemoryStore::new()));
        for i in 0..n {
            client.insert("prop", "lim", doc! { "i": i64::try_from(i).unwrap() }).unwrap();
        }
        let opts = Bson::Document(doc! { "limit": i64::from(limit) });
        let docs = client.find_with_limit("prop", "lim", &Bson::Null, &opts, &Bson::Null).unwrap();
        let expected = if limit == 0 { n } else { n.min(limit as usize) };
        prop_assert_eq!(docs.len(), expected);
    }
}
