use std::collections::BTreeMap;

/// A record the list view can match against free text.
pub trait Filterable {
    fn name(&self) -> &str;

    fn filterable_fields(&self) -> Vec<String>;
}

pub fn is_match<T: Filterable + ?Sized>(item: &T, filter: &str, ignore_case: bool) -> bool {
    if filter.is_empty() {
        return true;
    }

    let needle = if ignore_case {
        filter.to_lowercase()
    } else {
        filter.to_string()
    };

    item.filterable_fields().iter().any(|field| {
        if ignore_case {
            field.to_lowercase().contains(&needle)
        } else {
            field.contains(&needle)
        }
    })
}

fn keep<T: Filterable>(
    item: &T,
    name: Option<&str>,
    filter: &str,
    faulty: Option<fn(&T) -> bool>,
) -> bool {
    if let Some(name) = name
        && item.name() != name
    {
        return false;
    }

    if !is_match(item, filter, true) {
        return false;
    }

    faulty.is_none_or(|predicate| predicate(item))
}

pub fn filter_slice<T: Filterable + Clone>(
    items: &[T],
    name: Option<&str>,
    filter: &str,
    faulty: Option<fn(&T) -> bool>,
) -> Vec<T> {
    items
        .iter()
        .filter(|item| keep(*item, name, filter, faulty))
        .cloned()
        .collect()
}

/// Filters a bucketed collection. Without `key`, a bucket whose key matches the
/// filter keeps all of its (name/fault constrained) items.
pub fn filter_map<T: Filterable + Clone>(
    items: &BTreeMap<String, Vec<T>>,
    key: Option<&str>,
    name: Option<&str>,
    filter: &str,
    faulty: Option<fn(&T) -> bool>,
) -> BTreeMap<String, Vec<T>> {
    let mut out = BTreeMap::new();

    if let Some(key) = key {
        if let Some(bucket) = items.get(key) {
            let kept = filter_slice(bucket, name, filter, faulty);
            if !kept.is_empty() {
                out.insert(key.to_string(), kept);
            }
        }
        return out;
    }

    let needle = filter.to_lowercase();
    for (bucket_key, bucket) in items {
        let key_matches = !needle.is_empty() && bucket_key.to_lowercase().contains(&needle);
        let kept = if key_matches {
            filter_slice(bucket, name, "", faulty)
        } else {
            filter_slice(bucket, name, filter, faulty)
        };
        if !kept.is_empty() {
            out.insert(bucket_key.clone(), kept);
        }
    }

    out
}

pub fn find_by_name<'a, T: Filterable>(items: &'a [T], name: &str) -> Option<&'a T> {
    items.iter().find(|item| item.name() == name)
}

#[cfg(test)]
mod tests {
    use super::{Filterable, filter_map, filter_slice, find_by_name, is_match};
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        name: String,
        note: String,
        broken: bool,
    }

    impl Item {
        fn new(name: &str, note: &str, broken: bool) -> Self {
            Self {
                name: name.to_string(),
                note: note.to_string(),
                broken,
            }
        }
    }

    impl Filterable for Item {
        fn name(&self) -> &str {
            &self.name
        }

        fn filterable_fields(&self) -> Vec<String> {
            vec![self.name.clone(), self.note.clone()]
        }
    }

    fn broken(item: &Item) -> bool {
        item.broken
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(is_match(&Item::new("a", "", false), "", true));
        assert!(is_match(&Item::new("a", "", false), "", false));
    }

    #[test]
    fn match_is_case_insensitive_substring_over_fields() {
        let item = Item::new("Llama-70B", "Serving", false);
        assert!(is_match(&item, "llama", true));
        assert!(is_match(&item, "SERV", true));
        assert!(!is_match(&item, "llama", false));
        assert!(!is_match(&item, "cohere", true));
    }

    #[test]
    fn filter_slice_applies_name_filter_and_fault_predicate() {
        let items = vec![
            Item::new("a1", "east", false),
            Item::new("a2", "west", true),
            Item::new("b1", "west", true),
        ];

        let west = filter_slice(&items, None, "west", None);
        assert_eq!(west.len(), 2);

        let named = filter_slice(&items, Some("a2"), "", None);
        assert_eq!(named, vec![items[1].clone()]);

        let faulty = filter_slice(&items, None, "a", Some(broken));
        assert_eq!(faulty, vec![items[1].clone()]);
    }

    #[test]
    fn filter_map_visits_sorted_keys_and_matches_on_bucket_key() {
        let mut items = BTreeMap::new();
        items.insert("zeta".to_string(), vec![Item::new("x", "", false)]);
        items.insert("alpha".to_string(), vec![Item::new("zeta-ref", "", false)]);
        items.insert("mid".to_string(), vec![Item::new("other", "", false)]);

        let out = filter_map(&items, None, None, "zeta", None);
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["alpha", "zeta"]);
        assert_eq!(out["zeta"][0].name, "x");
    }

    #[test]
    fn filter_map_restricts_to_single_bucket() {
        let mut items = BTreeMap::new();
        items.insert("t1".to_string(), vec![Item::new("a", "", false)]);
        items.insert("t2".to_string(), vec![Item::new("a", "", false)]);

        let out = filter_map(&items, Some("t2"), None, "", None);
        assert_eq!(out.len(), 1);
        assert!(out.contains_key("t2"));

        assert!(filter_map(&items, Some("missing"), None, "", None).is_empty());
    }

    #[test]
    fn filter_is_idempotent() {
        let items = vec![Item::new("a1", "x", false), Item::new("a2", "y", false)];
        let once = filter_slice(&items, None, "a", None);
        let twice = filter_slice(&once, None, "a", None);
        assert_eq!(once, twice);
    }

    #[test]
    fn find_by_name_round_trips() {
        let items = vec![Item::new("a", "", false), Item::new("b", "", false)];
        for item in &items {
            assert_eq!(find_by_name(&items, &item.name), Some(item));
        }
        assert_eq!(find_by_name(&items, "c"), None);
    }
}
