//! Path operations over a JSON document tree
//!
//! Shared by the in-memory store and the JSON file store. Paths are
//! `/`-delimited; empty segments are ignored, so `/a/b`, `a/b` and `a//b/`
//! all name the same node.

use serde_json::{Map, Value};

use crate::error::StoreError;

/// Characters the document store refuses inside a path segment.
pub const FORBIDDEN_SEGMENT_CHARS: [char; 5] = ['.', '#', '$', '[', ']'];

/// Split a path into validated segments. The root is the empty list.
pub fn split_path(path: &str) -> Result<Vec<String>, StoreError> {
    let mut segments = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if segment.contains(&FORBIDDEN_SEGMENT_CHARS[..]) {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        segments.push(segment.to_string());
    }
    Ok(segments)
}

/// Value stored at `segments`, or `None` when nothing is there.
pub fn get<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments {
        node = match node {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    match node {
        Value::Null => None,
        other => Some(other),
    }
}

/// Replace the subtree at `segments`. Writing `Null` deletes it and prunes
/// any parent left empty.
///
/// Inside an array a segment must be an index no greater than the length;
/// the length itself appends. Anything else is `InvalidPath` and leaves
/// `root` as it was.
pub fn set(root: &mut Value, segments: &[String], value: Value) -> Result<(), StoreError> {
    let invalid = || StoreError::InvalidPath(format!("/{}", segments.join("/")));

    if value.is_null() {
        if segments.is_empty() {
            *root = Value::Object(Map::new());
        } else {
            remove_at(root, segments).ok_or_else(invalid)?;
        }
        return Ok(());
    }

    if !writable(root, segments) {
        return Err(invalid());
    }
    let mut node = root;
    for segment in segments {
        node = child_mut(node, segment).ok_or_else(invalid)?;
    }
    *node = value;
    Ok(())
}

/// True when one path is an ancestor of (or equal to) the other, i.e. a write
/// at one can change what is visible at the other.
pub fn overlaps(a: &[String], b: &[String]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

/// Flatten a stored sequence into insertion order.
///
/// Arrays are taken as-is. Objects keyed by indices (`{"0": .., "1": ..}`)
/// are ordered numerically. Anything else is an empty sequence.
pub fn into_sequence(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(map) => {
            let mut keyed: Vec<(String, Value)> = map.into_iter().collect();
            keyed.sort_by_key(|(key, _)| (key.parse::<u64>().unwrap_or(u64::MAX), key.clone()));
            keyed.into_iter().map(|(_, value)| value).collect()
        }
        _ => Vec::new(),
    }
}

/// Array index a write may target: an existing slot or the append slot.
fn array_slot(items: &[Value], segment: &str) -> Option<usize> {
    segment.parse::<usize>().ok().filter(|index| *index <= items.len())
}

/// Checks every array step before anything is mutated.
fn writable(root: &Value, segments: &[String]) -> bool {
    let mut node = root;
    for segment in segments {
        node = match node {
            Value::Object(map) => match map.get(segment) {
                Some(child) => child,
                None => return true,
            },
            Value::Array(items) => match array_slot(items, segment) {
                Some(index) if index < items.len() => &items[index],
                Some(_) => return true,
                None => return false,
            },
            _ => return true,
        };
    }
    true
}

fn child_mut<'a>(node: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match node {
        Value::Array(items) => {
            let index = array_slot(items, segment)?;
            if index == items.len() {
                items.push(Value::Null);
            }
            Some(&mut items[index])
        }
        Value::Object(map) => Some(map.entry(segment.to_string()).or_insert(Value::Null)),
        other => {
            *other = Value::Object(Map::new());
            Some(&mut other[segment])
        }
    }
}

/// Returns whether `node` should be dropped by its parent, or `None` when a
/// segment inside an array is not an index.
fn remove_at(node: &mut Value, segments: &[String]) -> Option<bool> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(true);
    };

    match node {
        Value::Object(map) => {
            let emptied = match map.get_mut(head) {
                Some(child) => remove_at(child, rest)?,
                None => false,
            };
            if emptied {
                map.remove(head);
            }
            Some(map.is_empty())
        }
        Value::Array(items) => {
            let index = head.parse::<usize>().ok()?;
            let emptied = match items.get_mut(index) {
                Some(child) => remove_at(child, rest)?,
                None => false,
            };
            if emptied {
                items.remove(index);
            }
            Some(items.is_empty())
        }
        _ => Some(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> Vec<String> {
        split_path(p).unwrap()
    }

    #[test]
    fn test_split_path_ignores_empty_segments() {
        assert_eq!(path("/a//b/"), vec!["a".to_string(), "b".to_string()]);
        assert!(path("/").is_empty());
    }

    #[test]
    fn test_split_path_rejects_forbidden_characters() {
        for bad in ["/a.b", "/a#b", "/a$b", "/a[0]", "/x]"] {
            assert!(
                matches!(split_path(bad), Err(StoreError::InvalidPath(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let mut root = json!({});
        set(&mut root, &path("/alice-x-com/name"), json!("Alice")).unwrap();
        set(&mut root, &path("/alice-x-com/email"), json!("alice@x.com")).unwrap();

        assert_eq!(
            get(&root, &path("/alice-x-com")),
            Some(&json!({"name": "Alice", "email": "alice@x.com"}))
        );
    }

    #[test]
    fn test_set_null_removes_and_prunes_parents() {
        let mut root = json!({"a": {"b": {"c": 1}}, "keep": true});
        set(&mut root, &path("/a/b/c"), Value::Null).unwrap();
        assert_eq!(root, json!({"keep": true}));
    }

    #[test]
    fn test_set_appends_at_array_length() {
        let mut root = json!({"u": {"conversations": [{"id": "a"}, {"id": "b"}]}});
        set(&mut root, &path("/u/conversations/2"), json!({"id": "c"})).unwrap();
        set(&mut root, &path("/u/conversations/0/name"), json!("Ann")).unwrap();

        assert_eq!(
            get(&root, &path("/u/conversations")),
            Some(&json!([{"id": "a", "name": "Ann"}, {"id": "b"}, {"id": "c"}]))
        );
    }

    #[test]
    fn test_set_past_array_end_is_rejected() {
        let original = json!({"u": {"conversations": [{"id": "a"}]}});
        let mut root = original.clone();

        for bad in ["/u/conversations/3", "/u/conversations/x", "/u/conversations/5/id"] {
            assert!(
                matches!(set(&mut root, &path(bad), json!(1)), Err(StoreError::InvalidPath(_))),
                "{} should be rejected",
                bad
            );
        }
        assert_eq!(root, original);
    }

    #[test]
    fn test_set_null_removes_array_elements() {
        let mut root = json!({"u": {"conversations": [{"id": "a"}, {"id": "b"}]}, "keep": 1});
        set(&mut root, &path("/u/conversations/0"), Value::Null).unwrap();
        assert_eq!(get(&root, &path("/u/conversations")), Some(&json!([{"id": "b"}])));

        // Missing slots are already gone.
        set(&mut root, &path("/u/conversations/7"), Value::Null).unwrap();
        assert!(matches!(
            set(&mut root, &path("/u/conversations/first"), Value::Null),
            Err(StoreError::InvalidPath(_))
        ));

        set(&mut root, &path("/u/conversations/0"), Value::Null).unwrap();
        assert_eq!(root, json!({"keep": 1}));
    }

    #[test]
    fn test_get_indexes_into_arrays() {
        let root = json!({"log": [{"id": "m1"}, {"id": "m2"}]});
        assert_eq!(get(&root, &path("/log/1/id")), Some(&json!("m2")));
        assert_eq!(get(&root, &path("/log/5")), None);
    }

    #[test]
    fn test_overlaps_is_prefix_in_either_direction() {
        assert!(overlaps(&path("/a"), &path("/a/b")));
        assert!(overlaps(&path("/a/b"), &path("/a")));
        assert!(overlaps(&path("/"), &path("/a")));
        assert!(!overlaps(&path("/a/b"), &path("/a/c")));
    }

    #[test]
    fn test_into_sequence_orders_numeric_keys() {
        let object = json!({"10": "k", "2": "c", "0": "a", "1": "b"});
        assert_eq!(
            into_sequence(object),
            vec![json!("a"), json!("b"), json!("c"), json!("k")]
        );
        assert!(into_sequence(Value::Null).is_empty());
    }
}
