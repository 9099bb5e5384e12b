//! Builds nested form values out of flat `name=value` pairs.
//!
//! Field names use bracket notation: `user[name]` nests into a map,
//! `tags[0]` into a list, and `tags[]` appends. Repeating a plain name
//! collects its values into a list in arrival order.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::constants;

/// A mapping from field names to decoded values.
pub type FormMap<T> = BTreeMap<String, FormValue<T>>;

/// A node of a decoded form tree.
///
/// Lists can contain holes (`None`) when a field names an index past the
/// current end, e.g. `a[2]` arriving before `a[0]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FormValue<T> {
    Value(T),
    List(Vec<Option<FormValue<T>>>),
    Map(FormMap<T>),
}

impl<T> FormValue<T> {
    /// Returns the leaf value, if this is one.
    pub fn as_value(&self) -> Option<&T> {
        match self {
            FormValue::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the list entries, if this is a list.
    pub fn as_list(&self) -> Option<&[Option<FormValue<T>>]> {
        match self {
            FormValue::List(list) => Some(list),
            _ => None,
        }
    }

    /// Returns the nested map, if this is a map.
    pub fn as_map(&self) -> Option<&FormMap<T>> {
        match self {
            FormValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up a key of a nested map.
    pub fn get(&self, key: &str) -> Option<&FormValue<T>> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Iterates over the leaf values stored directly in this node: the value
    /// itself, or the leaves of a list.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        let (single, list) = match self {
            FormValue::Value(value) => (Some(value), None),
            FormValue::List(list) => (None, Some(list.iter())),
            FormValue::Map(_) => (None, None),
        };

        single.into_iter().chain(
            list.into_iter()
                .flatten()
                .filter_map(|entry| entry.as_ref().and_then(FormValue::as_value)),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Key {
    Name(String),
    Index(usize),
}

impl Key {
    fn to_map_key(&self) -> String {
        match self {
            Key::Name(name) => name.clone(),
            Key::Index(idx) => idx.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    List,
    Map,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    key: Key,
    append: bool,
    // `None` on the last step.
    next: Option<Container>,
}

impl Step {
    fn new(key: Key) -> Step {
        Step {
            key,
            append: false,
            next: None,
        }
    }
}

fn parse_path(name: &str) -> Vec<Step> {
    let flat = || vec![Step::new(Key::Name(name.to_owned()))];

    let root_len = name.find('[').unwrap_or(name.len());
    if root_len == 0 {
        return flat();
    }

    let mut steps = vec![Step::new(Key::Name(name[..root_len].to_owned()))];
    let mut rest = &name[root_len..];

    while !rest.is_empty() {
        if rest == "[]" {
            if let Some(tail) = steps.last_mut() {
                tail.append = true;
            }
            break;
        }

        if !rest.starts_with('[') || rest.starts_with("[]") {
            return flat();
        }

        let end = match rest.find(']') {
            Some(end) => end,
            None => return flat(),
        };

        if steps.len() > constants::MAX_DEPTH {
            return flat();
        }

        let inner = &rest[1..end];
        let (container, key) = match parse_index(inner) {
            Some(idx) => (Container::List, Key::Index(idx)),
            None => (Container::Map, Key::Name(inner.to_owned())),
        };

        if let Some(tail) = steps.last_mut() {
            tail.next = Some(container);
        }
        steps.push(Step::new(key));
        rest = &rest[end + 1..];
    }

    steps
}

fn parse_index(inner: &str) -> Option<usize> {
    if !inner.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    inner.parse::<usize>().ok().filter(|idx| *idx <= constants::MAX_LIST_INDEX)
}

/// Inserts `value` into `map` at the path described by `name`.
///
/// A path that already holds a value turns into a list and the new value is
/// appended. Malformed bracket syntax, or nesting deeper than 32 levels,
/// falls back to using `name` as a flat key.
///
/// # Examples
///
/// ```
/// use formstream::{append_field, FormMap};
///
/// let mut vars = FormMap::new();
/// append_field(&mut vars, "user[name]", "ada".to_owned());
/// append_field(&mut vars, "tags[]", "a".to_owned());
/// append_field(&mut vars, "tags[]", "b".to_owned());
///
/// assert_eq!(vars["user"].get("name").and_then(|v| v.as_value()).map(String::as_str), Some("ada"));
/// assert_eq!(vars["tags"].values().count(), 2);
/// ```
pub fn append_field<T>(map: &mut FormMap<T>, name: &str, value: T) {
    let steps = parse_path(name);
    insert_into_map(map, &steps, value);
}

fn insert_into_map<T>(map: &mut FormMap<T>, steps: &[Step], value: T) {
    let key = steps[0].key.to_map_key();
    let slot = map.remove(&key);
    map.insert(key, place(slot, steps, value));
}

fn place<T>(current: Option<FormValue<T>>, steps: &[Step], value: T) -> FormValue<T> {
    let step = &steps[0];

    let next = match step.next {
        Some(next) => next,
        None => return place_last(current, step.append, value),
    };

    let container = match (current, next) {
        (None, Container::List) => FormValue::List(Vec::new()),
        (None, Container::Map) => FormValue::Map(FormMap::new()),
        (Some(FormValue::List(list)), Container::List) => FormValue::List(list),
        (Some(FormValue::List(list)), Container::Map) => FormValue::Map(list_to_map(list)),
        (Some(FormValue::Map(map)), _) => FormValue::Map(map),
        (Some(FormValue::Value(scalar)), _) => {
            let mut map = FormMap::new();
            map.insert(String::new(), FormValue::Value(scalar));
            FormValue::Map(map)
        }
    };

    descend(container, &steps[1..], value)
}

fn descend<T>(container: FormValue<T>, steps: &[Step], value: T) -> FormValue<T> {
    match (container, &steps[0].key) {
        (FormValue::List(mut list), Key::Index(idx)) => {
            let idx = *idx;
            if list.len() <= idx {
                list.resize_with(idx + 1, || None);
            }
            let slot = list[idx].take();
            list[idx] = Some(place(slot, steps, value));
            FormValue::List(list)
        }
        (FormValue::List(list), Key::Name(_)) => {
            let mut map = list_to_map(list);
            insert_into_map(&mut map, steps, value);
            FormValue::Map(map)
        }
        (FormValue::Map(mut map), _) => {
            insert_into_map(&mut map, steps, value);
            FormValue::Map(map)
        }
        (FormValue::Value(scalar), _) => {
            let mut map = FormMap::new();
            map.insert(String::new(), FormValue::Value(scalar));
            insert_into_map(&mut map, steps, value);
            FormValue::Map(map)
        }
    }
}

fn place_last<T>(current: Option<FormValue<T>>, append: bool, value: T) -> FormValue<T> {
    match current {
        None if append => FormValue::List(vec![Some(FormValue::Value(value))]),
        None => FormValue::Value(value),
        Some(FormValue::List(mut list)) => {
            list.push(Some(FormValue::Value(value)));
            FormValue::List(list)
        }
        Some(FormValue::Map(mut map)) => {
            let slot = map.remove("");
            map.insert(String::new(), place_last(slot, false, value));
            FormValue::Map(map)
        }
        Some(FormValue::Value(old)) => FormValue::List(vec![Some(FormValue::Value(old)), Some(FormValue::Value(value))]),
    }
}

fn list_to_map<T>(list: Vec<Option<FormValue<T>>>) -> FormMap<T> {
    list.into_iter()
        .enumerate()
        .filter_map(|(idx, entry)| entry.map(|entry| (idx.to_string(), entry)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build(pairs: &[(&str, &str)]) -> serde_json::Value {
        let mut map = FormMap::new();
        for (name, value) in pairs {
            append_field(&mut map, name, value.to_string());
        }
        serde_json::to_value(&map).unwrap()
    }

    #[test]
    fn test_flat_and_repeated_names() {
        let value = build(&[("one", "first"), ("arr", "a"), ("arr", "b"), ("arr", "c")]);
        assert_eq!(value, json!({ "one": "first", "arr": ["a", "b", "c"] }));
    }

    #[test]
    fn test_nested_map_and_list() {
        let value = build(&[
            ("user[name]", "ada"),
            ("user[langs][0]", "en"),
            ("user[langs][1]", "fr"),
            ("deep[a][b][c]", "x"),
        ]);
        assert_eq!(
            value,
            json!({
                "user": { "name": "ada", "langs": ["en", "fr"] },
                "deep": { "a": { "b": { "c": "x" } } },
            })
        );
    }

    #[test]
    fn test_append_marker() {
        assert_eq!(build(&[("tags[]", "only")]), json!({ "tags": ["only"] }));
        assert_eq!(build(&[("tags[]", "a"), ("tags[]", "b")]), json!({ "tags": ["a", "b"] }));
        assert_eq!(build(&[("a[b][]", "x")]), json!({ "a": { "b": ["x"] } }));
    }

    #[test]
    fn test_deep_nesting_is_flattened() {
        let name = format!("a{}", "[b]".repeat(100_000));
        let mut map = FormMap::new();
        append_field(&mut map, &name, "1".to_owned());

        assert_eq!(map.len(), 1);
        assert_eq!(map[&name].as_value().map(String::as_str), Some("1"));

        let name = format!("a{}", "[b]".repeat(constants::MAX_DEPTH));
        let mut map = FormMap::new();
        append_field(&mut map, &name, "1".to_owned());
        assert!(map["a"].get("b").is_some());
    }

    #[test]
    fn test_sparse_index_leaves_holes() {
        assert_eq!(build(&[("a[2]", "z"), ("a[0]", "x")]), json!({ "a": ["x", null, "z"] }));
    }

    #[test]
    fn test_list_converted_to_map() {
        let value = build(&[("a[0]", "x"), ("a[key]", "y")]);
        assert_eq!(value, json!({ "a": { "0": "x", "key": "y" } }));
    }

    #[test]
    fn test_scalar_then_nested() {
        let value = build(&[("a", "x"), ("a[b]", "y")]);
        assert_eq!(value, json!({ "a": { "": "x", "b": "y" } }));

        let value = build(&[("a[b]", "y"), ("a", "x")]);
        assert_eq!(value, json!({ "a": { "": "x", "b": "y" } }));
    }

    #[test]
    fn test_malformed_names_are_flat() {
        assert_eq!(build(&[("[a]", "x")]), json!({ "[a]": "x" }));
        assert_eq!(build(&[("a[b", "x")]), json!({ "a[b": "x" }));
        assert_eq!(build(&[("a[]b", "x")]), json!({ "a[]b": "x" }));
        assert_eq!(build(&[("a[b]c", "x")]), json!({ "a[b]c": "x" }));
        assert_eq!(build(&[("", "x")]), json!({ "": "x" }));
    }

    #[test]
    fn test_huge_index_is_a_map_key() {
        let value = build(&[("a[99999999999]", "x")]);
        assert_eq!(value, json!({ "a": { "99999999999": "x" } }));
    }

    #[test]
    fn test_parse_path() {
        let steps = parse_path("a[b][0][]");
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].next, Some(Container::Map));
        assert_eq!(steps[1].key, Key::Name("b".to_owned()));
        assert_eq!(steps[1].next, Some(Container::List));
        assert_eq!(steps[2].key, Key::Index(0));
        assert!(steps[2].append);
    }
}
