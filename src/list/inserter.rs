// ============================================================================
// Comparator and sorted insertion
// ============================================================================
//
// A comparator derives a sort key from a model; an ordering function
// compares two keys. The default ordering is `compare_values`.
//
// ============================================================================

use crate::core::compare_values;
use crate::model::Model;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

pub type KeyFn = dyn Fn(&Model) -> Value + Send + Sync;
pub type CompareFn = dyn Fn(&Value, &Value) -> Ordering + Send + Sync;

#[derive(Clone)]
pub struct Comparator {
    key: Arc<KeyFn>,
    compare: Arc<CompareFn>,
}

impl Comparator {
    pub fn new(key: impl Fn(&Model) -> Value + Send + Sync + 'static) -> Self {
        Self {
            key: Arc::new(key),
            compare: Arc::new(compare_values),
        }
    }

    /// Orders by one attribute; missing attributes sort as `null`.
    pub fn by_attribute(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(move |model| model.get(&name).unwrap_or(Value::Null))
    }

    /// Replaces the key ordering.
    pub fn with_compare(
        mut self,
        compare: impl Fn(&Value, &Value) -> Ordering + Send + Sync + 'static,
    ) -> Self {
        self.compare = Arc::new(compare);
        self
    }

    pub fn key_of(&self, model: &Model) -> Value {
        (self.key)(model)
    }

    pub fn compare_keys(&self, a: &Value, b: &Value) -> Ordering {
        (self.compare)(a, b)
    }

    pub fn compare_models(&self, a: &Model, b: &Model) -> Ordering {
        self.compare_keys(&self.key_of(a), &self.key_of(b))
    }
}

impl fmt::Debug for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Comparator")
    }
}

/// Index at which `candidate` keeps `items` non-decreasing.
///
/// Binary search for the leftmost slot whose existing key is not less than
/// the candidate's key. Without a comparator the candidate is appended.
pub fn sorted_index(
    items: &[Arc<Model>],
    comparator: Option<&Comparator>,
    candidate: &Model,
) -> usize {
    let Some(comparator) = comparator else {
        return items.len();
    };

    let needle = comparator.key_of(candidate);
    let mut low = 0;
    let mut high = items.len();

    while low < high {
        let mid = (low + high) / 2;
        let existing = comparator.key_of(&items[mid]);
        if comparator.compare_keys(&existing, &needle) == Ordering::Less {
            low = mid + 1;
        } else {
            high = mid;
        }
    }

    low
}

/// Stable sort by comparator, evaluating each key once.
pub fn sort_models(models: &mut Vec<Arc<Model>>, comparator: &Comparator) {
    let mut keyed: Vec<(Value, Arc<Model>)> = models
        .drain(..)
        .map(|model| (comparator.key_of(&model), model))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| comparator.compare_keys(a, b));
    models.extend(keyed.into_iter().map(|(_, model)| model));
}

/// `true` when adjacent pairs are non-decreasing under `comparator`.
pub fn is_sorted(models: &[Arc<Model>], comparator: &Comparator) -> bool {
    models
        .windows(2)
        .all(|pair| comparator.compare_models(&pair[0], &pair[1]) != Ordering::Greater)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Attributes;
    use serde_json::json;

    fn model(value: i64) -> Arc<Model> {
        let mut attributes = Attributes::new();
        attributes.insert("value".into(), json!(value));
        Model::new(attributes)
    }

    fn values(models: &[Arc<Model>]) -> Vec<i64> {
        models
            .iter()
            .map(|m| m.get("value").and_then(|v| v.as_i64()).unwrap_or(-1))
            .collect()
    }

    #[test]
    fn test_no_comparator_appends() {
        let items = vec![model(5), model(1)];
        assert_eq!(sorted_index(&items, None, &model(0)), 2);
    }

    #[test]
    fn test_binary_search_positions() {
        let comparator = Comparator::by_attribute("value");
        let items = vec![model(1), model(3), model(5)];
        assert_eq!(sorted_index(&items, Some(&comparator), &model(0)), 0);
        assert_eq!(sorted_index(&items, Some(&comparator), &model(2)), 1);
        assert_eq!(sorted_index(&items, Some(&comparator), &model(4)), 2);
        assert_eq!(sorted_index(&items, Some(&comparator), &model(9)), 3);
        assert_eq!(sorted_index(&[], Some(&comparator), &model(9)), 0);
    }

    #[test]
    fn test_ties_resolve_to_leftmost_slot() {
        let comparator = Comparator::by_attribute("value");
        let items = vec![model(1), model(3), model(3), model(5)];
        assert_eq!(sorted_index(&items, Some(&comparator), &model(3)), 1);
    }

    #[test]
    fn test_custom_compare_descending() {
        let comparator = Comparator::by_attribute("value").with_compare(|a, b| compare_values(b, a));
        let items = vec![model(5), model(3), model(1)];
        assert_eq!(sorted_index(&items, Some(&comparator), &model(4)), 1);
    }

    #[test]
    fn test_sort_models_is_stable() {
        let comparator = Comparator::by_attribute("value");
        let first_two = model(2);
        let second_two = model(2);
        let mut models = vec![model(3), Arc::clone(&first_two), model(1), Arc::clone(&second_two)];
        sort_models(&mut models, &comparator);
        assert_eq!(values(&models), vec![1, 2, 2, 3]);
        assert!(Arc::ptr_eq(&models[1], &first_two));
        assert!(Arc::ptr_eq(&models[2], &second_two));
        assert!(is_sorted(&models, &comparator));
    }
}
