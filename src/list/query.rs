// ============================================================================
// Read-side helpers: lookup, iteration, attribute passthrough
// ============================================================================
//
// Iteration helpers work on a snapshot of the sequence taken before the
// first callback runs, so callbacks may mutate the list freely.
//
// ============================================================================

use super::{ChangeOptions, ModelList};
use crate::core::{Attributes, id_key, value_to_text};
use crate::model::{Model, escape};
use serde_json::Value;
use std::sync::Arc;

impl ModelList {
    pub fn len(&self) -> usize {
        self.shared.read_state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.read_state().items.is_empty()
    }

    /// Model at `index`.
    pub fn item(&self, index: usize) -> Option<Arc<Model>> {
        self.shared.read_state().items.get(index).cloned()
    }

    pub fn index_of(&self, model: &Arc<Model>) -> Option<usize> {
        let state = self.shared.read_state();
        if !state.identity.is_member(model) {
            return None;
        }
        state.items.iter().position(|member| Arc::ptr_eq(member, model))
    }

    pub fn contains(&self, model: &Arc<Model>) -> bool {
        self.shared.read_state().identity.is_member(model)
    }

    pub fn get_by_client_id(&self, client_id: &str) -> Option<Arc<Model>> {
        self.shared.read_state().identity.get_by_client_id(client_id)
    }

    /// Lookup by persistent id; `42` and `"42"` find the same model.
    pub fn get_by_id(&self, id: impl Into<Value>) -> Option<Arc<Model>> {
        let key = id_key(&id.into())?;
        self.shared.read_state().identity.get_by_id(&key)
    }

    /// Point-in-time copy of the sequence.
    pub fn to_vec(&self) -> Vec<Arc<Model>> {
        self.shared.read_state().items.clone()
    }

    /// Every member serialized with [`Model::to_json`].
    pub fn to_json(&self) -> Vec<Attributes> {
        self.to_vec().iter().map(|model| model.to_json()).collect()
    }

    pub fn iter(&self) -> std::vec::IntoIter<Arc<Model>> {
        self.to_vec().into_iter()
    }

    pub fn each(&self, mut callback: impl FnMut(&Arc<Model>, usize)) {
        for (index, model) in self.to_vec().iter().enumerate() {
            callback(model, index);
        }
    }

    /// Stops at the first `true`.
    pub fn some(&self, mut callback: impl FnMut(&Arc<Model>, usize) -> bool) -> bool {
        self.to_vec()
            .iter()
            .enumerate()
            .any(|(index, model)| callback(model, index))
    }

    pub fn map<T>(&self, mut callback: impl FnMut(&Arc<Model>, usize) -> T) -> Vec<T> {
        self.to_vec()
            .iter()
            .enumerate()
            .map(|(index, model)| callback(model, index))
            .collect()
    }

    pub fn filter(&self, mut predicate: impl FnMut(&Arc<Model>, usize) -> bool) -> Vec<Arc<Model>> {
        self.to_vec()
            .into_iter()
            .enumerate()
            .filter(|(index, model)| predicate(model, *index))
            .map(|(_, model)| model)
            .collect()
    }

    /// Like [`filter`](Self::filter), but returns a new list with this
    /// list's configuration, seeded without notifications.
    pub fn filter_as_list(&self, predicate: impl FnMut(&Arc<Model>, usize) -> bool) -> ModelList {
        let list = ModelList::with_config(self.config().clone());
        list.add_many(self.filter(predicate), ChangeOptions::silently());
        list
    }

    // ------------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------------

    /// List-level attribute only.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.shared.read_attributes().get(name).cloned()
    }

    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.shared
            .write_attributes()
            .insert(name.into(), value.into());
    }

    /// The list attribute `name` if set, otherwise an array of each
    /// member's `name` (`null` where missing).
    pub fn get(&self, name: &str) -> Value {
        if let Some(value) = self.attribute(name) {
            return value;
        }
        Value::Array(self.map(|model, _| model.get(name).unwrap_or(Value::Null)))
    }

    /// HTML-escaped form of [`get`](Self::get): a string for a list
    /// attribute, an array of strings otherwise.
    pub fn get_as_html(&self, name: &str) -> Value {
        if let Some(value) = self.attribute(name) {
            return Value::String(escape::escape_html(&value_to_text(&value)));
        }
        Value::Array(self.map(|model, _| Value::String(model.get_as_html(name))))
    }

    /// URL-encoded form of [`get`](Self::get).
    pub fn get_as_url(&self, name: &str) -> Value {
        if let Some(value) = self.attribute(name) {
            return Value::String(escape::encode_url(&value_to_text(&value)));
        }
        Value::Array(self.map(|model, _| Value::String(model.get_as_url(name))))
    }
}

impl IntoIterator for &ModelList {
    type Item = Arc<Model>;
    type IntoIter = std::vec::IntoIter<Arc<Model>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::attrs;
    use crate::list::ModelListConfig;
    use serde_json::json;

    fn populated() -> ModelList {
        let list = ModelList::new();
        list.add_many(
            vec![
                attrs(json!({"id": 1, "name": "ann", "age": 31})),
                attrs(json!({"id": 2, "name": "bob"})),
                attrs(json!({"name": "<cy>", "age": 19})),
            ],
            ChangeOptions::new(),
        );
        list
    }

    #[test]
    fn test_lookups() {
        let list = populated();
        let first = list.item(0).unwrap();

        assert_eq!(list.len(), 3);
        assert!(!list.is_empty());
        assert_eq!(list.index_of(&first), Some(0));
        assert!(list.contains(&first));
        assert!(Arc::ptr_eq(&list.get_by_id(1).unwrap(), &first));
        assert!(Arc::ptr_eq(&list.get_by_id("1").unwrap(), &first));
        assert!(Arc::ptr_eq(&list.get_by_client_id(first.client_id()).unwrap(), &first));
        assert!(list.get_by_id(99).is_none());
        assert!(list.get_by_id(Value::Null).is_none());
        assert!(list.get_by_client_id("nope").is_none());
        assert!(list.item(3).is_none());
    }

    #[test]
    fn test_index_of_non_member() {
        let list = populated();
        let stranger = Model::new(Attributes::new());
        assert_eq!(list.index_of(&stranger), None);
        assert!(!list.contains(&stranger));
    }

    #[test]
    fn test_each_runs_over_snapshot() {
        let list = populated();
        let mut visited = Vec::new();
        list.each(|model, index| {
            visited.push(index);
            list.remove(model, ChangeOptions::new()).unwrap();
        });
        assert_eq!(visited, vec![0, 1, 2]);
        assert!(list.is_empty());
    }

    #[test]
    fn test_some_short_circuits() {
        let list = populated();
        let mut calls = 0;
        let found = list.some(|model, _| {
            calls += 1;
            model.get("name") == Some(json!("bob"))
        });
        assert!(found);
        assert_eq!(calls, 2);
        assert!(!list.some(|_, _| false));
    }

    #[test]
    fn test_map_and_filter() {
        let list = populated();
        let names = list.map(|model, _| model.get("name").unwrap_or(Value::Null));
        assert_eq!(names, vec![json!("ann"), json!("bob"), json!("<cy>")]);

        let with_age = list.filter(|model, _| model.get("age").is_some());
        assert_eq!(with_age.len(), 2);

        let odd = list.filter(|_, index| index % 2 == 1);
        assert_eq!(odd.len(), 1);
    }

    #[test]
    fn test_filter_as_list_seeds_silently() {
        let list = ModelList::with_config(ModelListConfig::new().sort_by("name"));
        list.add_many(
            vec![attrs(json!({"name": "b"})), attrs(json!({"name": "a"}))],
            ChangeOptions::new(),
        );

        let filtered = list.filter_as_list(|_, _| true);

        assert_eq!(filtered.len(), 2);
        assert!(filtered.comparator().is_some());
        assert_eq!(filtered.get("name"), json!(["a", "b"]));
        assert_eq!(list.item(0).unwrap().target_count(), 2);
    }

    #[test]
    fn test_attribute_passthrough() {
        let list = ModelList::with_config(ModelListConfig::new().attribute("name", "people"));
        list.add(attrs(json!({"name": "ann", "age": 3})), ChangeOptions::new())
            .unwrap();
        list.add(attrs(json!({"name": "bob"})), ChangeOptions::new()).unwrap();

        assert_eq!(list.get("name"), json!("people"));
        assert_eq!(list.get("age"), json!([3, null]));

        list.set_attribute("age", "n/a");
        assert_eq!(list.get("age"), json!("n/a"));
        assert_eq!(list.attribute("missing"), None);
    }

    #[test]
    fn test_escaped_passthrough() {
        let list = populated();
        assert_eq!(list.get_as_html("name"), json!(["ann", "bob", "&lt;cy&gt;"]));
        assert_eq!(list.get_as_url("name"), json!(["ann", "bob", "%3Ccy%3E"]));

        list.set_attribute("title", "a & b");
        assert_eq!(list.get_as_html("title"), json!("a &amp; b"));
        assert_eq!(list.get_as_url("title"), json!("a%20%26%20b"));
    }

    #[test]
    fn test_to_json_and_iteration() {
        let list = populated();
        let json = list.to_json();
        assert_eq!(json[0]["name"], json!("ann"));
        assert!(!json[0].contains_key("clientId"));

        let mut count = 0;
        for model in &list {
            assert!(list.contains(&model));
            count += 1;
        }
        assert_eq!(count, 3);
        assert_eq!(list.iter().count(), 3);
    }
}
