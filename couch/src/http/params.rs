use serde_json::Value;

/// Ordered query parameters.
///
/// Setting a key that is already present replaces its value in place, so the
/// order in which keys were first set is the order they reach the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Vec<(String, Value)>);

impl Params {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(index).1)
    }

    /// Copies every entry of `other` over `self`.
    pub fn extend(&mut self, other: &Params) {
        for (key, value) in other.iter() {
            self.set(key.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.0.iter()
    }

    /// Whether `key` is set to something other than `null`, `false`, `0` or `""`.
    pub fn is_truthy(&self, key: &str) -> bool {
        match self.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    /// String-coerced pairs ready for a request descriptor.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(key, value)| (key.clone(), query_value(value)))
            .collect()
    }
}

/// Strings are sent verbatim, everything else as JSON text.
pub fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_replaces_in_place() {
        let params = Params::new()
            .with("update_seq", true)
            .with("reduce", false)
            .with("limit", 10)
            .with("reduce", true);

        assert_eq!(
            params.to_pairs(),
            vec![
                ("update_seq".to_string(), "true".to_string()),
                ("reduce".to_string(), "true".to_string()),
                ("limit".to_string(), "10".to_string()),
            ]
        );
    }

    #[test]
    fn test_query_value_keeps_strings_verbatim() {
        assert_eq!(query_value(&json!("abc")), "abc");
        assert_eq!(query_value(&json!(["a", 1])), r#"["a",1]"#);
        assert_eq!(query_value(&Value::Null), "null");
    }

    #[test]
    fn test_truthiness() {
        let params = Params::new()
            .with("a", false)
            .with("b", 0)
            .with("c", "")
            .with("d", true)
            .with("e", json!({}));
        assert!(!params.is_truthy("a"));
        assert!(!params.is_truthy("b"));
        assert!(!params.is_truthy("c"));
        assert!(params.is_truthy("d"));
        assert!(params.is_truthy("e"));
        assert!(!params.is_truthy("missing"));
    }

    #[test]
    fn test_remove() {
        let mut params = Params::new().with("key", 1).with("skip", 1);
        assert_eq!(params.remove("key"), Some(json!(1)));
        assert_eq!(params.remove("key"), None);
        assert_eq!(params.get("skip"), Some(&json!(1)));
    }
}
