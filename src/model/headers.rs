//! Ordered, multi-valued header map.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Header fields in first-appearance order, each with every value it was given.
///
/// Names are stored in canonical MIME form (see [`canonical_name`]), so
/// lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, Vec<String>)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Append one value to `name`, creating the field if needed.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        let name = canonical_name(name);
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some((_, values)) => values.push(value.into()),
            None => self.fields.push((name, vec![value.into()])),
        }
    }

    /// First value of `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    /// All values of `name` (empty slice if absent).
    pub fn get_all(&self, name: &str) -> &[String] {
        let name = canonical_name(name);
        self.fields
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    /// Remove `name` and return its values.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        let name = canonical_name(name);
        let pos = self.fields.iter().position(|(k, _)| *k == name)?;
        Some(self.fields.remove(pos).1)
    }

    /// Replace the values of `name` in place, keeping its position.
    ///
    /// An empty `values` removes the field.
    pub fn set(&mut self, name: &str, values: Vec<String>) {
        if values.is_empty() {
            self.remove(name);
            return;
        }
        let name = canonical_name(name);
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some((_, existing)) => *existing = values,
            None => self.fields.push((name, values)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Vec<String>)> {
        self.fields.iter_mut().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.append(name.as_ref(), value);
        }
        headers
    }
}

impl Serialize for Headers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, values) in &self.fields {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

/// Canonical MIME form of a header name.
///
/// The first letter and every letter after a `-` are upper-cased, the rest
/// lower-cased: `message-ID` → `Message-Id`, `DKIM-Signature` → `Dkim-Signature`.
pub fn canonical_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut upper = true;
    for ch in name.trim().chars() {
        if upper {
            result.extend(ch.to_uppercase());
        } else {
            result.extend(ch.to_lowercase());
        }
        upper = ch == '-';
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("message-ID"), "Message-Id");
        assert_eq!(canonical_name("DKIM-Signature"), "Dkim-Signature");
        assert_eq!(canonical_name("x-google-dkim-signature"), "X-Google-Dkim-Signature");
        assert_eq!(canonical_name("subject"), "Subject");
    }

    #[test]
    fn test_append_keeps_first_appearance_order() {
        let headers: Headers = [
            ("Received", "a"),
            ("subject", "hi"),
            ("RECEIVED", "b"),
        ]
        .into_iter()
        .collect();
        let names: Vec<&str> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["Received", "Subject"]);
        assert_eq!(headers.get_all("received"), ["a", "b"]);
    }

    #[test]
    fn test_set_and_remove() {
        let mut headers: Headers = [("To", "a"), ("Cc", "b")].into_iter().collect();
        headers.set("to", vec!["x".into(), "y".into()]);
        assert_eq!(headers.get_all("To"), ["x", "y"]);
        assert_eq!(headers.iter().next().map(|(k, _)| k), Some("To"));

        headers.set("Cc", Vec::new());
        assert!(headers.get("Cc").is_none());
        assert_eq!(headers.remove("to"), Some(vec!["x".into(), "y".into()]));
        assert!(headers.is_empty());
    }

    #[test]
    fn test_serialize_as_object() {
        let headers: Headers = [("Subject", "Hi"), ("To", "a"), ("To", "b")]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&headers).unwrap();
        assert_eq!(json, r#"{"Subject":["Hi"],"To":["a","b"]}"#);
    }
}
