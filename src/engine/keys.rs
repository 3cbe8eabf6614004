//! Annotation key registry.
//!
//! Rules files name annotation targets through class references
//! (`ner = { type: "CLASS", value: "…NamedEntityTagAnnotation" }`). The engine
//! never interprets those class strings: each distinct class becomes an
//! opaque [`AnnotationKey`], and every symbolic name bound to it resolves to
//! the same key.

use std::collections::HashMap;
use std::fmt;

/// Opaque annotation key identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnnotationKey(u32);

impl AnnotationKey {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for AnnotationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Symbolic name -> key mapping, populated while loading rules.
#[derive(Debug, Clone, Default)]
pub struct KeyRegistry {
    classes: Vec<String>,
    by_class: HashMap<String, AnnotationKey>,
    by_name: HashMap<String, AnnotationKey>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to the key for `class`, creating the key on first use.
    /// Rebinding a name replaces its previous target.
    pub fn bind(&mut self, name: &str, class: &str) -> AnnotationKey {
        let key = match self.by_class.get(class) {
            Some(&key) => key,
            None => {
                let key = AnnotationKey(self.classes.len() as u32);
                self.classes.push(class.to_string());
                self.by_class.insert(class.to_string(), key);
                key
            }
        };
        self.by_name.insert(name.to_string(), key);
        key
    }

    /// Resolve a symbolic name (as written in the rules file).
    pub fn get(&self, name: &str) -> Option<AnnotationKey> {
        self.by_name.get(name).copied()
    }

    /// Resolve a class reference string.
    pub fn get_class(&self, class: &str) -> Option<AnnotationKey> {
        self.by_class.get(class).copied()
    }

    /// The class string a key was created from.
    pub fn class_of(&self, key: AnnotationKey) -> Option<&str> {
        self.classes.get(key.index()).map(String::as_str)
    }

    /// A readable label for `key`: the first bound name in lexical order,
    /// falling back to the class string.
    pub fn label(&self, key: AnnotationKey) -> String {
        let mut names: Vec<&str> =
            self.by_name.iter().filter(|(_, k)| **k == key).map(|(name, _)| name.as_str()).collect();
        names.sort_unstable();
        match names.first() {
            Some(name) => name.to_string(),
            None => self.class_of(key).unwrap_or("?").to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_bound_to_same_class_share_a_key() {
        let mut reg = KeyRegistry::new();
        let a = reg.bind("ner", "x.NamedEntityTagAnnotation");
        let b = reg.bind("tag", "x.NamedEntityTagAnnotation");
        let c = reg.bind("normalized", "x.NormalizedNamedEntityTagAnnotation");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get("tag"), Some(a));
        assert_eq!(reg.get_class("x.NormalizedNamedEntityTagAnnotation"), Some(c));
        assert_eq!(reg.label(a), "ner");
    }

    #[test]
    fn rebinding_a_name_moves_it() {
        let mut reg = KeyRegistry::new();
        let first = reg.bind("ner", "A");
        let second = reg.bind("ner", "B");

        assert_ne!(first, second);
        assert_eq!(reg.get("ner"), Some(second));
        assert_eq!(reg.label(first), "A");
    }
}
