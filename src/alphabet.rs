use std::collections::HashMap;
use std::fmt;

/// Append-only bidirectional mapping between label strings and dense ids.
/// Ids are assigned in insertion order and never change.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Alphabet {
  ids: HashMap<String, usize>,
  labels: Vec<String>,
}

impl Alphabet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns the id of `label`, adding it if it is new
  pub fn insert(&mut self, label: &str) -> usize {
    if let Some(&id) = self.ids.get(label) {
      return id;
    }
    let id = self.labels.len();
    self.labels.push(label.to_string());
    self.ids.insert(label.to_string(), id);
    id
  }

  pub fn get(&self, label: &str) -> Option<usize> {
    self.ids.get(label).copied()
  }

  pub fn contains(&self, label: &str) -> bool {
    self.ids.contains_key(label)
  }

  /// The string for `id`. Panics if the id was never assigned.
  pub fn label(&self, id: usize) -> &str {
    assert!(id < self.labels.len(), "label id {} out of range", id);
    &self.labels[id]
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
    self.labels.iter().enumerate().map(|(id, l)| (id, l.as_str()))
  }
}

impl<S: AsRef<str>> FromIterator<S> for Alphabet {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    let mut alphabet = Self::new();
    for label in iter {
      alphabet.insert(label.as_ref());
    }
    alphabet
  }
}

impl fmt::Display for Alphabet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (id, label) in self.iter() {
      writeln!(f, "{}\t{}", id, label)?;
    }
    Ok(())
  }
}
