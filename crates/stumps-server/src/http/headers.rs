//! Case-insensitive HTTP header collection.

use std::fmt;

/// Ordered, case-insensitive header collection.
///
/// `set` replaces every value stored under the name, `add` appends another
/// value. Blank names are ignored rather than rejected, so header copies
/// between representations never fail half-way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpHeaders {
    entries: Vec<(String, String)>,
}

impl HttpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored name/value pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values stored under `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Create or replace the header. The first write keeps its position.
    pub fn set(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return;
        }
        let value = value.into();
        match self
            .entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(index) => {
                self.entries[index].1 = value;
                let mut position = 0;
                self.entries.retain(|(n, _)| {
                    let keep = position <= index || !n.eq_ignore_ascii_case(name);
                    position += 1;
                    keep
                });
            }
            None => self.entries.push((name.to_string(), value)),
        }
    }

    /// Set the header only when a value is present.
    pub fn set_opt(&mut self, name: impl AsRef<str>, value: Option<&str>) {
        if let Some(value) = value {
            self.set(name, value);
        }
    }

    /// Append a value without replacing existing ones.
    pub fn add(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return;
        }
        self.entries.push((name.to_string(), value.into()));
    }

    /// Remove every value stored under `name`. Returns true if anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        before != self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Copy every header into `target`, replacing values with the same name.
    pub fn copy_to(&self, target: &mut HttpHeaders) {
        for name in self.names() {
            target.remove(name);
            for value in self.get_all(name) {
                target.add(name, value);
            }
        }
    }

    /// Distinct header names in first-seen order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (name, _) in &self.entries {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                names.push(name);
            }
        }
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl fmt::Display for HttpHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            writeln!(f, "{name}: {value}")?;
        }
        Ok(())
    }
}

impl<N: AsRef<str>, V: Into<String>> FromIterator<(N, V)> for HttpHeaders {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut headers = HttpHeaders::new();
        for (name, value) in iter {
            headers.add(name, value);
        }
        headers
    }
}
