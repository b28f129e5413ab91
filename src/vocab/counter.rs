use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Token frequencies that remember the order in which tokens were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    order: Vec<String>,
    counts: HashMap<String, usize>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, token: &str, count: usize) {
        match self.counts.get_mut(token) {
            Some(existing) => *existing += count,
            None => {
                self.order.push(token.to_string());
                self.counts.insert(token.to_string(), count);
            }
        }
    }

    pub fn update<I, S>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for token in tokens {
            self.add(token.as_ref(), 1);
        }
    }

    /// Adds every count of `other`, keeping this counter's order first.
    pub fn merge(&mut self, other: &Counter) {
        for (token, count) in other.iter() {
            self.add(token, count);
        }
    }

    pub fn get(&self, token: &str) -> usize {
        self.counts.get(token).copied().unwrap_or(0)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.counts.contains_key(token)
    }

    /// Number of distinct tokens.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of occurrences over all tokens.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Tokens and counts in first-occurrence order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.order
            .iter()
            .map(move |token| (token.as_str(), self.counts[token]))
    }

    /// Tokens by descending count, ties kept in first-occurrence order.
    pub fn most_common(&self, n: Option<usize>) -> Vec<(&str, usize)> {
        let mut entries: Vec<(&str, usize)> = self.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        if let Some(n) = n {
            entries.truncate(n);
        }
        entries
    }

    /// The `n` most common tokens, reordered by descending count.
    pub fn truncated(&self, n: usize) -> Counter {
        self.most_common(Some(n))
            .into_iter()
            .map(|(token, count)| (token.to_string(), count))
            .collect()
    }
}

impl<S: AsRef<str>> FromIterator<(S, usize)> for Counter {
    fn from_iter<I: IntoIterator<Item = (S, usize)>>(iter: I) -> Self {
        let mut counter = Counter::new();
        for (token, count) in iter {
            counter.add(token.as_ref(), count);
        }
        counter
    }
}

impl AsRef<Counter> for Counter {
    fn as_ref(&self) -> &Counter {
        self
    }
}
