//! Crossfilter predicate model.
//!
//! A [`FilterSnapshot`] is an immutable, ordered view of the active
//! predicates at one point in time. It is what `filter-changed` carries and
//! what page reload functions turn into query parameters.

use serde::{Deserialize, Serialize};

/// A single `dimension = value` selection made by clicking a chart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub dimension: String,
    pub value: String,
}

impl FilterPredicate {
    pub fn new(dimension: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            dimension: dimension.into(),
            value: value.into(),
        }
    }
}

/// Ordered predicates, unique by dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSnapshot(Vec<FilterPredicate>);

impl FilterSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot, keeping the first occurrence of each dimension.
    pub fn from_predicates(predicates: impl IntoIterator<Item = FilterPredicate>) -> Self {
        let mut unique: Vec<FilterPredicate> = Vec::new();
        for predicate in predicates {
            if !unique.iter().any(|p| p.dimension == predicate.dimension) {
                unique.push(predicate);
            }
        }
        Self(unique)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FilterPredicate> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[FilterPredicate] {
        &self.0
    }

    /// Value selected for `dimension`, if any.
    pub fn get(&self, dimension: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|p| p.dimension == dimension)
            .map(|p| p.value.as_str())
    }

    /// Copy of this snapshot without the predicate on `dimension`.
    ///
    /// A chart grouped by a dimension is not narrowed by its own selection,
    /// so it keeps showing every bucket with the clicked one highlighted.
    pub fn without(&self, dimension: &str) -> Self {
        Self(
            self.0
                .iter()
                .filter(|p| p.dimension != dimension)
                .cloned()
                .collect(),
        )
    }

    /// Predicates as `(name, value)` query parameters, in snapshot order.
    pub fn to_query_params(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|p| (p.dimension.clone(), p.value.clone()))
            .collect()
    }
}

impl IntoIterator for FilterSnapshot {
    type Item = FilterPredicate;
    type IntoIter = std::vec::IntoIter<FilterPredicate>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a FilterSnapshot {
    type Item = &'a FilterPredicate;
    type IntoIter = std::slice::Iter<'a, FilterPredicate>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::fmt::Display for FilterSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "(none)");
        }
        for (i, p) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", p.dimension, p.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_predicates_dedups_by_dimension() {
        let snapshot = FilterSnapshot::from_predicates(vec![
            FilterPredicate::new("Canal", "Telefone"),
            FilterPredicate::new("Tipo", "Reclamação"),
            FilterPredicate::new("Canal", "Presencial"),
        ]);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("Canal"), Some("Telefone"));
    }

    #[test]
    fn test_without_drops_only_that_dimension() {
        let snapshot = FilterSnapshot::from_predicates(vec![
            FilterPredicate::new("Canal", "Telefone"),
            FilterPredicate::new("Tipo", "Elogio"),
        ]);
        let narrowed = snapshot.without("Canal");
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed.get("Tipo"), Some("Elogio"));
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_display() {
        assert_eq!(FilterSnapshot::empty().to_string(), "(none)");
        let snapshot = FilterSnapshot::from_predicates(vec![
            FilterPredicate::new("Canal", "Telefone"),
            FilterPredicate::new("Tipo", "Elogio"),
        ]);
        assert_eq!(snapshot.to_string(), "Canal=Telefone, Tipo=Elogio");
    }

    #[test]
    fn test_serializes_as_plain_array() {
        let snapshot = FilterSnapshot::from_predicates(vec![FilterPredicate::new("Canal", "Telefone")]);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(json, r#"[{"dimension":"Canal","value":"Telefone"}]"#);
    }
}
