//! Labelled one-dimensional columns.

use cellfate_core::{CellfateError, Result, Summarizable};

use crate::single_cell::ColumnData;

/// Marker code of a missing categorical entry.
pub const MISSING: i32 = -1;

/// A column of values with one label per entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    index: Vec<String>,
    values: ColumnData,
}

impl Series {
    /// Create a series, checking that index and values have the same length.
    pub fn new(index: Vec<String>, values: ColumnData) -> Result<Self> {
        if index.len() != values.len() {
            return Err(CellfateError::InvalidInput(format!(
                "index length ({}) does not match values length ({})",
                index.len(),
                values.len()
            )));
        }
        Ok(Self { index, values })
    }

    pub(crate) fn new_unchecked(index: Vec<String>, values: ColumnData) -> Self {
        Self { index, values }
    }

    /// Build a categorical series from optional labels.
    ///
    /// Every present label must be one of `categories`.
    pub fn categorical(
        index: Vec<String>,
        labels: &[Option<&str>],
        categories: Vec<String>,
    ) -> Result<Self> {
        let codes = labels
            .iter()
            .map(|label| match label {
                None => Ok(MISSING),
                Some(l) => categories
                    .iter()
                    .position(|c| c == l)
                    .map(|p| p as i32)
                    .ok_or_else(|| {
                        CellfateError::InvalidInput(format!("label `{l}` is not a category"))
                    }),
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(index, ColumnData::Categorical { codes, categories })
    }

    /// Index labels.
    pub fn index(&self) -> &[String] {
        &self.index
    }

    /// Underlying values.
    pub fn values(&self) -> &ColumnData {
        &self.values
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the series has no entries.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self.values, ColumnData::Categorical { .. })
    }

    /// Declared categories, or `None` for a non-categorical series.
    pub fn categories(&self) -> Option<&[String]> {
        match &self.values {
            ColumnData::Categorical { categories, .. } => Some(categories),
            _ => None,
        }
    }

    /// Category codes, or `None` for a non-categorical series.
    pub fn codes(&self) -> Option<&[i32]> {
        match &self.values {
            ColumnData::Categorical { codes, .. } => Some(codes),
            _ => None,
        }
    }

    /// Per-entry category name; missing entries are `None`.
    pub fn category_labels(&self) -> Option<Vec<Option<&str>>> {
        match &self.values {
            ColumnData::Categorical { codes, categories } => Some(
                codes
                    .iter()
                    .map(|&c| {
                        usize::try_from(c)
                            .ok()
                            .and_then(|c| categories.get(c))
                            .map(String::as_str)
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Positions assigned to `category`.
    pub fn positions_of(&self, category: &str) -> Vec<usize> {
        self.category_labels()
            .map(|labels| {
                labels
                    .iter()
                    .enumerate()
                    .filter(|(_, l)| **l == Some(category))
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Codes and categories, or an `InvalidType` error naming `what`.
    pub(crate) fn require_categorical(&self, what: &str) -> Result<(&[i32], &[String])> {
        match &self.values {
            ColumnData::Categorical { codes, categories } => Ok((codes, categories)),
            other => Err(CellfateError::InvalidType(format!(
                "Expected `{what}` to be a categorical series, found {}",
                other.kind()
            ))),
        }
    }
}

impl Summarizable for Series {
    fn summary(&self) -> String {
        match self.categories() {
            Some(cats) => format!(
                "Series: {} entries, categorical with {} categories",
                self.len(),
                cats.len()
            ),
            None => format!("Series: {} entries, {}", self.len(), self.values.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("c{i}")).collect()
    }

    #[test]
    fn categorical_from_labels() {
        let s = Series::categorical(
            idx(3),
            &[Some("b"), None, Some("a")],
            vec!["a".into(), "b".into()],
        )
        .unwrap();
        assert_eq!(s.codes().unwrap(), &[1, MISSING, 0]);
        assert_eq!(s.category_labels().unwrap(), vec![Some("b"), None, Some("a")]);
        assert_eq!(s.positions_of("a"), vec![2]);
    }

    #[test]
    fn unknown_label_rejected() {
        assert!(Series::categorical(idx(1), &[Some("z")], vec!["a".into()]).is_err());
    }

    #[test]
    fn length_mismatch_rejected() {
        assert!(Series::new(idx(2), ColumnData::Numeric(vec![1.0])).is_err());
    }

    #[test]
    fn numeric_is_not_categorical() {
        let s = Series::new(idx(1), ColumnData::Numeric(vec![1.0])).unwrap();
        assert!(!s.is_categorical());
        assert!(matches!(
            s.require_categorical("x"),
            Err(CellfateError::InvalidType(_))
        ));
        assert_eq!(s.summary(), "Series: 1 entries, numeric");
    }
}
