//! Named membership matrices.

use std::collections::HashSet;

use cellfate_core::{CellfateError, Result, Summarizable};
use cellfate_omics::colors::palette_color;
use cellfate_omics::{is_color_like, AnnData};

/// Cell × lineage matrix of fate probabilities or memberships, with one name
/// and one colour per lineage.
#[derive(Debug, Clone, PartialEq)]
pub struct Lineage {
    values: Vec<Vec<f64>>,
    names: Vec<String>,
    colors: Vec<String>,
}

impl Lineage {
    /// Create a lineage matrix with default palette colours.
    ///
    /// # Errors
    ///
    /// Returns an error if rows differ in length, the number of names does not
    /// match the number of columns, names repeat, or a value is not finite.
    pub fn new(values: Vec<Vec<f64>>, names: Vec<String>) -> Result<Self> {
        let n_lineages = names.len();
        if n_lineages == 0 {
            return Err(CellfateError::InvalidInput(
                "a lineage matrix needs at least one lineage".into(),
            ));
        }
        if let Some(i) = values.iter().position(|row| row.len() != n_lineages) {
            return Err(CellfateError::InvalidInput(format!(
                "row {i} has {} entries, expected {n_lineages} (one per lineage name)",
                values[i].len()
            )));
        }
        if values.iter().flatten().any(|v| !v.is_finite()) {
            return Err(CellfateError::InvalidInput(
                "lineage values must be finite".into(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = names.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(CellfateError::InvalidInput(format!(
                "lineage name `{dup}` is not unique"
            )));
        }
        let colors = (0..n_lineages).map(|k| palette_color(k).to_string()).collect();
        Ok(Self {
            values,
            names,
            colors,
        })
    }

    /// Replace the lineage colours.
    pub fn with_colors(mut self, colors: Vec<String>) -> Result<Self> {
        if colors.len() != self.names.len() {
            return Err(CellfateError::InvalidInput(format!(
                "expected {} colors, found {}",
                self.names.len(),
                colors.len()
            )));
        }
        if !colors.iter().all(|c| is_color_like(c)) {
            return Err(CellfateError::InvalidInput(
                "Not all colors are color-like.".into(),
            ));
        }
        self.colors = colors;
        Ok(self)
    }

    pub fn n_cells(&self) -> usize {
        self.values.len()
    }

    pub fn n_lineages(&self) -> usize {
        self.names.len()
    }

    /// Row-major values (cells × lineages).
    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn colors(&self) -> &[String] {
        &self.colors
    }

    /// Column position of a lineage.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Values of one lineage across all cells.
    pub fn column(&self, name: &str) -> Result<Vec<f64>> {
        let j = self
            .index_of(name)
            .ok_or_else(|| CellfateError::KeyNotFound(format!("lineage `{name}` not found")))?;
        Ok(self.values.iter().map(|row| row[j]).collect())
    }

    /// Store in `obsm[key]`, with names and colours in `uns["{key}_names"]`
    /// and `uns["{key}_colors"]`.
    pub fn write_to(&self, adata: &mut AnnData, key: &str) -> Result<()> {
        adata.add_obsm(key, self.values.clone())?;
        adata.add_uns(&format!("{key}_names"), self.names.join(","));
        adata.add_uns(&format!("{key}_colors"), self.colors.join(","));
        Ok(())
    }

    /// Read a matrix stored with [`Lineage::write_to`].
    pub fn from_adata(adata: &AnnData, key: &str) -> Result<Self> {
        let values = adata
            .get_obsm(key)
            .ok_or_else(|| CellfateError::KeyNotFound(format!("`obsm[{key:?}]` not found")))?;
        let names_key = format!("{key}_names");
        let names: Vec<String> = adata
            .get_uns(&names_key)
            .ok_or_else(|| CellfateError::KeyNotFound(format!("`uns[{names_key:?}]` not found")))?
            .split(',')
            .map(String::from)
            .collect();
        let lineage = Self::new(values.clone(), names)?;
        match adata.get_uns(&format!("{key}_colors")) {
            Some(colors) => lineage.with_colors(colors.split(',').map(String::from).collect()),
            None => Ok(lineage),
        }
    }
}

impl Summarizable for Lineage {
    fn summary(&self) -> String {
        format!(
            "Lineage: {} cells \u{00d7} {} lineages [{}]",
            self.n_cells(),
            self.n_lineages(),
            self.names.join(", ")
        )
    }
}
