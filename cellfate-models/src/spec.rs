//! Specification shapes for per-gene, per-lineage options and the resolved
//! grid they expand to.

use std::collections::BTreeMap;

/// Named entries with an optional fallback for names that are not listed.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyed<T> {
    pub entries: BTreeMap<String, T>,
    pub fallback: Option<T>,
}

impl<T> Keyed<T> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            fallback: None,
        }
    }

    /// Add an entry, builder-style.
    pub fn with(mut self, key: impl Into<String>, value: T) -> Self {
        self.entries.insert(key.into(), value);
        self
    }

    /// Set the fallback, builder-style.
    pub fn with_fallback(mut self, value: T) -> Self {
        self.fallback = Some(value);
        self
    }

    /// The entry for `key`, else the fallback.
    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.get(key).or(self.fallback.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.fallback.is_none()
    }
}

impl<T> Default for Keyed<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for the lineages of a single gene.
#[derive(Debug, Clone, PartialEq)]
pub enum LineageSpec<T> {
    /// The same option for every lineage.
    All(T),
    PerLineage(Keyed<T>),
}

impl<T> LineageSpec<T> {
    pub fn get(&self, lineage: &str) -> Option<&T> {
        match self {
            LineageSpec::All(value) => Some(value),
            LineageSpec::PerLineage(keyed) => keyed.get(lineage),
        }
    }
}

/// Options over a genes × lineages grid, from least to most specific.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSpec<T> {
    /// Nothing given; only meaningful where a built-in default exists.
    Default,
    /// One option for every pair.
    Single(T),
    /// One option per gene, shared by its lineages.
    ByGene(Keyed<T>),
    ByGeneAndLineage(Keyed<LineageSpec<T>>),
}

/// Outcome of looking up one grid cell in a [`ModelSpec`].
#[derive(Debug, PartialEq)]
pub(crate) enum Slot<'a, T> {
    Found(&'a T),
    /// Looked up in [`ModelSpec::Default`].
    Unspecified,
    /// Neither an entry nor a fallback for the gene.
    MissingGene,
    /// The gene is covered but not this lineage.
    MissingLineage,
}

impl<T> ModelSpec<T> {
    pub(crate) fn slot(&self, gene: &str, lineage: &str) -> Slot<'_, T> {
        match self {
            ModelSpec::Default => Slot::Unspecified,
            ModelSpec::Single(value) => Slot::Found(value),
            ModelSpec::ByGene(keyed) => keyed.get(gene).map_or(Slot::MissingGene, Slot::Found),
            ModelSpec::ByGeneAndLineage(keyed) => match keyed.get(gene) {
                None => Slot::MissingGene,
                Some(per_gene) => per_gene
                    .get(lineage)
                    .map_or(Slot::MissingLineage, Slot::Found),
            },
        }
    }
}

impl<T> Default for ModelSpec<T> {
    fn default() -> Self {
        ModelSpec::Default
    }
}

impl<T> From<T> for ModelSpec<T> {
    fn from(value: T) -> Self {
        ModelSpec::Single(value)
    }
}

/// Values laid out over genes × lineages, genes major.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    genes: Vec<String>,
    lineages: Vec<String>,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Build a grid by calling `f` once per (gene, lineage), genes major.
    pub fn try_from_fn<E, F>(genes: &[String], lineages: &[String], mut f: F) -> Result<Self, E>
    where
        F: FnMut(&str, &str) -> Result<T, E>,
    {
        let mut cells = Vec::with_capacity(genes.len() * lineages.len());
        for gene in genes {
            for lineage in lineages {
                cells.push(f(gene, lineage)?);
            }
        }
        Ok(Self {
            genes: genes.to_vec(),
            lineages: lineages.to_vec(),
            cells,
        })
    }

    /// Wrap cells that are already in genes-major order.
    pub(crate) fn from_cells(genes: Vec<String>, lineages: Vec<String>, cells: Vec<T>) -> Self {
        debug_assert_eq!(cells.len(), genes.len() * lineages.len());
        Self {
            genes,
            lineages,
            cells,
        }
    }

    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    pub fn lineages(&self) -> &[String] {
        &self.lineages
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn position(&self, gene: &str, lineage: &str) -> Option<usize> {
        let g = self.genes.iter().position(|x| x == gene)?;
        let l = self.lineages.iter().position(|x| x == lineage)?;
        Some(g * self.lineages.len() + l)
    }

    pub fn get(&self, gene: &str, lineage: &str) -> Option<&T> {
        self.position(gene, lineage).map(|i| &self.cells[i])
    }

    pub fn get_mut(&mut self, gene: &str, lineage: &str) -> Option<&mut T> {
        self.position(gene, lineage).map(move |i| &mut self.cells[i])
    }

    /// `(gene, lineage, value)` in genes-major order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &T)> + '_ {
        let n_lineages = self.lineages.len();
        self.cells.iter().enumerate().map(move |(i, cell)| {
            (
                self.genes[i / n_lineages].as_str(),
                self.lineages[i % n_lineages].as_str(),
                cell,
            )
        })
    }

    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> Grid<U> {
        Grid {
            genes: self.genes.clone(),
            lineages: self.lineages.clone(),
            cells: self.cells.iter().map(f).collect(),
        }
    }

    /// Cells in genes-major order.
    pub fn into_cells(self) -> Vec<T> {
        self.cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn keyed_fallback() {
        let keyed = Keyed::new().with("foo", 1).with_fallback(0);
        assert_eq!(keyed.get("foo"), Some(&1));
        assert_eq!(keyed.get("bar"), Some(&0));
        assert_eq!(Keyed::<i32>::new().with("foo", 1).get("bar"), None);
        assert!(Keyed::<i32>::default().is_empty());
    }

    #[test]
    fn slots() {
        let spec = ModelSpec::ByGeneAndLineage(
            Keyed::new()
                .with("foo", LineageSpec::PerLineage(Keyed::new().with("bar", 1)))
                .with("baz", LineageSpec::All(2)),
        );
        assert_eq!(spec.slot("foo", "bar"), Slot::Found(&1));
        assert_eq!(spec.slot("foo", "quux"), Slot::MissingLineage);
        assert_eq!(spec.slot("baz", "quux"), Slot::Found(&2));
        assert_eq!(spec.slot("wex", "bar"), Slot::MissingGene);
        assert_eq!(ModelSpec::<i32>::Default.slot("a", "b"), Slot::Unspecified);
        assert_eq!(ModelSpec::from(7).slot("a", "b"), Slot::Found(&7));
    }

    #[test]
    fn grid_layout() {
        let grid = Grid::try_from_fn::<(), _>(&s(&["g0", "g1"]), &s(&["a", "b", "c"]), |g, l| {
            Ok(format!("{g}/{l}"))
        })
        .unwrap();
        assert_eq!(grid.len(), 6);
        assert_eq!(grid.get("g1", "b").map(String::as_str), Some("g1/b"));
        assert_eq!(grid.get("g2", "b"), None);
        let order: Vec<String> = grid.iter().map(|(g, l, _)| format!("{g}{l}")).collect();
        assert_eq!(order, s(&["g0a", "g0b", "g0c", "g1a", "g1b", "g1c"]));
        assert_eq!(grid.map(|v| v.len()).get("g0", "c"), Some(&4));
    }
}
