//! Merging, regrouping and recolouring of categorical series, plus one-hot
//! encoding helpers.
//!
//! These operations back the bookkeeping of state assignments across repeated
//! estimator runs: a fresh assignment is merged into a previous one, or a
//! subset of states is regrouped under combined labels, while keeping a colour
//! per category aligned with the category order.

use std::borrow::Cow;
use std::collections::HashSet;

use cellfate_core::{CellfateError, Result};

use crate::colors::{is_color_like, mean_color, palette_color, ColorSpec};
use crate::series::{Series, MISSING};
use crate::single_cell::ColumnData;

/// Result of [`merge_categorical`].
#[derive(Debug, Clone, PartialEq)]
pub struct MergedCategorical {
    /// The merged series.
    pub series: Series,
    /// One colour per output category; present when either input supplied colours.
    pub colors: Option<Vec<String>>,
}

/// Overlay `new` onto `old`: each entry takes `new`'s value unless it is
/// missing, in which case `old`'s value is kept.
///
/// Output categories are `old`'s categories followed by the categories only in
/// `new`, restricted to the ones that occur in the merged data. Colours are
/// owned by `old` for shared categories unless `color_overwrite` is set;
/// categories whose owner supplied no colours take the default palette entry
/// for their output position.
///
/// # Errors
///
/// - [`CellfateError::InvalidType`] if either series is not categorical
/// - [`CellfateError::InvalidInput`] if the indices differ or a colour
///   specification is malformed
pub fn merge_categorical(
    old: &Series,
    new: &Series,
    colors_old: Option<&ColorSpec>,
    colors_new: Option<&ColorSpec>,
    color_overwrite: bool,
) -> Result<MergedCategorical> {
    let (old_codes, old_cats) = old.require_categorical("old")?;
    let (new_codes, new_cats) = new.require_categorical("new")?;
    if old.index() != new.index() {
        return Err(CellfateError::InvalidInput(
            "Index for `old` and `new` differ.".into(),
        ));
    }

    let old_colors = colors_old
        .map(|c| c.resolve(old_cats, "colors_old"))
        .transpose()?;
    let new_colors = colors_new
        .map(|c| c.resolve(new_cats, "colors_new"))
        .transpose()?;

    let mut all_cats: Vec<&str> = old_cats.iter().map(String::as_str).collect();
    for c in new_cats {
        if !old_cats.contains(c) {
            all_cats.push(c);
        }
    }

    let merged_labels: Vec<Option<&str>> = old_codes
        .iter()
        .zip(new_codes)
        .map(|(&o, &n)| {
            label_of(n, new_cats)
                .or_else(|| label_of(o, old_cats))
                .map(String::as_str)
        })
        .collect();

    let present: HashSet<&str> = merged_labels.iter().flatten().copied().collect();
    let categories: Vec<String> = all_cats
        .into_iter()
        .filter(|c| present.contains(c))
        .map(String::from)
        .collect();

    let colors = if old_colors.is_some() || new_colors.is_some() {
        let lookup = |cats: &[String], colors: &Option<Vec<String>>, cat: &str| {
            colors.as_ref().and_then(|cols| {
                cats.iter().position(|c| c == cat).map(|i| cols[i].clone())
            })
        };
        Some(
            categories
                .iter()
                .enumerate()
                .map(|(k, cat)| {
                    let in_old = old_cats.contains(cat);
                    let in_new = new_cats.contains(cat);
                    let owned_by_new = in_new && (!in_old || color_overwrite);
                    let owned = if owned_by_new {
                        lookup(new_cats, &new_colors, cat)
                    } else {
                        lookup(old_cats, &old_colors, cat)
                    };
                    owned.unwrap_or_else(|| palette_color(k).to_string())
                })
                .collect(),
        )
    } else {
        None
    };

    tracing::debug!(
        n_categories = categories.len(),
        color_overwrite,
        "merged categorical series"
    );

    let series = Series::categorical(old.index().to_vec(), &merged_labels, categories)?;
    Ok(MergedCategorical { series, colors })
}

fn label_of(code: i32, categories: &[String]) -> Option<&String> {
    usize::try_from(code).ok().and_then(|c| categories.get(c))
}

/// Restrict a categorical series to `keys`, merging comma-separated groups of
/// categories into one combined category.
///
/// Each key is split on `,`; its members are trimmed, deduplicated and sorted,
/// and the combined label joins them with `", "` (`"b, a, d"` becomes
/// `"a, b, d"`). Entries outside every group become missing.
///
/// With `keys = None` the inputs are handed back borrowed. `cols`, when given,
/// holds one colour per category of `series`; the returned colours hold one
/// colour per group, blending multi-member groups with [`mean_color`].
///
/// # Errors
///
/// - [`CellfateError::InvalidType`] if the series is not categorical
/// - [`CellfateError::InvalidInput`] for a colour count that does not match the
///   categories, non colour-like colours, overlapping groups, or unknown names
pub fn process_series<'a, S: AsRef<str>>(
    series: &'a Series,
    keys: Option<&[S]>,
    cols: Option<&'a [String]>,
) -> Result<(Cow<'a, Series>, Option<Cow<'a, [String]>>)> {
    let (codes, categories) = series.require_categorical("series")?;

    let Some(keys) = keys else {
        return Ok((Cow::Borrowed(series), cols.map(Cow::Borrowed)));
    };

    if let Some(cols) = cols {
        if cols.len() != categories.len() {
            return Err(CellfateError::InvalidInput(format!(
                "Length of colors ({}) does not match length of categories ({}).",
                cols.len(),
                categories.len()
            )));
        }
        if !cols.iter().all(|c| is_color_like(c)) {
            return Err(CellfateError::InvalidInput(
                "Not all colors are color-like.".into(),
            ));
        }
    }

    let groups: Vec<Vec<&str>> = keys
        .iter()
        .map(|key| {
            let mut members: Vec<&str> = key.as_ref().split(',').map(str::trim).collect();
            members.sort_unstable();
            members.dedup();
            members
        })
        .collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut overlapping: Vec<&str> = Vec::new();
    for &member in groups.iter().flatten() {
        if !seen.insert(member) {
            overlapping.push(member);
        }
    }
    if !overlapping.is_empty() {
        overlapping.sort_unstable();
        overlapping.dedup();
        return Err(CellfateError::InvalidInput(format!(
            "Found overlapping keys: `{}`.",
            overlapping.join(", ")
        )));
    }

    let mut unknown: Vec<&str> = seen
        .iter()
        .copied()
        .filter(|m| !categories.iter().any(|c| c == m))
        .collect();
    if !unknown.is_empty() {
        unknown.sort_unstable();
        return Err(CellfateError::InvalidInput(format!(
            "Not all keys are proper categories. Check for spelling mistakes in `{}`.",
            unknown.join(", ")
        )));
    }

    let labels: Vec<String> = groups.iter().map(|g| g.join(", ")).collect();
    // category code -> group code
    let mut remap = vec![MISSING; categories.len()];
    for (g, members) in groups.iter().enumerate() {
        for m in members {
            if let Some(c) = categories.iter().position(|c| c == m) {
                remap[c] = g as i32;
            }
        }
    }
    let new_codes: Vec<i32> = codes
        .iter()
        .map(|&c| usize::try_from(c).map_or(MISSING, |c| remap[c]))
        .collect();

    let new_cols = cols
        .map(|cols| {
            groups
                .iter()
                .map(|members| {
                    let member_cols: Vec<&str> = members
                        .iter()
                        .filter_map(|m| categories.iter().position(|c| c == m))
                        .map(|i| cols[i].as_str())
                        .collect();
                    match member_cols.as_slice() {
                        [single] => Ok(single.to_string()),
                        many => mean_color(many),
                    }
                })
                .collect::<Result<Vec<String>>>()
        })
        .transpose()?;

    tracing::debug!(n_groups = labels.len(), "processed categorical series");

    let out = Series::new(
        series.index().to_vec(),
        ColumnData::Categorical {
            codes: new_codes,
            categories: labels,
        },
    )?;
    Ok((Cow::Owned(out), new_cols.map(Cow::Owned)))
}

/// Boolean indicator vector of length `n`, true at `cat`.
///
/// # Errors
///
/// [`CellfateError::OutOfBounds`] if `cat >= n`.
pub fn one_hot(n: usize, cat: Option<usize>) -> Result<Vec<bool>> {
    let mut out = vec![false; n];
    if let Some(cat) = cat {
        let slot = out.get_mut(cat).ok_or_else(|| {
            CellfateError::OutOfBounds(format!("index {cat} is out of bounds for size {n}"))
        })?;
        *slot = true;
    }
    Ok(out)
}

/// Decode a one-hot matrix (rows = entities, columns = categories) into a
/// categorical series. Rows without a true entry become missing.
///
/// `index` defaults to `"0".."n-1"` and `names` to `"0".."k-1"`.
///
/// # Errors
///
/// [`CellfateError::InvalidInput`] on shape mismatches or rows with more than
/// one true entry.
pub fn series_from_one_hot(
    matrix: &[Vec<bool>],
    index: Option<Vec<String>>,
    names: Option<Vec<String>>,
) -> Result<Series> {
    let n_cols = matrix.first().map_or(0, Vec::len);
    if matrix.iter().any(|row| row.len() != n_cols) {
        return Err(CellfateError::InvalidInput(
            "Shape mismatch: rows of the one-hot matrix differ in length.".into(),
        ));
    }
    let names = names.unwrap_or_else(|| (0..n_cols).map(|i| i.to_string()).collect());
    if names.len() != n_cols {
        return Err(CellfateError::InvalidInput(format!(
            "Shape mismatch: got {} names for {} columns.",
            names.len(),
            n_cols
        )));
    }
    let index = index.unwrap_or_else(|| (0..matrix.len()).map(|i| i.to_string()).collect());
    if index.len() != matrix.len() {
        return Err(CellfateError::InvalidInput(format!(
            "Shape mismatch: got {} index labels for {} rows.",
            index.len(),
            matrix.len()
        )));
    }

    let mut codes = Vec::with_capacity(matrix.len());
    for row in matrix {
        let mut hits = row.iter().enumerate().filter(|&(_, &v)| v).map(|(j, _)| j);
        let code = match (hits.next(), hits.next()) {
            (None, _) => MISSING,
            (Some(j), None) => j as i32,
            (Some(_), Some(_)) => {
                return Err(CellfateError::InvalidInput(
                    "Not all rows are one-hot encoded.".into(),
                ))
            }
        };
        codes.push(code);
    }

    Series::new(
        index,
        ColumnData::Categorical {
            codes,
            categories: names,
        },
    )
}

/// [`series_from_one_hot`] for a numeric 0/1 indicator matrix.
///
/// # Errors
///
/// [`CellfateError::InvalidType`] if an entry is neither `0` nor `1`.
pub fn series_from_indicator(
    matrix: &[Vec<f64>],
    index: Option<Vec<String>>,
    names: Option<Vec<String>>,
) -> Result<Series> {
    let bools = matrix
        .iter()
        .map(|row| {
            row.iter()
                .map(|&v| {
                    if v == 0.0 {
                        Ok(false)
                    } else if v == 1.0 {
                        Ok(true)
                    } else {
                        Err(CellfateError::InvalidType(
                            "Expected the indicator matrix to be boolean.".into(),
                        ))
                    }
                })
                .collect::<Result<Vec<bool>>>()
        })
        .collect::<Result<Vec<_>>>()?;
    series_from_one_hot(&bools, index, names)
}
