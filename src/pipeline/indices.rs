//! Inflammation indices derived from raw counts.
//!
//! Always computed from the raw values of a record, never from another
//! index, and never written to the store.

use serde::Serialize;

use crate::models::{LabField, LabValues};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DerivedIndices {
    /// Neutrophil-to-lymphocyte ratio.
    pub nlr: Option<f64>,
    /// Platelet-to-lymphocyte ratio.
    pub plr: Option<f64>,
    /// Systemic immune-inflammation index: PLT × NEUT / LYMPH.
    pub sii: Option<f64>,
}

/// Compute NLR, PLR and SII.
///
/// An index is `None` when one of its inputs is missing or the lymphocyte
/// count is zero or not finite.
pub fn compute_indices(values: &LabValues) -> DerivedIndices {
    let Some(lymph) = values
        .get(LabField::Lymph)
        .filter(|l| l.is_finite() && *l != 0.0)
    else {
        return DerivedIndices::default();
    };
    let neut = values.get(LabField::Neut);
    let plt = values.get(LabField::Plt);

    let ratio = |numerator: Option<f64>| {
        numerator
            .map(|n| n / lymph)
            .filter(|r| r.is_finite())
    };

    DerivedIndices {
        nlr: ratio(neut),
        plr: ratio(plt),
        sii: ratio(plt.zip(neut).map(|(p, n)| p * n)),
    }
}
