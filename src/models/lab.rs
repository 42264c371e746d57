use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// The fixed set of numeric values read from a lab report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LabField {
    Hgb,
    Plt,
    Rdw,
    Neut,
    Lymph,
    Ig,
    Crp,
    Pct,
}

impl LabField {
    pub const ALL: [LabField; 8] = [
        LabField::Hgb,
        LabField::Plt,
        LabField::Rdw,
        LabField::Neut,
        LabField::Lymph,
        LabField::Ig,
        LabField::Crp,
        LabField::Pct,
    ];

    pub const fn index(self) -> usize {
        match self {
            LabField::Hgb => 0,
            LabField::Plt => 1,
            LabField::Rdw => 2,
            LabField::Neut => 3,
            LabField::Lymph => 4,
            LabField::Ig => 5,
            LabField::Crp => 6,
            LabField::Pct => 7,
        }
    }

    /// Canonical key used in model replies and sheet headers.
    pub const fn key(self) -> &'static str {
        match self {
            LabField::Hgb => "HGB",
            LabField::Plt => "PLT",
            LabField::Rdw => "RDW",
            LabField::Neut => "NEUT",
            LabField::Lymph => "LYMPH",
            LabField::Ig => "IG",
            LabField::Crp => "CRP",
            LabField::Pct => "PCT",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LabField::Hgb => "Hemoglobin",
            LabField::Plt => "Platelet count",
            LabField::Rdw => "Red cell distribution width",
            LabField::Neut => "Absolute neutrophil count",
            LabField::Lymph => "Absolute lymphocyte count",
            LabField::Ig => "Absolute immature granulocyte count",
            LabField::Crp => "C-reactive protein",
            LabField::Pct => "Procalcitonin",
        }
    }

    /// Other spellings seen in replies and in older sheet headers.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            LabField::Hgb => &["Hemoglobin"],
            LabField::Plt => &["Trombosit", "Platelets"],
            LabField::Rdw => &["RDW-CV"],
            LabField::Neut => &["NEUT_HASH", "NEU#", "Neu"],
            LabField::Lymph => &["LYMPH_HASH", "LYM#"],
            LabField::Ig => &["IG_HASH", "IG#"],
            LabField::Crp => &[],
            LabField::Pct => &["Prokalsitonin", "Procalcitonin"],
        }
    }

    /// Row names printed on the reports, as the model should look for them.
    pub fn report_names(self) -> &'static [&'static str] {
        match self {
            LabField::Hgb => &["HGB", "Hemoglobin"],
            LabField::Plt => &["PLT", "Trombosit"],
            LabField::Rdw => &["RDW", "RDW-CV"],
            LabField::Neut => &["NEU#", "Nötrofil#"],
            LabField::Lymph => &["LYM#", "Lenfosit#"],
            LabField::Ig => &["IG#", "İmmatür Granülosit"],
            LabField::Crp => &["CRP"],
            LabField::Pct => &["Prokalsitonin", "PCT"],
        }
    }

    /// Case-insensitive lookup by canonical key or alias.
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::ALL.into_iter().find(|field| {
            field.key().eq_ignore_ascii_case(key)
                || field.aliases().iter().any(|a| a.eq_ignore_ascii_case(key))
        })
    }
}

/// One optional value per [`LabField`]. A missing value is `None`, never zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LabValues([Option<f64>; 8]);

impl LabValues {
    pub fn get(&self, field: LabField) -> Option<f64> {
        self.0[field.index()]
    }

    pub fn set(&mut self, field: LabField, value: Option<f64>) {
        self.0[field.index()] = value;
    }

    pub fn with(mut self, field: LabField, value: Option<f64>) -> Self {
        self.set(field, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (LabField, Option<f64>)> + '_ {
        LabField::ALL.into_iter().map(|f| (f, self.get(f)))
    }

    pub fn present_count(&self) -> usize {
        self.0.iter().filter(|v| v.is_some()).count()
    }
}

impl Serialize for LabValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(LabField::ALL.len()))?;
        for (field, value) in self.iter() {
            map.serialize_entry(field.key(), &value)?;
        }
        map.end()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgeError {
    #[error("Months must be between 0 and 11, got {0}")]
    MonthsOutOfRange(u32),
    #[error("Years must be at most {max}, got {0}", max = PatientAge::MAX_YEARS)]
    YearsOutOfRange(u32),
}

/// Age as written on the report: whole years plus whole months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PatientAge {
    years: u32,
    months: u32,
}

impl PatientAge {
    pub const MAX_YEARS: u32 = 130;

    pub fn new(years: u32, months: u32) -> Result<Self, AgeError> {
        if months > 11 {
            return Err(AgeError::MonthsOutOfRange(months));
        }
        if years > Self::MAX_YEARS {
            return Err(AgeError::YearsOutOfRange(years));
        }
        Ok(Self { years, months })
    }

    pub fn years(&self) -> u32 {
        self.years
    }

    pub fn months(&self) -> u32 {
        self.months
    }

    pub fn total_months(&self) -> u32 {
        self.years * 12 + self.months
    }
}

/// One patient encounter, as appended to the shared sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LabRecord {
    /// Name or protocol number. Not validated for uniqueness.
    pub identifier: Option<String>,
    pub age: Option<PatientAge>,
    pub values: LabValues,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_matches_position_in_all() {
        for (i, field) in LabField::ALL.into_iter().enumerate() {
            assert_eq!(field.index(), i, "{field:?}");
        }
    }

    #[test]
    fn from_key_accepts_aliases_and_case() {
        assert_eq!(LabField::from_key("hgb"), Some(LabField::Hgb));
        assert_eq!(LabField::from_key("NEUT_HASH"), Some(LabField::Neut));
        assert_eq!(LabField::from_key("lymph_hash"), Some(LabField::Lymph));
        assert_eq!(LabField::from_key("Prokalsitonin"), Some(LabField::Pct));
        assert_eq!(LabField::from_key(" CRP "), Some(LabField::Crp));
        assert_eq!(LabField::from_key("WBC"), None);
        assert_eq!(LabField::from_key("ID"), None);
    }

    #[test]
    fn keys_are_unique() {
        for a in LabField::ALL {
            for b in LabField::ALL {
                if a != b {
                    assert_ne!(a.key(), b.key());
                }
            }
        }
    }

    #[test]
    fn values_default_to_missing() {
        let values = LabValues::default();
        assert!(values.iter().all(|(_, v)| v.is_none()));
        assert_eq!(values.present_count(), 0);
    }

    #[test]
    fn with_sets_single_field() {
        let values = LabValues::default()
            .with(LabField::Crp, Some(0.0))
            .with(LabField::Hgb, Some(11.2));
        assert_eq!(values.get(LabField::Crp), Some(0.0));
        assert_eq!(values.get(LabField::Hgb), Some(11.2));
        assert_eq!(values.get(LabField::Pct), None);
        assert_eq!(values.present_count(), 2);
    }

    #[test]
    fn values_serialize_as_keyed_map() {
        let values = LabValues::default().with(LabField::Neut, Some(4.5));
        let json = serde_json::to_value(values).unwrap();
        assert_eq!(json["NEUT"], 4.5);
        assert!(json["LYMPH"].is_null());
        assert_eq!(json.as_object().unwrap().len(), 8);
    }

    #[test]
    fn age_total_months() {
        let age = PatientAge::new(1, 3).unwrap();
        assert_eq!(age.total_months(), 15);
        assert_eq!(PatientAge::new(0, 0).unwrap().total_months(), 0);
    }

    #[test]
    fn age_rejects_twelve_months() {
        assert_eq!(PatientAge::new(2, 12), Err(AgeError::MonthsOutOfRange(12)));
        assert_eq!(
            PatientAge::new(400_000_000, 0),
            Err(AgeError::YearsOutOfRange(400_000_000))
        );
        let oldest = PatientAge::new(PatientAge::MAX_YEARS, 11).unwrap();
        assert_eq!(oldest.total_months(), PatientAge::MAX_YEARS * 12 + 11);
    }
}
