use std::fmt::Write as _;
use std::path::PathBuf;

use super::{fmt_stat, fmt_value, CommandError};
use crate::config::{env_lookup, StoreSettings, VisionSettings};
use crate::models::{LabField, PatientAge, ReportKind};
use crate::pipeline::extraction::{ExtractionError, ReportImage, ReportImages};
use crate::pipeline::normalize::normalize_numeric;
use crate::pipeline::{DraftRecord, Ingestor};

#[derive(clap::Args, Debug, Default)]
pub struct IngestArgs {
    /// Photo of the hemogram (complete blood count) sheet
    #[arg(long, value_name = "PATH")]
    pub hemogram: Option<PathBuf>,

    /// Photo of the biochemistry sheet
    #[arg(long, value_name = "PATH")]
    pub biochemistry: Option<PathBuf>,

    /// Patient age in whole years
    #[arg(long)]
    pub years: Option<u32>,

    /// Months past the last birthday (0-11)
    #[arg(long)]
    pub months: Option<u32>,

    /// Correct a value before saving, e.g. `--set HGB=10.4` or `--set ID=1042`.
    /// An empty value clears the field.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub corrections: Vec<String>,

    /// Print the draft without saving it
    #[arg(long)]
    pub dry_run: bool,
}

/// A manual fix applied to the draft before saving.
#[derive(Debug, Clone, PartialEq)]
pub enum Correction {
    Identifier(Option<String>),
    Value(LabField, Option<f64>),
}

pub fn parse_correction(input: &str) -> Result<Correction, CommandError> {
    let invalid = |reason: &str| CommandError::InvalidCorrection {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let (key, value) = input.split_once('=').ok_or_else(|| invalid("expected KEY=VALUE"))?;
    let key = key.trim();
    let value = value.trim();

    if key.eq_ignore_ascii_case("ID") {
        let id = (!value.is_empty()).then(|| value.to_string());
        return Ok(Correction::Identifier(id));
    }

    let field = LabField::from_key(key).ok_or_else(|| invalid("unknown field"))?;
    if value.is_empty() || value.eq_ignore_ascii_case("null") {
        return Ok(Correction::Value(field, None));
    }
    let number = normalize_numeric(value).ok_or_else(|| invalid("not a number"))?;
    Ok(Correction::Value(field, Some(number)))
}

pub fn apply_corrections(draft: &DraftRecord, corrections: &[Correction]) -> DraftRecord {
    corrections
        .iter()
        .fold(draft.clone(), |next, correction| match correction {
            Correction::Identifier(id) => next.with_identifier(id.clone()),
            Correction::Value(field, value) => next.with_value(*field, *value),
        })
}

fn patient_age(years: Option<u32>, months: Option<u32>) -> Result<Option<PatientAge>, CommandError> {
    if years.is_none() && months.is_none() {
        return Ok(None);
    }
    Ok(Some(PatientAge::new(
        years.unwrap_or(0),
        months.unwrap_or(0),
    )?))
}

fn load_images(args: &IngestArgs) -> Result<ReportImages, ExtractionError> {
    let load = |kind, path: &Option<PathBuf>| {
        path.as_deref()
            .map(|p| ReportImage::from_path(kind, p))
            .transpose()
    };
    Ok(ReportImages {
        hemogram: load(ReportKind::Hemogram, &args.hemogram)?,
        biochemistry: load(ReportKind::Biochemistry, &args.biochemistry)?,
    })
}

pub fn render_draft(draft: &DraftRecord) -> String {
    let record = draft.record();
    let mut out = String::new();

    let _ = writeln!(out, "Draft {} (model {})", draft.id(), draft.model());
    let _ = writeln!(
        out,
        "  {:<6} {}",
        "ID",
        record.identifier.as_deref().unwrap_or("-")
    );
    let age = record.age.map_or_else(
        || "-".to_string(),
        |a| format!("{}y {}m ({} months)", a.years(), a.months(), a.total_months()),
    );
    let _ = writeln!(out, "  {:<6} {age}", "AGE");

    for (field, value) in record.values.iter() {
        let _ = writeln!(out, "  {:<6} {}", field.key(), fmt_value(value));
    }

    let indices = draft.indices();
    for (name, value) in [("NLR", indices.nlr), ("PLR", indices.plr), ("SII", indices.sii)] {
        let _ = writeln!(out, "  {name:<6} {}", fmt_stat(value));
    }
    out
}

pub fn run(args: IngestArgs) -> Result<(), CommandError> {
    let vision_settings = VisionSettings::from_lookup(&env_lookup)?;
    let store_settings = StoreSettings::from_lookup(&env_lookup)?;

    let corrections = args
        .corrections
        .iter()
        .map(|c| parse_correction(c))
        .collect::<Result<Vec<_>, _>>()?;
    let age = patient_age(args.years, args.months)?;

    let images = load_images(&args)?;
    if images.is_empty() {
        return Err(ExtractionError::NoInput.into());
    }

    let store = if args.dry_run {
        store_settings.open()?
    } else {
        store_settings.open_or_create()?
    };
    let ingestor = Ingestor::new(
        vision_settings.build_client()?,
        store,
        store_settings.schema,
    );

    let draft = ingestor.extract(&images, age)?;
    print!("{}", render_draft(&draft));

    let draft = if corrections.is_empty() {
        draft
    } else {
        let corrected = apply_corrections(&draft, &corrections);
        println!("After corrections:");
        print!("{}", render_draft(&corrected));
        corrected
    };

    if args.dry_run {
        println!("Dry run: draft not saved.");
        return Ok(());
    }

    ingestor.confirm_and_save(&draft)?;
    println!("Saved to sheet \"{}\".", ingestor.store().name());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgeError, LabRecord, LabValues};

    fn draft() -> DraftRecord {
        let record = LabRecord {
            identifier: Some("Protokol 77".into()),
            age: Some(PatientAge::new(1, 6).unwrap()),
            values: LabValues::default()
                .with(LabField::Hgb, Some(10.2))
                .with(LabField::Neut, Some(4.0))
                .with(LabField::Lymph, Some(2.0)),
        };
        DraftRecord::new("mock-vision", record, "{}".into())
    }

    #[test]
    fn parses_value_corrections() {
        assert_eq!(
            parse_correction("HGB=10,4").unwrap(),
            Correction::Value(LabField::Hgb, Some(10.4))
        );
        assert_eq!(
            parse_correction(" neut_hash = 3.3 ").unwrap(),
            Correction::Value(LabField::Neut, Some(3.3))
        );
        assert_eq!(
            parse_correction("CRP=").unwrap(),
            Correction::Value(LabField::Crp, None)
        );
        assert_eq!(
            parse_correction("PCT=null").unwrap(),
            Correction::Value(LabField::Pct, None)
        );
    }

    #[test]
    fn parses_identifier_corrections() {
        assert_eq!(
            parse_correction("ID=Ayse K.").unwrap(),
            Correction::Identifier(Some("Ayse K.".into()))
        );
        assert_eq!(parse_correction("id=").unwrap(), Correction::Identifier(None));
    }

    #[test]
    fn rejects_bad_corrections() {
        for input in ["HGB", "WBC=5", "HGB=abc"] {
            assert!(
                matches!(parse_correction(input), Err(CommandError::InvalidCorrection { .. })),
                "{input}"
            );
        }
    }

    #[test]
    fn corrections_apply_in_order() {
        let original = draft();
        let corrected = apply_corrections(
            &original,
            &[
                Correction::Value(LabField::Hgb, Some(11.0)),
                Correction::Value(LabField::Hgb, Some(11.5)),
                Correction::Value(LabField::Neut, None),
                Correction::Identifier(None),
            ],
        );
        assert_eq!(corrected.record().values.get(LabField::Hgb), Some(11.5));
        assert_eq!(corrected.record().values.get(LabField::Neut), None);
        assert_eq!(corrected.record().identifier, None);
        assert_eq!(original.record().values.get(LabField::Hgb), Some(10.2));
    }

    #[test]
    fn age_from_flags() {
        assert_eq!(patient_age(None, None).unwrap(), None);
        assert_eq!(
            patient_age(Some(2), None).unwrap(),
            Some(PatientAge::new(2, 0).unwrap())
        );
        assert_eq!(
            patient_age(None, Some(7)).unwrap(),
            Some(PatientAge::new(0, 7).unwrap())
        );
        assert!(matches!(patient_age(Some(1), Some(12)), Err(CommandError::Age(_))));
        assert!(matches!(
            patient_age(Some(u32::MAX), None),
            Err(CommandError::Age(AgeError::YearsOutOfRange(_)))
        ));
    }

    #[test]
    fn no_paths_means_no_images() {
        let images = load_images(&IngestArgs::default()).unwrap();
        assert!(images.is_empty());
    }

    #[test]
    fn missing_file_is_read_error() {
        let args = IngestArgs {
            hemogram: Some(PathBuf::from("/nonexistent/hemogram.jpg")),
            ..IngestArgs::default()
        };
        assert!(matches!(load_images(&args), Err(ExtractionError::ReadImage { .. })));
    }

    #[test]
    fn draft_rendering_lists_values_and_indices() {
        let text = render_draft(&draft());
        assert!(text.contains("model mock-vision"));
        assert!(text.contains("ID     Protokol 77"));
        assert!(text.contains("AGE    1y 6m (18 months)"));
        assert!(text.contains("HGB    10.2"));
        assert!(text.contains("PLT    -"));
        assert!(text.contains("NLR    2.00"));
        assert!(text.contains("SII    -"));
    }
}
