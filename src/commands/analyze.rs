use std::fmt::Write as _;

use serde_json::json;

use super::{fmt_stat, CommandError};
use crate::config::{env_lookup, StoreSettings};
use crate::pipeline::{
    load_records, summarize, summarize_by_age_band, AgeBandSummary, AnalyzedRecord, MetricSummary,
};

#[derive(clap::Args, Debug, Default)]
pub struct AnalyzeArgs {
    /// Group summaries by pediatric age band
    #[arg(long)]
    pub by_age: bool,

    /// Print JSON instead of tables
    #[arg(long)]
    pub json: bool,
}

pub fn render_summary_table(summaries: &[MetricSummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<11} {:>4} {:>7} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "METRIC", "N", "MISSING", "MEAN", "SD", "MEDIAN", "MIN", "MAX"
    );
    for s in summaries {
        let _ = writeln!(
            out,
            "{:<11} {:>4} {:>7} {:>10} {:>10} {:>10} {:>10} {:>10}",
            s.metric.name(),
            s.n,
            s.missing,
            fmt_stat(s.mean),
            fmt_stat(s.sd),
            fmt_stat(s.median),
            fmt_stat(s.min),
            fmt_stat(s.max),
        );
    }
    out
}

pub fn render_age_bands(bands: &[AgeBandSummary]) -> String {
    let mut out = String::new();
    for band in bands {
        let _ = writeln!(out, "Age band {} ({} records)", band.band.label(), band.records);
        out.push_str(&render_summary_table(&band.metrics));
        out.push('\n');
    }
    out
}

/// Text or JSON report for the loaded records.
pub fn render_report(
    records: &[AnalyzedRecord],
    by_age: bool,
    as_json: bool,
) -> Result<String, CommandError> {
    if as_json {
        let value = if by_age {
            json!({ "records": records.len(), "bands": summarize_by_age_band(records) })
        } else {
            json!({ "records": records.len(), "metrics": summarize(records) })
        };
        return Ok(serde_json::to_string_pretty(&value)?);
    }

    if records.is_empty() {
        return Ok("No records in the sheet.\n".to_string());
    }

    let mut out = format!("{} records\n\n", records.len());
    if by_age {
        out.push_str(&render_age_bands(&summarize_by_age_band(records)));
    } else {
        out.push_str(&render_summary_table(&summarize(records)));
    }
    Ok(out)
}

pub fn run(args: AnalyzeArgs) -> Result<(), CommandError> {
    let settings = StoreSettings::from_lookup(&env_lookup)?;
    let store = settings.open()?;

    let records = load_records(store.as_ref(), settings.schema)?;
    print!("{}", render_report(&records, args.by_age, args.json)?);
    Ok(())
}
