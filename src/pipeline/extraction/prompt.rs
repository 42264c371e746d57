use crate::models::{LabField, ReportKind};

const EXTRACTION_TASK: &str = "\
TASK: You are a meticulous data-entry operator. Read the attached laboratory report \
image(s) row by row and copy the requested results into JSON.";

/// The disambiguation rule. Reports print the measured value next to an
/// unrelated reference interval and the adjacent number is the usual misread.
pub const RESULT_COLUMN_RULE: &str = "\
COLUMN RULE (most important, applies to every value):
1. Find the parameter name in the left-hand column.
2. Move right along the SAME row and take the first number in the RESULT column.
3. NEVER take a number from the REFERENCE RANGE column (for example \"11-15\" or \
\"3.5 - 5.0\"), even when it sits right next to the result or has the same digits.
4. Units and flags (H, L, *, arrows) are not part of the value.";

const OUTPUT_RULES: &str = "\
OUTPUT RULES:
- Output ONLY one flat JSON object, no commentary.
- Use exactly the keys shown below.
- Numbers use a period as decimal separator.
- If a parameter is not on the report, write null. Never write 0 for a missing value.
- If a result is printed with a comparator (for example <5 or >1000), copy it as a \
string exactly as printed.";

fn describe_kind(kind: ReportKind) -> &'static str {
    match kind {
        ReportKind::Hemogram => "hemogram (complete blood count)",
        ReportKind::Biochemistry => "biochemistry panel",
    }
}

fn field_hint(field: LabField) -> &'static str {
    match field {
        LabField::Neut | LabField::Lymph | LabField::Ig => {
            " (absolute count marked #, not the percentage)"
        }
        _ => "",
    }
}

/// Build the instruction sent with the report images, one line per image
/// in attachment order.
pub fn build_extraction_instruction(kinds: &[ReportKind]) -> String {
    let attachments = kinds
        .iter()
        .enumerate()
        .map(|(i, kind)| format!("- Image {}: {}", i + 1, describe_kind(*kind)))
        .collect::<Vec<_>>()
        .join("\n");

    let fields = LabField::ALL
        .iter()
        .map(|field| {
            let names = field
                .report_names()
                .iter()
                .map(|n| format!("\"{n}\""))
                .collect::<Vec<_>>()
                .join(" or ");
            format!(
                "- {key}: row labelled {names}{hint}",
                key = field.key(),
                hint = field_hint(*field),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let template = LabField::ALL
        .iter()
        .map(|field| format!("  \"{}\": number or null", field.key()))
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        "{EXTRACTION_TASK}\n\n\
ATTACHED:\n{attachments}\n\n\
{RESULT_COLUMN_RULE}\n\n\
VALUES TO FIND:\n{fields}\n\n\
IDENTITY:\n- ID: the patient name or protocol number printed at the top left.\n\n\
{OUTPUT_RULES}\n\n\
OUTPUT FORMAT:\n{{\n  \"ID\": \"text or null\",\n{template}\n}}"
    )
}
