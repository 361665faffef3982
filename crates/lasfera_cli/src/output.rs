//! Line formatting for batch command output.
//!
//! Every processed item gets one line, followed by a tally. Formatting is
//! kept apart from printing so it can be tested.
//!
//! ```text
//! row 1: Urb1 1r created, 4 stanzas
//! row 2: skipped: unknown manuscript `Nowhere`
//! Folios: 1 imported, 1 skipped
//! ```

use lasfera_core::service::folio_import::FolioImportReport;
use lasfera_core::service::outline::EditionOutline;
use lasfera_core::service::range_resolver::FolioOutcome;
use lasfera_core::service::reconcile::{ReconcileReport, RunMode};
use lasfera_core::service::stanza_import::{
    ImportReport, StanzaImportOutcome, TranslationImportOutcome,
};

fn created_label(created: bool) -> &'static str {
    if created {
        "created"
    } else {
        "updated"
    }
}

fn row_lines<T>(
    rows: &[Result<T, impl std::fmt::Display>],
    describe: impl Fn(&T) -> String,
) -> Vec<String> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| match row {
            Ok(outcome) => format!("row {}: {}", index + 1, describe(outcome)),
            Err(err) => format!("row {}: skipped: {err}", index + 1),
        })
        .collect()
}

pub fn format_folio_import(report: &FolioImportReport) -> Vec<String> {
    let mut lines = row_lines(&report.rows, |outcome| {
        format!(
            "{} {} {}, {} stanzas",
            outcome.manuscript,
            outcome.label,
            created_label(outcome.created),
            outcome.members.len()
        )
    });
    lines.push(format!(
        "Folios: {} imported, {} skipped",
        report.succeeded(),
        report.failed()
    ));
    lines
}

pub fn format_stanza_import(report: &ImportReport<StanzaImportOutcome>) -> Vec<String> {
    let mut lines = row_lines(&report.rows, |outcome| {
        format!(
            "stanza {} {} (id {})",
            outcome.line_code,
            created_label(outcome.created),
            outcome.stanza_id
        )
    });
    lines.push(format!(
        "Stanzas: {} imported, {} skipped",
        report.succeeded(),
        report.failed()
    ));
    lines
}

pub fn format_translation_import(report: &ImportReport<TranslationImportOutcome>) -> Vec<String> {
    let mut lines = row_lines(&report.rows, |outcome| {
        format!(
            "translation of {} {} (id {}, stanza {})",
            outcome.line_code,
            created_label(outcome.created),
            outcome.translation_id,
            outcome.stanza_id
        )
    });
    lines.push(format!(
        "Translations: {} imported, {} skipped",
        report.succeeded(),
        report.failed()
    ));
    lines
}

pub fn format_resolution(outcomes: &[FolioOutcome]) -> Vec<String> {
    let mut failed = 0;
    let mut lines: Vec<String> = outcomes
        .iter()
        .map(|outcome| match outcome {
            Ok(resolution) => format!(
                "{} {}: {} stanzas",
                resolution.manuscript,
                resolution.label,
                resolution.members.len()
            ),
            Err(err) => {
                failed += 1;
                format!("failed: {err}")
            }
        })
        .collect();
    lines.push(format!(
        "Folios: {} resolved, {} failed",
        outcomes.len() - failed,
        failed
    ));
    lines
}

/// Per-annotation lines, optional context, then the summary.
pub fn format_reconcile(
    report: &ReconcileReport,
    show_text: bool,
    context_chars: usize,
) -> Vec<String> {
    let mut lines = Vec::new();
    for plan in &report.plans {
        lines.push(plan.to_string());
        if show_text {
            lines.extend(plan.context_lines(&report.corpus, context_chars));
        }
    }

    let summary = &report.summary;
    lines.push(String::new());
    lines.push("Summary:".to_string());
    lines.push(format!("Total annotations processed: {}", summary.total));
    lines.push(format!("Successfully matched: {}", summary.matched));
    lines.push(format!("Ambiguous (multiple matches): {}", summary.ambiguous));
    lines.push(format!("No matches found: {}", summary.not_found));
    if summary.unparsable_positions > 0 {
        lines.push(format!(
            "Unparsable stored positions: {}",
            summary.unparsable_positions
        ));
    }
    match report.mode {
        RunMode::Apply => lines.push(format!("Annotations updated: {}", summary.written)),
        RunMode::DryRun => lines.push("Dry run: no changes were made".to_string()),
    }
    lines
}

pub fn format_outline(outline: &EditionOutline) -> Vec<String> {
    let mut lines = Vec::new();
    for (book, stanzas) in outline {
        lines.push(format!("Book {book:02}"));
        for (stanza, units) in stanzas {
            let first = units
                .first()
                .map(|unit| unit.text.lines().next().unwrap_or_default())
                .unwrap_or_default();
            lines.push(format!(
                "    {book:02}.{stanza:02} ({} units) {first}",
                units.len()
            ));
        }
    }
    lines
}

pub fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}
