//! Annotation reconciliation.
//!
//! # Responsibility
//! - Re-derive each annotation's target and offsets from its `selected_text`
//!   by searching the current canonical text.
//! - Classify every annotation as resolved, ambiguous or not found, and write
//!   only resolved anchors that actually moved.
//!
//! # Invariants
//! - Planning is pure over one corpus snapshot; dry runs and real runs share it.
//! - Stored `(target, from_pos)` is only a tie-break hint, never trusted.
//! - More than one candidate without a usable position is always ambiguous.
//! - Occurrences are overlapping and reported left to right, in character
//!   (Unicode scalar) offsets.
//! - Ambiguous and not-found annotations are never mutated.

use crate::config::ReconcileConfig;
use crate::model::annotation::{AnnotationId, AnnotationTarget, TextAnnotation, UnparsablePosition};
use crate::model::stanza::{Stanza, TranslatedStanza};
use crate::repo::annotation_repo::AnnotationRepository;
use crate::repo::stanza_repo::StanzaRepository;
use crate::repo::RepoResult;
use log::{debug, info, warn};
use std::fmt::{Display, Formatter};

const SELECTION_EXCERPT_CHARS: usize = 50;

/// Text-bearing record searched for selections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBody {
    pub target: AnnotationTarget,
    pub text: String,
}

/// Snapshot of every searchable body in candidate order.
///
/// Stanzas come first, then translations, each in reading order.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    bodies: Vec<TextBody>,
}

impl Corpus {
    /// Builds a corpus from listings that are already in reading order.
    pub fn new(stanzas: &[Stanza], translations: &[TranslatedStanza]) -> Self {
        let bodies = stanzas
            .iter()
            .map(|stanza| TextBody {
                target: AnnotationTarget::Stanza(stanza.id),
                text: stanza.text.clone(),
            })
            .chain(translations.iter().map(|translation| TextBody {
                target: AnnotationTarget::TranslatedStanza(translation.id),
                text: translation.text.clone(),
            }))
            .collect();
        Self { bodies }
    }

    /// Reads the stanza and translation snapshot from the store.
    ///
    /// Matching only needs bodies, so rows with unreadable addresses are
    /// kept (ordered as unaddressed) rather than failing the pass.
    pub fn load<S: StanzaRepository>(repo: &S) -> RepoResult<Self> {
        let stanzas = repo.list_stanzas_lenient()?;
        let translations = repo.list_translations_lenient()?;
        Ok(Self::new(&stanzas, &translations))
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn text_of(&self, target: AnnotationTarget) -> Option<&str> {
        self.bodies
            .iter()
            .find(|body| body.target == target)
            .map(|body| body.text.as_str())
    }

    /// Every occurrence of `needle` across all bodies, in candidate order.
    pub fn find(&self, needle: &str) -> Vec<Candidate> {
        let width = needle.chars().count();
        self.bodies
            .iter()
            .flat_map(|body| {
                find_occurrences(&body.text, needle)
                    .into_iter()
                    .map(move |start| Candidate {
                        target: body.target,
                        start,
                        end: start + width,
                    })
            })
            .collect()
    }
}

/// Character offsets of every occurrence of `needle`, overlapping included.
///
/// Matching is exact; an empty needle has no occurrences.
pub fn find_occurrences(haystack: &str, needle: &str) -> Vec<usize> {
    if needle.is_empty() {
        return Vec::new();
    }
    haystack
        .char_indices()
        .enumerate()
        .filter(|(_, (byte_idx, _))| haystack[*byte_idx..].starts_with(needle))
        .map(|(char_idx, _)| char_idx)
        .collect()
}

/// Renders `text` around the `[start, end)` char span with the match bracketed.
pub fn context_window(text: &str, start: usize, end: usize, context_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let end = end.min(chars.len());
    let start = start.min(end);
    let from = start.saturating_sub(context_chars);
    let to = end.saturating_add(context_chars).min(chars.len());

    let collect = |range: std::ops::Range<usize>| chars[range].iter().collect::<String>();
    format!(
        "{}{}[{}]{}{}",
        if from > 0 { "..." } else { "" },
        collect(from..start),
        collect(start..end),
        collect(end..to),
        if to < chars.len() { "..." } else { "" },
    )
}

/// One occurrence of a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub target: AnnotationTarget,
    pub start: usize,
    pub end: usize,
}

/// How the stored `from_pos` could be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionHint {
    Missing,
    Offset(i64),
    Unparsable(UnparsablePosition),
}

impl PositionHint {
    pub fn from_annotation(annotation: &TextAnnotation) -> Self {
        match annotation.start_offset() {
            Ok(Some(offset)) => Self::Offset(offset),
            Ok(None) => Self::Missing,
            Err(err) => Self::Unparsable(err),
        }
    }

    pub fn offset(&self) -> Option<i64> {
        match self {
            Self::Offset(offset) => Some(*offset),
            Self::Missing | Self::Unparsable(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolved {
    NotFound,
    Ambiguous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A single candidate was chosen. `changed` is false when the stored
    /// anchor already points there.
    Resolved { candidate: Candidate, changed: bool },
    Unresolved(Unresolved),
}

impl Resolution {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Resolved { .. } => "matched",
            Self::Unresolved(Unresolved::Ambiguous) => "ambiguous",
            Self::Unresolved(Unresolved::NotFound) => "not_found",
        }
    }
}

/// Planned outcome for one annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationPlan {
    pub annotation_id: AnnotationId,
    pub selected_text: String,
    pub hint: PositionHint,
    pub candidates: Vec<Candidate>,
    pub resolution: Resolution,
}

impl AnnotationPlan {
    /// Anchor to persist, if any.
    pub fn pending_write(&self) -> Option<Candidate> {
        match self.resolution {
            Resolution::Resolved {
                candidate,
                changed: true,
            } => Some(candidate),
            _ => None,
        }
    }

    /// Context lines for manual review: the chosen match, or every candidate
    /// of an ambiguous selection.
    pub fn context_lines(&self, corpus: &Corpus, context_chars: usize) -> Vec<String> {
        let shown: Vec<Candidate> = match self.resolution {
            Resolution::Resolved { candidate, .. } => vec![candidate],
            Resolution::Unresolved(Unresolved::Ambiguous) => self.candidates.clone(),
            Resolution::Unresolved(Unresolved::NotFound) => Vec::new(),
        };
        shown
            .iter()
            .enumerate()
            .filter_map(|(index, candidate)| {
                let text = corpus.text_of(candidate.target)?;
                Some(format!(
                    "  {}. in {}: {}",
                    index + 1,
                    candidate.target,
                    context_window(text, candidate.start, candidate.end, context_chars)
                ))
            })
            .collect()
    }
}

impl Display for AnnotationPlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.resolution {
            Resolution::Resolved { candidate, changed } => write!(
                f,
                "annotation {}: matched {} at {}..{} ({} candidate{}, {})",
                self.annotation_id,
                candidate.target,
                candidate.start,
                candidate.end,
                self.candidates.len(),
                if self.candidates.len() == 1 { "" } else { "s" },
                if changed { "moved" } else { "unchanged" }
            ),
            Resolution::Unresolved(Unresolved::Ambiguous) => write!(
                f,
                "annotation {}: ambiguous, {} candidates for '{}'",
                self.annotation_id,
                self.candidates.len(),
                excerpt(&self.selected_text)
            ),
            Resolution::Unresolved(Unresolved::NotFound) => write!(
                f,
                "annotation {}: not found '{}'",
                self.annotation_id,
                excerpt(&self.selected_text)
            ),
        }
    }
}

fn excerpt(text: &str) -> String {
    let mut short: String = text.chars().take(SELECTION_EXCERPT_CHARS).collect();
    if text.chars().count() > SELECTION_EXCERPT_CHARS {
        short.push_str("...");
    }
    short
}

/// Classifies one annotation against a corpus snapshot.
pub fn plan_annotation(
    annotation: &TextAnnotation,
    corpus: &Corpus,
    max_tiebreak_distance: u32,
) -> AnnotationPlan {
    let hint = PositionHint::from_annotation(annotation);
    let candidates = corpus.find(&annotation.selected_text);

    let chosen = match candidates.as_slice() {
        [] => None,
        [only] => Some(*only),
        _ => hint
            .offset()
            .and_then(|position| closest_within(&candidates, position, max_tiebreak_distance)),
    };

    let resolution = match chosen {
        Some(candidate) => Resolution::Resolved {
            candidate,
            changed: !annotation.is_anchored_at(
                candidate.target,
                candidate.start as i64,
                candidate.end as i64,
            ),
        },
        None if candidates.is_empty() => Resolution::Unresolved(Unresolved::NotFound),
        None => Resolution::Unresolved(Unresolved::Ambiguous),
    };

    AnnotationPlan {
        annotation_id: annotation.id,
        selected_text: annotation.selected_text.clone(),
        hint,
        candidates,
        resolution,
    }
}

/// Closest candidate to `position`; ties keep the earliest. Accepted only
/// when strictly nearer than `max_distance`.
fn closest_within(candidates: &[Candidate], position: i64, max_distance: u32) -> Option<Candidate> {
    let mut best: Option<(u64, Candidate)> = None;
    for candidate in candidates {
        let distance = (candidate.start as i64).abs_diff(position);
        if best.map_or(true, |(best_distance, _)| distance < best_distance) {
            best = Some((distance, *candidate));
        }
    }
    best.filter(|(distance, _)| *distance < u64::from(max_distance))
        .map(|(_, candidate)| candidate)
}

/// Whether a pass persists resolved anchors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    #[default]
    Apply,
    DryRun,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub total: usize,
    pub matched: usize,
    pub ambiguous: usize,
    pub not_found: usize,
    /// Annotations whose anchor was rewritten (always 0 for dry runs).
    pub written: usize,
    /// Annotations whose stored `from_pos` could not be read as an offset.
    pub unparsable_positions: usize,
}

impl ReconcileSummary {
    fn record(&mut self, plan: &AnnotationPlan) {
        self.total += 1;
        match plan.resolution {
            Resolution::Resolved { .. } => self.matched += 1,
            Resolution::Unresolved(Unresolved::Ambiguous) => self.ambiguous += 1,
            Resolution::Unresolved(Unresolved::NotFound) => self.not_found += 1,
        }
        if matches!(plan.hint, PositionHint::Unparsable(_)) {
            self.unparsable_positions += 1;
        }
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub mode: RunMode,
    pub plans: Vec<AnnotationPlan>,
    pub summary: ReconcileSummary,
    /// Snapshot the pass searched, kept for context rendering.
    pub corpus: Corpus,
}

/// Reconciliation service over the text unit store and annotation store.
pub struct Reconciler<S: StanzaRepository, A: AnnotationRepository> {
    stanzas: S,
    annotations: A,
    config: ReconcileConfig,
}

impl<S: StanzaRepository, A: AnnotationRepository> Reconciler<S, A> {
    pub fn new(stanzas: S, annotations: A, config: ReconcileConfig) -> Self {
        Self {
            stanzas,
            annotations,
            config,
        }
    }

    /// Plans every annotation and, in [`RunMode::Apply`], persists moved anchors
    /// one annotation at a time. Only store failures abort the pass.
    pub fn run(&self, mode: RunMode) -> RepoResult<ReconcileReport> {
        let corpus = Corpus::load(&self.stanzas)?;
        let annotations = self.annotations.list_annotations()?;
        info!(
            "event=reconcile_start module=reconcile status=ok annotations={} bodies={} dry_run={}",
            annotations.len(),
            corpus.len(),
            mode == RunMode::DryRun
        );

        let mut summary = ReconcileSummary::default();
        let mut plans = Vec::with_capacity(annotations.len());
        for annotation in &annotations {
            let plan = plan_annotation(annotation, &corpus, self.config.max_tiebreak_distance);
            log_plan(&plan);
            summary.record(&plan);

            if let (RunMode::Apply, Some(candidate)) = (mode, plan.pending_write()) {
                self.annotations.update_anchor(
                    annotation.id,
                    candidate.target,
                    candidate.start as i64,
                    candidate.end as i64,
                )?;
                summary.written += 1;
            }
            plans.push(plan);
        }

        info!(
            "event=reconcile_finish module=reconcile status=ok total={} matched={} ambiguous={} not_found={} written={}",
            summary.total, summary.matched, summary.ambiguous, summary.not_found, summary.written
        );
        Ok(ReconcileReport {
            mode,
            plans,
            summary,
            corpus,
        })
    }
}

fn log_plan(plan: &AnnotationPlan) {
    if let PositionHint::Unparsable(err) = &plan.hint {
        warn!(
            "event=reconcile_position module=reconcile status=unparsable annotation_id={} detail={}",
            plan.annotation_id, err
        );
    }
    match plan.resolution {
        Resolution::Resolved { candidate, changed } => debug!(
            "event=reconcile_annotation module=reconcile status=matched annotation_id={} target={} start={} changed={}",
            plan.annotation_id, candidate.target, candidate.start, changed
        ),
        Resolution::Unresolved(_) => warn!(
            "event=reconcile_annotation module=reconcile status={} annotation_id={} candidates={}",
            plan.resolution.label(),
            plan.annotation_id,
            plan.candidates.len()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        context_window, find_occurrences, plan_annotation, Corpus, PositionHint, Resolution,
        Unresolved,
    };
    use crate::model::annotation::{AnnotationKind, AnnotationTarget, TextAnnotation};
    use crate::model::stanza::{Stanza, TranslatedStanza};
    use serde_json::json;

    fn stanza(id: i64, text: &str) -> Stanza {
        Stanza {
            id,
            starts: None,
            ends: None,
            text: text.to_string(),
            language: "it".to_string(),
            notes: None,
        }
    }

    fn translation(id: i64, text: &str) -> TranslatedStanza {
        TranslatedStanza {
            id,
            stanza_id: None,
            starts: None,
            text: text.to_string(),
            language: "en".to_string(),
        }
    }

    /// A body holding `needle` at each of `offsets`, padded with `.`.
    fn body_with(needle: &str, offsets: &[usize], len: usize) -> String {
        let mut chars = vec!['.'; len];
        for offset in offsets {
            for (i, ch) in needle.chars().enumerate() {
                chars[offset + i] = ch;
            }
        }
        chars.into_iter().collect()
    }

    fn annotation(selected: &str) -> TextAnnotation {
        TextAnnotation::new(AnnotationTarget::Stanza(1), selected, "n", AnnotationKind::Note)
    }

    #[test]
    fn occurrences_overlap_and_use_char_offsets() {
        assert_eq!(find_occurrences("aaaa", "aa"), vec![0, 1, 2]);
        assert_eq!(find_occurrences("però il mare, il mare", "il mare"), vec![5, 14]);
        assert!(find_occurrences("text", "").is_empty());
        assert_eq!(find_occurrences("al  mare", "  "), vec![2]);
        assert!(find_occurrences("text", " ").is_empty());
        assert!(find_occurrences("The Sea", "the sea").is_empty());
    }

    #[test]
    fn context_window_brackets_match_and_marks_truncation() {
        let text = "0123456789abcdefghij";
        assert_eq!(context_window(text, 10, 12, 3), "...789[ab]cde...");
        assert_eq!(context_window(text, 0, 2, 3), "[01]234...");
        assert_eq!(context_window(text, 18, 20, 40), "0123456789abcdefgh[ij]");
    }

    #[test]
    fn nearby_position_breaks_tie() {
        let corpus = Corpus::new(&[stanza(1, &body_with("the sea", &[118, 530], 600))], &[]);
        let mut subject = annotation("the sea");
        subject.from_pos = Some(json!(118));

        let plan = plan_annotation(&subject, &corpus, 50);
        match plan.resolution {
            Resolution::Resolved { candidate, changed } => {
                assert_eq!(candidate.start, 118);
                assert_eq!(candidate.end, 125);
                assert!(changed);
            }
            other => panic!("expected resolved, got {other:?}"),
        }
        assert_eq!(plan.candidates.len(), 2);
    }

    #[test]
    fn distant_position_is_ambiguous() {
        let corpus = Corpus::new(&[stanza(1, &body_with("the sea", &[400, 700], 800))], &[]);
        let mut subject = annotation("the sea");
        subject.from_pos = Some(json!(118));

        let plan = plan_annotation(&subject, &corpus, 50);
        assert_eq!(plan.resolution, Resolution::Unresolved(Unresolved::Ambiguous));
        assert_eq!(plan.pending_write(), None);
    }

    #[test]
    fn threshold_is_strict_and_ties_keep_earliest() {
        let corpus = Corpus::new(&[stanza(1, &body_with("x", &[100, 200], 300))], &[]);
        let mut subject = annotation("x");

        subject.from_pos = Some(json!(150));
        let plan = plan_annotation(&subject, &corpus, 51);
        assert!(matches!(
            plan.resolution,
            Resolution::Resolved { candidate, .. } if candidate.start == 100
        ));

        let plan = plan_annotation(&subject, &corpus, 50);
        assert_eq!(plan.resolution, Resolution::Unresolved(Unresolved::Ambiguous));
    }

    #[test]
    fn several_candidates_without_position_are_ambiguous() {
        let corpus = Corpus::new(
            &[stanza(1, "onda e onda")],
            &[translation(2, "wave")],
        );
        let plan = plan_annotation(&annotation("onda"), &corpus, 50);
        assert_eq!(plan.hint, PositionHint::Missing);
        assert_eq!(plan.resolution, Resolution::Unresolved(Unresolved::Ambiguous));
    }

    #[test]
    fn unparsable_position_still_matches_single_candidate() {
        let corpus = Corpus::new(&[stanza(1, "nothing")], &[translation(5, "the wave")]);
        let mut subject = annotation("wave");
        subject.from_pos = Some(json!({"line": 3}));

        let plan = plan_annotation(&subject, &corpus, 50);
        assert!(matches!(plan.hint, PositionHint::Unparsable(_)));
        assert!(matches!(
            plan.resolution,
            Resolution::Resolved { candidate, .. }
                if candidate.target == AnnotationTarget::TranslatedStanza(5) && candidate.start == 4
        ));
    }

    #[test]
    fn already_anchored_resolution_needs_no_write() {
        let corpus = Corpus::new(&[stanza(3, "il mare")], &[]);
        let subject = TextAnnotation::new(
            AnnotationTarget::Stanza(3),
            "mare",
            "n",
            AnnotationKind::Note,
        )
        .with_offsets(3, 7);

        let plan = plan_annotation(&subject, &corpus, 50);
        assert!(matches!(plan.resolution, Resolution::Resolved { changed: false, .. }));
        assert_eq!(plan.pending_write(), None);
    }

    #[test]
    fn missing_selection_is_not_found_with_report_line() {
        let corpus = Corpus::new(&[stanza(1, "il mare")], &[]);
        let subject = annotation("la terra");
        let plan = plan_annotation(&subject, &corpus, 50);
        assert_eq!(plan.resolution, Resolution::Unresolved(Unresolved::NotFound));
        assert!(plan.to_string().contains("not found 'la terra'"));
        assert!(plan.context_lines(&corpus, 40).is_empty());
    }

    #[test]
    fn ambiguous_plan_lists_every_candidate_context() {
        let corpus = Corpus::new(&[stanza(1, "sole")], &[translation(2, "sole e sole")]);
        let plan = plan_annotation(&annotation("sole"), &corpus, 50);
        let lines = plan.context_lines(&corpus, 40);
        assert_eq!(
            lines,
            vec![
                "  1. in stanza 1: [sole]".to_string(),
                "  2. in translated_stanza 2: [sole] e sole".to_string(),
                "  3. in translated_stanza 2: sole e [sole]".to_string(),
            ]
        );
    }
}
