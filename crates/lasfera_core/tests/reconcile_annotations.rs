use lasfera_core::config::ReconcileConfig;
use lasfera_core::db::open_db_in_memory;
use lasfera_core::service::reconcile::{PositionHint, Resolution, Unresolved};
use lasfera_core::{
    AnnotationKind, AnnotationRepository, AnnotationTarget, LineCode, Reconciler, RunMode,
    SqliteAnnotationRepository, SqliteStanzaRepository, StanzaInput, StanzaRepository,
    TextAnnotation,
};
use rusqlite::Connection;
use serde_json::{json, Value};

type SqliteReconciler<'conn> =
    Reconciler<SqliteStanzaRepository<'conn>, SqliteAnnotationRepository<'conn>>;

fn reconciler(conn: &Connection) -> SqliteReconciler<'_> {
    Reconciler::new(
        SqliteStanzaRepository::try_new(conn).unwrap(),
        SqliteAnnotationRepository::try_new(conn).unwrap(),
        ReconcileConfig::default(),
    )
}

/// Text of `len` chars holding `needle` at each offset.
fn text_with(needle: &str, offsets: &[usize], len: usize) -> String {
    let mut chars = vec!['~'; len];
    for offset in offsets {
        for (i, ch) in needle.chars().enumerate() {
            chars[offset + i] = ch;
        }
    }
    chars.into_iter().collect()
}

fn add_stanza(conn: &Connection, code: &str, text: &str) -> i64 {
    SqliteStanzaRepository::try_new(conn)
        .unwrap()
        .create_stanza(&StanzaInput::new(text).at(LineCode::parse(code).unwrap()))
        .unwrap()
}

fn add_annotation(
    conn: &Connection,
    target: AnnotationTarget,
    selected: &str,
    from_pos: Option<Value>,
) -> TextAnnotation {
    let mut annotation = TextAnnotation::new(target, selected, "gloss", AnnotationKind::Note);
    annotation.from_pos = from_pos;
    SqliteAnnotationRepository::try_new(conn)
        .unwrap()
        .create_annotation(&annotation)
        .unwrap();
    annotation
}

fn stored(conn: &Connection, annotation: &TextAnnotation) -> TextAnnotation {
    SqliteAnnotationRepository::try_new(conn)
        .unwrap()
        .get_annotation(annotation.id)
        .unwrap()
        .unwrap()
}

#[test]
fn stale_offset_near_one_occurrence_resolves_to_it() {
    let conn = open_db_in_memory().unwrap();
    let stanza = add_stanza(&conn, "01.01.01", &text_with("the sea", &[118, 530], 600));
    let annotation = add_annotation(
        &conn,
        AnnotationTarget::Stanza(99),
        "the sea",
        Some(json!(118)),
    );

    let report = reconciler(&conn).run(RunMode::Apply).unwrap();

    assert_eq!(report.summary.matched, 1);
    assert_eq!(report.summary.written, 1);
    let after = stored(&conn, &annotation);
    assert_eq!(after.target, AnnotationTarget::Stanza(stanza));
    assert_eq!(after.from_pos, Some(json!(118)));
    assert_eq!(after.to_pos, Some(json!(125)));
    assert_eq!(after.selected_text, "the sea");
}

#[test]
fn stale_offset_far_from_every_occurrence_is_ambiguous_and_untouched() {
    let conn = open_db_in_memory().unwrap();
    add_stanza(&conn, "01.01.01", &text_with("the sea", &[400, 700], 800));
    let annotation = add_annotation(
        &conn,
        AnnotationTarget::Stanza(99),
        "the sea",
        Some(json!(118)),
    );

    let report = reconciler(&conn).run(RunMode::Apply).unwrap();

    assert_eq!(report.summary.ambiguous, 1);
    assert_eq!(report.summary.written, 0);
    assert_eq!(
        report.plans[0].resolution,
        Resolution::Unresolved(Unresolved::Ambiguous)
    );
    assert_eq!(stored(&conn, &annotation), annotation);
}

#[test]
fn disambiguation_threshold_applies_to_closest_candidate() {
    let conn = open_db_in_memory().unwrap();
    add_stanza(&conn, "01.01.01", &text_with("onda", &[100, 200], 300));
    let near = add_annotation(&conn, AnnotationTarget::Stanza(1), "onda", Some(json!(120)));
    let far = add_annotation(&conn, AnnotationTarget::Stanza(1), "onda", Some(json!("400")));

    reconciler(&conn).run(RunMode::Apply).unwrap();

    assert_eq!(stored(&conn, &near).from_pos, Some(json!(100)));
    assert_eq!(stored(&conn, &far), far);
}

#[test]
fn second_run_reconfirms_without_writing() {
    let conn = open_db_in_memory().unwrap();
    add_stanza(&conn, "01.01.01", "Al nome di Dio e della Vergine");
    add_stanza(&conn, "01.01.02", "il mare e il mare");
    add_annotation(&conn, AnnotationTarget::Stanza(7), "Vergine", None);
    add_annotation(&conn, AnnotationTarget::Stanza(7), "il mare", Some(json!(0)));
    add_annotation(&conn, AnnotationTarget::Stanza(7), "la terra", None);

    let service = reconciler(&conn);
    let first = service.run(RunMode::Apply).unwrap();
    let second = service.run(RunMode::Apply).unwrap();

    assert_eq!(first.summary.written, 2);
    assert_eq!(second.summary.written, 0);
    let classify = |report: &lasfera_core::service::reconcile::ReconcileReport| {
        report
            .plans
            .iter()
            .map(|plan| (plan.annotation_id, plan.resolution.label()))
            .collect::<Vec<_>>()
    };
    assert_eq!(classify(&first), classify(&second));
    assert_eq!(second.summary.matched, 2);
    assert_eq!(second.summary.not_found, 1);
}

#[test]
fn dry_run_classifies_identically_and_writes_nothing() {
    let conn = open_db_in_memory().unwrap();
    add_stanza(&conn, "01.01.01", "Al nome di Dio");
    let annotation = add_annotation(&conn, AnnotationTarget::Stanza(42), "nome", None);

    let service = reconciler(&conn);
    let dry = service.run(RunMode::DryRun).unwrap();
    assert_eq!(dry.summary.written, 0);
    assert_eq!(stored(&conn, &annotation), annotation);

    let real = service.run(RunMode::Apply).unwrap();
    assert_eq!(dry.plans, real.plans);
    assert_eq!(real.summary.written, 1);
}

#[test]
fn translated_stanzas_are_searched_after_stanzas() {
    let conn = open_db_in_memory().unwrap();
    let stanza = add_stanza(&conn, "01.01.01", "Al nome di Dio");
    let translation = SqliteStanzaRepository::try_new(&conn)
        .unwrap()
        .upsert_translation(stanza, LineCode::parse("01.01.01").ok(), "In the name of God", "en")
        .unwrap()
        .id();
    let annotation = add_annotation(&conn, AnnotationTarget::Stanza(stanza), "name of God", None);

    reconciler(&conn).run(RunMode::Apply).unwrap();

    let after = stored(&conn, &annotation);
    assert_eq!(after.target, AnnotationTarget::TranslatedStanza(translation));
    assert_eq!(after.from_pos, Some(json!(7)));
    assert_eq!(after.to_pos, Some(json!(18)));
}

#[test]
fn unparsable_position_is_counted_but_does_not_block_matching() {
    let conn = open_db_in_memory().unwrap();
    add_stanza(&conn, "01.01.01", "Al nome di Dio");
    let annotation = add_annotation(
        &conn,
        AnnotationTarget::Stanza(1),
        "Dio",
        Some(json!({"path": [0, 3], "offset": 11})),
    );

    let report = reconciler(&conn).run(RunMode::Apply).unwrap();

    assert!(matches!(report.plans[0].hint, PositionHint::Unparsable(_)));
    assert_eq!(report.summary.unparsable_positions, 1);
    assert_eq!(stored(&conn, &annotation).from_pos, Some(json!(11)));
}

#[test]
fn report_lines_and_context_cover_every_annotation() {
    let conn = open_db_in_memory().unwrap();
    add_stanza(&conn, "01.01.01", "sole e luna, sole e stelle");
    add_annotation(&conn, AnnotationTarget::Stanza(1), "sole", None);

    let report = reconciler(&conn).run(RunMode::DryRun).unwrap();
    let plan = &report.plans[0];

    assert!(plan.to_string().contains("ambiguous, 2 candidates for 'sole'"));
    let contexts = plan.context_lines(&report.corpus, 40);
    assert_eq!(contexts.len(), 2);
    assert!(contexts[1].ends_with("sole e luna, [sole] e stelle"));
}

#[test]
fn stanza_with_unreadable_stored_address_stays_searchable() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO stanzas (line_code_starts, text) VALUES ('1.1.2', 'e il mare oceano');",
        [],
    )
    .unwrap();
    let legacy = conn.last_insert_rowid();
    add_stanza(&conn, "01.01.01", "Al nome di Dio");
    let annotation = add_annotation(&conn, AnnotationTarget::Stanza(404), "mare oceano", None);
    let untouched = add_annotation(&conn, AnnotationTarget::Stanza(404), "Dio", None);

    let report = reconciler(&conn).run(RunMode::Apply).unwrap();

    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.matched, 2);
    assert_eq!(stored(&conn, &annotation).target, AnnotationTarget::Stanza(legacy));
    assert_eq!(stored(&conn, &annotation).from_pos, Some(json!(5)));
    assert_ne!(stored(&conn, &untouched).target, AnnotationTarget::Stanza(legacy));

    // Address-driven reads still reject the row.
    assert!(SqliteStanzaRepository::try_new(&conn)
        .unwrap()
        .list_stanzas()
        .is_err());
}
