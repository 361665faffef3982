use lasfera_core::db::open_db_in_memory;
use lasfera_core::service::annotation_service::{
    AnnotationService, AnnotationServiceError, CreateAnnotationRequest,
};
use lasfera_core::service::outline::load_outline;
use lasfera_core::service::stanza_import::{
    StanzaImportError, StanzaImportRow, StanzaImporter, TranslationImportRow,
};
use lasfera_core::{
    AnnotationTarget, LineCode, LineCodeError, SqliteAnnotationRepository, SqliteStanzaRepository,
    StanzaRepository,
};
use serde_json::json;

fn stanza_row(code: &str, text: &str) -> StanzaImportRow {
    StanzaImportRow {
        line_code: code.to_string(),
        text: text.to_string(),
        ..StanzaImportRow::default()
    }
}

fn translation_row(code: &str, text: &str) -> TranslationImportRow {
    TranslationImportRow {
        line_code: code.to_string(),
        translated_text: text.to_string(),
        language: None,
    }
}

#[test]
fn stanza_rows_upsert_and_bad_rows_do_not_stop_the_batch() {
    let conn = open_db_in_memory().unwrap();
    let importer = StanzaImporter::new(SqliteStanzaRepository::try_new(&conn).unwrap());

    let report = importer
        .import_stanzas(&[
            stanza_row("01.01.01", "Al nome di Dio"),
            stanza_row("01.01.02a-01.01.04", "bad"),
            stanza_row(" 01.01.02 ", "e della Vergine"),
            stanza_row("01.01.01", "Al nome di Dio padre"),
        ])
        .unwrap();

    assert_eq!(report.succeeded(), 3);
    assert!(matches!(
        report.rows[1],
        Err(StanzaImportError::LineCode(LineCodeError::VariantWithRange(_)))
    ));
    let first = report.rows[0].as_ref().unwrap();
    let last = report.rows[3].as_ref().unwrap();
    assert!(first.created);
    assert!(!last.created);
    assert_eq!(first.stanza_id, last.stanza_id);

    let repo = SqliteStanzaRepository::try_new(&conn).unwrap();
    let stanzas = repo.list_stanzas().unwrap();
    assert_eq!(stanzas.len(), 2);
    assert_eq!(stanzas[0].text, "Al nome di Dio padre");
    assert_eq!(stanzas[0].language, "it");
}

#[test]
fn translations_attach_to_base_stanza_or_report_unknown_target() {
    let conn = open_db_in_memory().unwrap();
    let importer = StanzaImporter::new(SqliteStanzaRepository::try_new(&conn).unwrap());
    importer
        .import_stanzas(&[stanza_row("01.01.01", "Al nome di Dio")])
        .unwrap();

    let report = importer
        .import_translations(&[
            translation_row("01.01.01", "In the name of God"),
            translation_row("09.09.09", "orphan"),
            translation_row("", "no code"),
            translation_row("01.01.01", "In the name of God the Father"),
        ])
        .unwrap();

    assert_eq!(report.succeeded(), 2);
    assert!(matches!(
        &report.rows[1],
        Err(StanzaImportError::UnknownTarget(code)) if code == "09.09.09"
    ));
    assert!(matches!(
        report.rows[2],
        Err(StanzaImportError::MissingField("line_code"))
    ));

    let translations = SqliteStanzaRepository::try_new(&conn)
        .unwrap()
        .list_translations()
        .unwrap();
    assert_eq!(translations.len(), 1);
    assert_eq!(translations[0].text, "In the name of God the Father");
    assert_eq!(translations[0].language, "en");
    assert_eq!(translations[0].starts, LineCode::parse("01.01.01").ok());
}

#[test]
fn outline_groups_imported_stanzas() {
    let conn = open_db_in_memory().unwrap();
    let importer = StanzaImporter::new(SqliteStanzaRepository::try_new(&conn).unwrap());
    importer
        .import_stanzas(&[
            stanza_row("02.01.01", "c"),
            stanza_row("01.01.01", "a"),
            stanza_row("01.02.01", "b"),
        ])
        .unwrap();

    let outline = load_outline(&SqliteStanzaRepository::try_new(&conn).unwrap()).unwrap();
    assert_eq!(outline.len(), 2);
    assert_eq!(outline[&1].len(), 2);
    assert_eq!(outline[&2][&1][0].text, "c");
}

#[test]
fn annotation_requests_need_an_existing_target() {
    let conn = open_db_in_memory().unwrap();
    let stanzas = SqliteStanzaRepository::try_new(&conn).unwrap();
    let importer = StanzaImporter::new(SqliteStanzaRepository::try_new(&conn).unwrap());
    let outcome = importer
        .import_stanza(&stanza_row("01.01.01", "Al nome di Dio"))
        .unwrap();

    let service = AnnotationService::new(
        stanzas,
        SqliteAnnotationRepository::try_new(&conn).unwrap(),
    );
    let request = |target_id: i64| -> CreateAnnotationRequest {
        serde_json::from_value(json!({
            "target_id": target_id,
            "selected_text": "Dio",
            "annotation_body": "Invocation formula.",
            "annotation_kind": "note",
            "from_pos": 11,
            "to_pos": 14
        }))
        .unwrap()
    };

    let created = service.create(request(outcome.stanza_id)).unwrap();
    let listed = service
        .list_for_target(AnnotationTarget::Stanza(outcome.stanza_id))
        .unwrap();
    assert_eq!(listed, vec![created.clone()]);
    assert_eq!(service.get(created.id).unwrap(), Some(created));

    let err = service.create(request(404)).unwrap_err();
    assert!(matches!(
        err,
        AnnotationServiceError::UnknownTarget(AnnotationTarget::Stanza(404))
    ));
    assert!(err.is_client_error());

    let mut translated = request(outcome.stanza_id);
    translated.target_kind = Some("translated_stanza".to_string());
    assert!(matches!(
        service.create(translated),
        Err(AnnotationServiceError::UnknownTarget(AnnotationTarget::TranslatedStanza(_)))
    ));
}
