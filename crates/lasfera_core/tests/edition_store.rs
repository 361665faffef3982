use lasfera_core::db::open_db_in_memory;
use lasfera_core::{
    AddressBounds, BoundaryPolicy, FolioRepository, LineAddress, LineCode, LineCodeError,
    Manuscript, RepoError, SqliteFolioRepository, SqliteStanzaRepository, StanzaInput,
    StanzaRepository, Upsert,
};

fn code(raw: &str) -> LineCode {
    LineCode::parse(raw).unwrap()
}

fn address(raw: &str) -> LineAddress {
    raw.parse().unwrap()
}

#[test]
fn stanzas_list_in_reading_order_with_unaddressed_last() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStanzaRepository::try_new(&conn).unwrap();

    let late = repo.create_stanza(&StanzaInput::new("late").at(code("01.02.01"))).unwrap();
    let loose = repo.create_stanza(&StanzaInput::new("loose")).unwrap();
    let variant = repo.create_stanza(&StanzaInput::new("variant").at(code("01.01.03a"))).unwrap();
    let base = repo.create_stanza(&StanzaInput::new("base").at(code("01.01.03"))).unwrap();

    let ids: Vec<i64> = repo.list_stanzas().unwrap().iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![base, variant, late, loose]);
}

#[test]
fn upsert_is_keyed_by_starting_code() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStanzaRepository::try_new(&conn).unwrap();

    let first = repo
        .upsert_stanza(&StanzaInput::new("Al nome di Dio").at(code("01.01.01")))
        .unwrap();
    let second = repo
        .upsert_stanza(&StanzaInput::new("Al nome di Dio padre").at(code("01.01.01")))
        .unwrap();

    assert!(first.was_created());
    assert_eq!(second, Upsert::Updated(first.id()));
    let stored = repo.get_stanza(first.id()).unwrap().unwrap();
    assert_eq!(stored.text, "Al nome di Dio padre");
    assert_eq!(repo.list_stanzas().unwrap().len(), 1);

    let err = repo.upsert_stanza(&StanzaInput::new("no address")).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
}

#[test]
fn prefix_and_bounds_filters_select_by_address() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStanzaRepository::try_new(&conn).unwrap();
    for raw in ["01.01.01", "01.01.02", "01.02.01", "02.01.01"] {
        repo.create_stanza(&StanzaInput::new(raw).at(code(raw))).unwrap();
    }

    let book_one = repo.list_stanzas_by_prefix(1, None).unwrap();
    assert_eq!(book_one.len(), 3);
    let stanza_one = repo.list_stanzas_by_prefix(1, Some(1)).unwrap();
    assert_eq!(
        stanza_one.iter().map(|s| s.text.as_str()).collect::<Vec<_>>(),
        vec!["01.01.01", "01.01.02"]
    );

    let bounds = AddressBounds::new(Some(address("01.01.02")), Some(address("02.01.01"))).unwrap();
    let half_open = repo.list_stanzas_in_bounds(&bounds, BoundaryPolicy::HalfOpen).unwrap();
    assert_eq!(half_open.len(), 2);
    let closed = repo.list_stanzas_in_bounds(&bounds, BoundaryPolicy::Closed).unwrap();
    assert_eq!(closed.len(), 3);
}

#[test]
fn address_updates_reject_inverted_pairs() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStanzaRepository::try_new(&conn).unwrap();
    let id = repo.create_stanza(&StanzaInput::new("text").at(code("01.01.05"))).unwrap();

    let err = repo
        .update_stanza_address(id, Some(code("01.01.05")), Some(code("01.01.01")))
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(LineCodeError::RangeInverted { .. })
    ));

    repo.update_stanza_address(id, Some(code("01.01.06")), Some(code("01.01.09")))
        .unwrap();
    let stored = repo.get_stanza(id).unwrap().unwrap();
    assert_eq!(stored.starts, Some(code("01.01.06")));
    assert_eq!(stored.ends, Some(code("01.01.09")));

    let missing = repo.update_stanza_text(999, "x").unwrap_err();
    assert!(matches!(missing, RepoError::NotFound { entity: "stanza", .. }));
}

#[test]
fn translations_are_unique_per_stanza_and_language() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStanzaRepository::try_new(&conn).unwrap();
    let stanza = repo.create_stanza(&StanzaInput::new("Al nome").at(code("01.01.01"))).unwrap();

    let first = repo
        .upsert_translation(stanza, Some(code("01.01.01")), "In the name", "en")
        .unwrap();
    let again = repo
        .upsert_translation(stanza, Some(code("01.01.01")), "In the name of God", "en")
        .unwrap();
    let french = repo
        .upsert_translation(stanza, Some(code("01.01.01")), "Au nom", "fr")
        .unwrap();

    assert_eq!(again, Upsert::Updated(first.id()));
    assert!(french.was_created());
    let translations = repo.list_translations().unwrap();
    assert_eq!(translations.len(), 2);
    assert_eq!(
        repo.get_translation(first.id()).unwrap().unwrap().text,
        "In the name of God"
    );
}

#[test]
fn folios_upsert_by_manuscript_and_label() {
    let conn = open_db_in_memory().unwrap();
    let folios = SqliteFolioRepository::try_new(&conn).unwrap();

    let manuscript = Manuscript {
        siglum: "Urb1".to_string(),
        name: Some("Urbinate latino 752".to_string()),
    };
    assert!(folios.upsert_manuscript(&manuscript).unwrap().was_created());
    assert!(!folios.upsert_manuscript(&manuscript).unwrap().was_created());

    let bounds = AddressBounds::new(Some(address("01.01.01")), None).unwrap();
    let created = folios.upsert_folio("Urb1", "1r", &bounds).unwrap();
    let narrowed = AddressBounds::new(Some(address("01.01.01")), Some(address("01.01.09"))).unwrap();
    let updated = folios.upsert_folio("Urb1", "1r", &narrowed).unwrap();

    assert_eq!(updated, Upsert::Updated(created.id()));
    let folio = folios.find_folio("Urb1", "1r").unwrap().unwrap();
    assert_eq!(folio.bounds(), narrowed);
    assert_eq!(folios.list_folios().unwrap().len(), 1);
}

#[test]
fn membership_is_replaced_not_appended() {
    let conn = open_db_in_memory().unwrap();
    let stanzas = SqliteStanzaRepository::try_new(&conn).unwrap();
    let folios = SqliteFolioRepository::try_new(&conn).unwrap();
    folios
        .upsert_manuscript(&Manuscript {
            siglum: "Urb1".to_string(),
            name: None,
        })
        .unwrap();
    let folio = folios
        .upsert_folio("Urb1", "1r", &AddressBounds::default())
        .unwrap()
        .id();
    let a = stanzas.create_stanza(&StanzaInput::new("a")).unwrap();
    let b = stanzas.create_stanza(&StanzaInput::new("b")).unwrap();

    folios.replace_membership(folio, &[a, b]).unwrap();
    folios.replace_membership(folio, &[b]).unwrap();

    assert_eq!(folios.list_membership(folio).unwrap(), vec![b]);
    assert_eq!(folios.list_folios_for_stanza(a).unwrap().len(), 0);
    assert_eq!(folios.list_folios_for_stanza(b).unwrap()[0].label, "1r");

    let err = folios.replace_membership(404, &[a]).unwrap_err();
    assert!(matches!(err, RepoError::NotFound { entity: "folio", .. }));
}
