//! Book/stanza outline of the edition, as used by the reading view index.

use crate::model::stanza::Stanza;
use crate::repo::stanza_repo::StanzaRepository;
use crate::repo::RepoResult;
use std::collections::BTreeMap;

/// `book -> stanza number -> stanzas`, each leaf in reading order.
pub type EditionOutline = BTreeMap<u8, BTreeMap<u8, Vec<Stanza>>>;

/// Groups addressed stanzas by book and stanza number. Unaddressed stanzas
/// are left out.
pub fn outline(stanzas: &[Stanza]) -> EditionOutline {
    let mut sorted: Vec<&Stanza> = stanzas.iter().filter(|s| s.starts.is_some()).collect();
    sorted.sort_by_key(|stanza| (stanza.starts.map(|code| code.sort_key()), stanza.id));

    let mut grouped = EditionOutline::new();
    for stanza in sorted {
        let Some(code) = stanza.starts else { continue };
        grouped
            .entry(code.book())
            .or_default()
            .entry(code.start().stanza)
            .or_default()
            .push(stanza.clone());
    }
    grouped
}

pub fn load_outline<S: StanzaRepository>(repo: &S) -> RepoResult<EditionOutline> {
    Ok(outline(&repo.list_stanzas()?))
}

#[cfg(test)]
mod tests {
    use super::outline;
    use crate::model::line_code::LineCode;
    use crate::model::stanza::Stanza;

    fn stanza(id: i64, code: Option<&str>) -> Stanza {
        Stanza {
            id,
            starts: code.map(|raw| LineCode::parse(raw).unwrap()),
            ends: None,
            text: format!("stanza {id}"),
            language: "it".to_string(),
            notes: None,
        }
    }

    #[test]
    fn groups_by_book_and_stanza_in_reading_order() {
        let grouped = outline(&[
            stanza(1, Some("02.01.01")),
            stanza(2, Some("01.02.01")),
            stanza(3, Some("01.01.09")),
            stanza(4, None),
            stanza(5, Some("01.01.01")),
        ]);

        assert_eq!(grouped.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        let book_one = &grouped[&1];
        assert_eq!(book_one.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        let ids: Vec<i64> = book_one[&1].iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![5, 3]);
        assert_eq!(grouped.values().flat_map(|b| b.values()).flatten().count(), 4);
    }
}
