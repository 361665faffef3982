//! Folio range resolution.
//!
//! # Responsibility
//! - Derive which stanzas a folio carries from the folio's address bounds.
//! - Persist the derived membership, replacing whatever was stored.
//!
//! # Invariants
//! - Default bounds are half-open `[start, end)`, so two adjacent folios
//!   never both claim the stanza at their shared boundary.
//! - A folio without bounds has no members; membership is never guessed
//!   from ordinal position.
//! - Stanzas without an address never join a folio.
//! - Output is in reading order; re-running yields the same set.

use crate::model::folio::{Folio, FolioId};
use crate::model::line_code::{AddressBounds, BoundaryPolicy};
use crate::model::stanza::{Stanza, StanzaId};
use crate::repo::folio_repo::FolioRepository;
use crate::repo::stanza_repo::StanzaRepository;
use crate::repo::RepoError;
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Computes folio membership over an in-memory stanza snapshot.
pub fn resolve_membership(
    bounds: &AddressBounds,
    stanzas: &[Stanza],
    policy: BoundaryPolicy,
) -> Vec<StanzaId> {
    if bounds.is_unbounded() {
        return Vec::new();
    }

    let mut members: Vec<&Stanza> = stanzas
        .iter()
        .filter(|stanza| {
            stanza
                .starts
                .is_some_and(|code| bounds.contains(code.start(), policy))
        })
        .collect();
    members.sort_by(|a, b| {
        let key_a = a.starts.map(|code| code.sort_key());
        let key_b = b.starts.map(|code| code.sort_key());
        key_a.cmp(&key_b).then(a.id.cmp(&b.id))
    });
    members.into_iter().map(|stanza| stanza.id).collect()
}

#[derive(Debug)]
pub enum RangeResolveError {
    FolioNotFound(FolioId),
    Repo(RepoError),
}

impl Display for RangeResolveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FolioNotFound(id) => write!(f, "folio not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RangeResolveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::FolioNotFound(_) => None,
        }
    }
}

impl From<RepoError> for RangeResolveError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Membership computed and stored for one folio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolioResolution {
    pub folio_id: FolioId,
    pub manuscript: String,
    pub label: String,
    /// Member stanza ids in reading order.
    pub members: Vec<StanzaId>,
}

/// Per-folio slot of [`RangeResolver::resolve_all`].
pub type FolioOutcome = Result<FolioResolution, RangeResolveError>;

/// Range resolution service over the text unit store and folio store.
pub struct RangeResolver<S: StanzaRepository, F: FolioRepository> {
    stanzas: S,
    folios: F,
    policy: BoundaryPolicy,
}

impl<S: StanzaRepository, F: FolioRepository> RangeResolver<S, F> {
    pub fn new(stanzas: S, folios: F, policy: BoundaryPolicy) -> Self {
        Self {
            stanzas,
            folios,
            policy,
        }
    }

    pub fn stanzas(&self) -> &S {
        &self.stanzas
    }

    pub fn folios(&self) -> &F {
        &self.folios
    }

    /// Members `bounds` would have against the current store, without writing.
    pub fn membership_for(
        &self,
        bounds: &AddressBounds,
    ) -> Result<Vec<StanzaId>, RangeResolveError> {
        let stanzas = self.stanzas.list_stanzas()?;
        Ok(resolve_membership(bounds, &stanzas, self.policy))
    }

    /// Recomputes and replaces the membership of one folio.
    pub fn resolve_folio(&self, folio_id: FolioId) -> Result<FolioResolution, RangeResolveError> {
        let folio = self
            .folios
            .get_folio(folio_id)?
            .ok_or(RangeResolveError::FolioNotFound(folio_id))?;
        let stanzas = self.stanzas.list_stanzas()?;
        Ok(self.apply(&folio, &stanzas)?)
    }

    /// Recomputes every folio against one stanza snapshot.
    ///
    /// Used after bulk address or text rewrites. A folio whose update is
    /// rejected is reported in its slot and the pass continues. Store
    /// failures abort the pass; folios already done keep their new membership.
    pub fn resolve_all(&self) -> Result<Vec<FolioOutcome>, RangeResolveError> {
        let stanzas = self.stanzas.list_stanzas()?;
        let folios = self.folios.list_folios()?;
        let mut outcomes = Vec::with_capacity(folios.len());
        let mut failed = 0usize;
        for folio in &folios {
            match self.apply(folio, &stanzas) {
                Ok(resolution) => outcomes.push(Ok(resolution)),
                Err(RepoError::Db(err)) => {
                    warn!(
                        "event=resolve_all module=range_resolver status=aborted folio_id={} error={}",
                        folio.id, err
                    );
                    return Err(RangeResolveError::Repo(RepoError::Db(err)));
                }
                Err(err) => {
                    failed += 1;
                    warn!(
                        "event=resolve_folio module=range_resolver status=error folio_id={} error={}",
                        folio.id, err
                    );
                    outcomes.push(Err(err.into()));
                }
            }
        }
        info!(
            "event=resolve_all module=range_resolver status=ok folios={} failed={} stanzas={}",
            outcomes.len(),
            failed,
            stanzas.len()
        );
        Ok(outcomes)
    }

    fn apply(&self, folio: &Folio, stanzas: &[Stanza]) -> Result<FolioResolution, RepoError> {
        let members = resolve_membership(&folio.bounds(), stanzas, self.policy);
        self.folios.replace_membership(folio.id, &members)?;
        debug!(
            "event=resolve_folio module=range_resolver status=ok folio_id={} members={}",
            folio.id,
            members.len()
        );
        Ok(FolioResolution {
            folio_id: folio.id,
            manuscript: folio.manuscript.clone(),
            label: folio.label.clone(),
            members,
        })
    }
}
