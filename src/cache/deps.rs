//! Selection-driven key derivation.
//!
//! Downstream queries declare which selection field their parameters come
//! from. Whenever the selection changes, [`DependencyGraph::derive`] recomputes
//! every downstream key in one pass, so callers always see a consistent set.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::keys::{CacheKey, Endpoint, QueryKey};

/// A user-selectable value that downstream queries depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionField {
    Jurisdiction,
    Meeting,
}

impl SelectionField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jurisdiction => "jurisdiction",
            Self::Meeting => "meeting",
        }
    }
}

impl fmt::Display for SelectionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current jurisdiction and meeting, both optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    jurisdiction: Option<String>,
    meeting: Option<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: SelectionField) -> Option<&str> {
        match field {
            SelectionField::Jurisdiction => self.jurisdiction.as_deref(),
            SelectionField::Meeting => self.meeting.as_deref(),
        }
    }

    pub fn jurisdiction(&self) -> Option<&str> {
        self.get(SelectionField::Jurisdiction)
    }

    pub fn meeting(&self) -> Option<&str> {
        self.get(SelectionField::Meeting)
    }

    /// Set `field`, treating blank values as "nothing selected".
    ///
    /// Returns whether the stored value changed.
    pub fn set(&mut self, field: SelectionField, value: Option<&str>) -> bool {
        let value = value
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let slot = match field {
            SelectionField::Jurisdiction => &mut self.jurisdiction,
            SelectionField::Meeting => &mut self.meeting,
        };
        if *slot == value {
            return false;
        }
        *slot = value;
        true
    }
}

/// What a downstream query becomes when its upstream field is unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhenUnset {
    /// Query the endpoint without the parameter (all records).
    AllRecords,
    /// Do not query at all.
    Idle,
}

/// Static rule: `endpoint`'s `param` comes from selection field `upstream`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub endpoint: Endpoint,
    pub upstream: Option<SelectionField>,
    pub param: &'static str,
    pub when_unset: WhenUnset,
}

impl DependencyEdge {
    /// A query with no upstream; its key never changes.
    pub const fn root(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            upstream: None,
            param: "",
            when_unset: WhenUnset::AllRecords,
        }
    }

    pub const fn param_from(
        endpoint: Endpoint,
        upstream: SelectionField,
        param: &'static str,
        when_unset: WhenUnset,
    ) -> Self {
        Self {
            endpoint,
            upstream: Some(upstream),
            param,
            when_unset,
        }
    }

    fn derive(&self, selection: &Selection) -> QueryKey {
        let base = CacheKey::new(self.endpoint);
        let Some(field) = self.upstream else {
            return base.into();
        };
        match (selection.get(field), self.when_unset) {
            (Some(value), _) => base.with_param(self.param, value).into(),
            (None, WhenUnset::AllRecords) => base.into(),
            (None, WhenUnset::Idle) => QueryKey::Idle(self.endpoint),
        }
    }
}

/// Keys derived from one selection, one per declared endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKeys {
    keys: BTreeMap<Endpoint, QueryKey>,
}

impl DerivedKeys {
    /// Key for `endpoint`; endpoints without an edge are idle.
    pub fn key(&self, endpoint: Endpoint) -> QueryKey {
        self.keys
            .get(&endpoint)
            .cloned()
            .unwrap_or(QueryKey::Idle(endpoint))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Endpoint, &QueryKey)> {
        self.keys.iter().map(|(endpoint, key)| (*endpoint, key))
    }

    /// Endpoints whose key differs from `previous`.
    pub fn changed_since(&self, previous: &DerivedKeys) -> Vec<Endpoint> {
        self.keys
            .iter()
            .filter(|(endpoint, key)| previous.keys.get(*endpoint) != Some(*key))
            .map(|(endpoint, _)| *endpoint)
            .collect()
    }
}

/// The declared set of [`DependencyEdge`]s.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    edges: Vec<DependencyEdge>,
}

impl DependencyGraph {
    pub fn new(edges: Vec<DependencyEdge>) -> Self {
        Self { edges }
    }

    /// Jurisdictions are unconditional, meetings filter by the selected
    /// jurisdiction (or list everything), summaries need a selected meeting.
    pub fn standard() -> Self {
        Self::new(vec![
            DependencyEdge::root(Endpoint::Jurisdictions),
            DependencyEdge::param_from(
                Endpoint::Meetings,
                SelectionField::Jurisdiction,
                "jurisdiction",
                WhenUnset::AllRecords,
            ),
            DependencyEdge::param_from(
                Endpoint::Summaries,
                SelectionField::Meeting,
                "meeting_id",
                WhenUnset::Idle,
            ),
        ])
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn derive(&self, selection: &Selection) -> DerivedKeys {
        DerivedKeys {
            keys: self
                .edges
                .iter()
                .map(|edge| (edge.endpoint, edge.derive(selection)))
                .collect(),
        }
    }

    /// Endpoints whose key depends on `field`.
    pub fn dependents_of(&self, field: SelectionField) -> Vec<Endpoint> {
        self.edges
            .iter()
            .filter(|edge| edge.upstream == Some(field))
            .map(|edge| edge.endpoint)
            .collect()
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(jurisdiction: Option<&str>, meeting: Option<&str>) -> Selection {
        let mut selection = Selection::new();
        selection.set(SelectionField::Jurisdiction, jurisdiction);
        selection.set(SelectionField::Meeting, meeting);
        selection
    }

    #[test]
    fn unset_jurisdiction_lists_all_meetings() {
        let keys = DependencyGraph::standard().derive(&Selection::new());
        assert_eq!(
            keys.key(Endpoint::Meetings),
            QueryKey::Fetch(CacheKey::new(Endpoint::Meetings))
        );
        assert_eq!(
            keys.key(Endpoint::Jurisdictions),
            QueryKey::Fetch(CacheKey::new(Endpoint::Jurisdictions))
        );
    }

    #[test]
    fn unset_meeting_makes_summaries_idle() {
        let keys = DependencyGraph::standard().derive(&selection(Some("Orting"), None));
        assert_eq!(keys.key(Endpoint::Summaries), QueryKey::Idle(Endpoint::Summaries));
    }

    #[test]
    fn selected_values_become_parameters() {
        let keys = DependencyGraph::standard().derive(&selection(Some("Orting"), Some("m1")));
        assert_eq!(
            keys.key(Endpoint::Meetings),
            CacheKey::new(Endpoint::Meetings)
                .with_param("jurisdiction", "Orting")
                .into()
        );
        assert_eq!(
            keys.key(Endpoint::Summaries),
            CacheKey::new(Endpoint::Summaries)
                .with_param("meeting_id", "m1")
                .into()
        );
    }

    #[test]
    fn blank_values_clear_the_selection() {
        let mut selection = selection(Some("Orting"), None);
        assert!(selection.set(SelectionField::Jurisdiction, Some("   ")));
        assert_eq!(selection.jurisdiction(), None);
        assert!(!selection.set(SelectionField::Jurisdiction, None));
    }

    #[test]
    fn setting_same_value_reports_no_change() {
        let mut selection = selection(Some("Orting"), None);
        assert!(!selection.set(SelectionField::Jurisdiction, Some("Orting")));
        assert!(selection.set(SelectionField::Jurisdiction, Some("Tacoma")));
    }

    #[test]
    fn changed_since_reports_only_moved_keys() {
        let graph = DependencyGraph::standard();
        let before = graph.derive(&selection(Some("Orting"), None));
        let after = graph.derive(&selection(Some("Orting"), Some("m1")));
        assert_eq!(after.changed_since(&before), vec![Endpoint::Summaries]);
        assert!(after.changed_since(&after).is_empty());
    }

    #[test]
    fn dependents_follow_declared_edges() {
        let graph = DependencyGraph::standard();
        assert_eq!(
            graph.dependents_of(SelectionField::Jurisdiction),
            vec![Endpoint::Meetings]
        );
        assert_eq!(
            graph.dependents_of(SelectionField::Meeting),
            vec![Endpoint::Summaries]
        );
    }

    #[test]
    fn endpoints_without_edges_are_idle() {
        let graph = DependencyGraph::new(vec![DependencyEdge::root(Endpoint::Jurisdictions)]);
        let keys = graph.derive(&Selection::new());
        assert_eq!(keys.key(Endpoint::Meetings), QueryKey::Idle(Endpoint::Meetings));
        assert_eq!(keys.iter().count(), 1);
    }
}
