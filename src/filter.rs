use crate::models::{Project, ProjectType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Projects whose name contains `search_term` (case-insensitive) and whose
/// classification hits at least one of `active_types`. Empty predicates match
/// everything; source order is kept.
pub fn filter(projects: &[Project], search_term: &str, active_types: &BTreeSet<ProjectType>) -> Vec<Project> {
    let needle = search_term.to_lowercase();
    projects
        .iter()
        .filter(|project| matches_search(project, &needle) && matches_types(project, active_types))
        .cloned()
        .collect()
}

fn matches_search(project: &Project, needle: &str) -> bool {
    needle.is_empty() || project.name.to_lowercase().contains(needle)
}

fn matches_types(project: &Project, active_types: &BTreeSet<ProjectType>) -> bool {
    active_types.is_empty() || project.classification.matches_any(active_types)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    pub search_term: String,
    pub types: BTreeSet<ProjectType>,
}

impl FilterCriteria {
    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
    }

    /// Adds the type when absent, removes it when present.
    pub fn toggle_type(&mut self, kind: ProjectType) {
        if !self.types.remove(&kind) {
            self.types.insert(kind);
        }
    }

    pub fn clear(&mut self) {
        self.search_term.clear();
        self.types.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.search_term.is_empty() && self.types.is_empty()
    }

    pub fn apply(&self, projects: &[Project]) -> Vec<Project> {
        filter(projects, &self.search_term, &self.types)
    }
}

#[cfg(test)]
mod tests {
    use super::{filter, FilterCriteria};
    use crate::models::{Classification, Project, ProjectId, ProjectType};
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn project(id: i64, name: &str, classification: Classification) -> Project {
        Project {
            id: ProjectId(id),
            name: name.to_string(),
            notes: None,
            links: Vec::new(),
            classification,
            completed: false,
            date_added: Utc::now(),
            date_completed: None,
        }
    }

    fn tags(kinds: &[ProjectType]) -> Classification {
        Classification::Tags(kinds.iter().copied().collect())
    }

    fn fixture() -> Vec<Project> {
        vec![
            project(1, "Foo Daily", tags(&[ProjectType::Daily])),
            project(2, "Bar Testnet", tags(&[ProjectType::Testnet, ProjectType::Node])),
            project(3, "Legacy Daily", Classification::Legacy(ProjectType::Daily)),
            project(4, "Bare", Classification::Unclassified),
        ]
    }

    fn ids(projects: &[Project]) -> Vec<i64> {
        projects.iter().map(|project| project.id.0).collect()
    }

    #[test]
    fn empty_predicates_match_everything_in_order() {
        let all = fixture();
        assert_eq!(ids(&filter(&all, "", &BTreeSet::new())), vec![1, 2, 3, 4]);
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let all = fixture();
        assert_eq!(ids(&filter(&all, "DAILY", &BTreeSet::new())), vec![1, 3]);
        assert_eq!(ids(&filter(&all, "ar", &BTreeSet::new())), vec![2, 4]);
        assert!(filter(&all, "zzz", &BTreeSet::new()).is_empty());
    }

    #[test]
    fn type_filter_uses_tags_then_legacy_and_excludes_unclassified() {
        let all = fixture();
        let daily = BTreeSet::from([ProjectType::Daily]);
        assert_eq!(ids(&filter(&all, "", &daily)), vec![1, 3]);

        let any = ProjectType::ALL.into_iter().collect::<BTreeSet<_>>();
        assert_eq!(ids(&filter(&all, "", &any)), vec![1, 2, 3]);
    }

    #[test]
    fn adding_a_type_only_widens_the_match() {
        let all = fixture();
        let daily = BTreeSet::from([ProjectType::Daily]);
        let daily_or_node = BTreeSet::from([ProjectType::Daily, ProjectType::Node]);

        let narrow = filter(&all, "", &daily);
        let wide = filter(&all, "", &daily_or_node);
        assert!(narrow.iter().all(|project| wide.contains(project)));
        assert_eq!(ids(&wide), vec![1, 2, 3]);
    }

    #[test]
    fn filtering_is_idempotent() {
        let all = fixture();
        let types = BTreeSet::from([ProjectType::Daily, ProjectType::Testnet]);
        let once = filter(&all, "a", &types);
        let twice = filter(&once, "a", &types);
        assert_eq!(once, twice);
    }

    #[test]
    fn criteria_toggle_types_on_and_off() {
        let mut criteria = FilterCriteria::default();
        assert!(criteria.is_empty());

        criteria.toggle_type(ProjectType::Retro);
        criteria.set_search_term("foo");
        assert!(criteria.types.contains(&ProjectType::Retro));

        criteria.toggle_type(ProjectType::Retro);
        assert!(criteria.types.is_empty());
        assert_eq!(ids(&criteria.apply(&fixture())), vec![1]);

        criteria.clear();
        assert!(criteria.is_empty());
    }
}
