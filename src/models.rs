use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub i64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectType {
    Daily,
    Testnet,
    Retro,
    Node,
    Depin,
    Other,
}

impl ProjectType {
    pub const ALL: [ProjectType; 6] = [
        Self::Daily,
        Self::Testnet,
        Self::Retro,
        Self::Node,
        Self::Depin,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Testnet => "testnet",
            Self::Retro => "retro",
            Self::Node => "node",
            Self::Depin => "depin",
            Self::Other => "other",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Daily => "Daily Tasks",
            Self::Testnet => "Testnet",
            Self::Retro => "Retroactive",
            Self::Node => "Node",
            Self::Depin => "DePIN",
            Self::Other => "Other",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }
}

/// Category tags of a project. The tag set wins over the legacy singular
/// `type` whenever it is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Classification {
    Tags(BTreeSet<ProjectType>),
    Legacy(ProjectType),
    #[default]
    Unclassified,
}

impl Classification {
    pub fn from_parts(types: Option<BTreeSet<ProjectType>>, legacy: Option<ProjectType>) -> Self {
        match (types, legacy) {
            (Some(types), _) if !types.is_empty() => Self::Tags(types),
            (_, Some(legacy)) => Self::Legacy(legacy),
            _ => Self::Unclassified,
        }
    }

    pub fn from_tags(types: BTreeSet<ProjectType>) -> Self {
        Self::from_parts(Some(types), None)
    }

    pub fn matches_any(&self, wanted: &BTreeSet<ProjectType>) -> bool {
        match self {
            Self::Tags(types) => !types.is_disjoint(wanted),
            Self::Legacy(legacy) => wanted.contains(legacy),
            Self::Unclassified => false,
        }
    }

    pub fn types(&self) -> BTreeSet<ProjectType> {
        match self {
            Self::Tags(types) => types.clone(),
            Self::Legacy(legacy) => BTreeSet::from([*legacy]),
            Self::Unclassified => BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub name: String,
    pub url: String,
}

impl Link {
    pub fn new(name: &str, url: &str) -> AppResult<Self> {
        let name = name.trim();
        let url = url.trim();
        if name.is_empty() || url.is_empty() {
            return Err(AppError::Validation("Link name and URL are required".to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            url: normalize_url(url),
        })
    }

    pub fn validate(&self) -> AppResult<()> {
        Self::new(&self.name, &self.url).map(|_| ())
    }

    fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            url: normalize_url(&self.url),
        }
    }
}

pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ProjectWire", into = "ProjectWire")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub notes: Option<String>,
    pub links: Vec<Link>,
    pub classification: Classification,
    pub completed: bool,
    pub date_added: DateTime<Utc>,
    pub date_completed: Option<DateTime<Utc>>,
}

impl Project {
    pub fn from_draft(id: ProjectId, draft: ProjectDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: draft.name.trim().to_string(),
            notes: non_blank(draft.notes),
            links: draft.links.into_iter().map(Link::normalized).collect(),
            classification: Classification::from_tags(draft.types),
            completed: false,
            date_added: now,
            date_completed: None,
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        validate_name(&self.name)?;
        validate_links(&self.links)
    }

    pub fn apply_patch(&self, patch: ProjectPatch) -> Self {
        let mut next = self.clone();
        if let Some(name) = patch.name {
            next.name = name.trim().to_string();
        }
        if let Some(notes) = patch.notes {
            next.notes = non_blank(notes);
        }
        if let Some(links) = patch.links {
            next.links = links.into_iter().map(Link::normalized).collect();
        }
        if let Some(types) = patch.types {
            next.classification = Classification::from_tags(types);
        }
        next
    }

    pub fn marked_completed(&self, now: DateTime<Utc>) -> Self {
        Self {
            completed: true,
            date_completed: Some(now),
            ..self.clone()
        }
    }

    pub fn marked_active(&self) -> Self {
        Self {
            completed: false,
            date_completed: None,
            ..self.clone()
        }
    }
}

/// JSON shape shared with the record store: `types` array plus the legacy
/// singular `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectWire {
    id: ProjectId,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
    #[serde(default)]
    links: Vec<Link>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    types: Option<BTreeSet<ProjectType>>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    legacy_type: Option<ProjectType>,
    #[serde(default)]
    completed: bool,
    date_added: DateTime<Utc>,
    #[serde(default)]
    date_completed: Option<DateTime<Utc>>,
}

impl From<ProjectWire> for Project {
    fn from(wire: ProjectWire) -> Self {
        Self {
            id: wire.id,
            name: wire.name,
            notes: wire.notes,
            links: wire.links.into_iter().map(Link::normalized).collect(),
            classification: Classification::from_parts(wire.types, wire.legacy_type),
            completed: wire.completed,
            date_added: wire.date_added,
            date_completed: wire.date_completed,
        }
    }
}

impl From<Project> for ProjectWire {
    fn from(project: Project) -> Self {
        let (types, legacy_type) = match project.classification {
            Classification::Tags(types) => (Some(types), None),
            Classification::Legacy(legacy) => (None, Some(legacy)),
            Classification::Unclassified => (None, None),
        };
        Self {
            id: project.id,
            name: project.name,
            notes: project.notes,
            links: project.links,
            types,
            legacy_type,
            completed: project.completed,
            date_added: project.date_added,
            date_completed: project.date_completed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDraft {
    pub name: String,
    pub notes: Option<String>,
    pub links: Vec<Link>,
    pub types: BTreeSet<ProjectType>,
}

impl ProjectDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_types(mut self, types: impl IntoIterator<Item = ProjectType>) -> Self {
        self.types = types.into_iter().collect();
        self
    }

    pub fn add_link(&mut self, name: &str, url: &str) -> AppResult<&Link> {
        let link = Link::new(name, url)?;
        self.links.push(link);
        Ok(&self.links[self.links.len() - 1])
    }

    pub fn remove_link(&mut self, index: usize) -> Option<Link> {
        (index < self.links.len()).then(|| self.links.remove(index))
    }

    pub fn validate(&self) -> AppResult<()> {
        validate_name(&self.name)?;
        validate_links(&self.links)
    }
}

/// Partial edit. Absent fields are left alone; `"notes": null` (or a blank
/// string) clears the notes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub notes: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<Link>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<BTreeSet<ProjectType>>,
}

impl ProjectPatch {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        match &self.links {
            Some(links) => validate_links(links),
            None => Ok(()),
        }
    }
}

fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Per-record result of a bulk completion reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetOutcome {
    pub id: ProjectId,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetReport {
    pub outcomes: Vec<ResetOutcome>,
}

impl ResetReport {
    pub fn failed(&self) -> impl Iterator<Item = &ResetOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.error.is_some())
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed().next().is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSettings {
    pub default_types: Vec<ProjectType>,
    pub show_completed: bool,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            default_types: vec![ProjectType::Daily],
            show_completed: false,
        }
    }
}

fn validate_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("Project name is required".to_string()));
    }
    Ok(())
}

fn validate_links(links: &[Link]) -> AppResult<()> {
    links.iter().try_for_each(Link::validate)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(classification: Classification) -> Project {
        Project {
            id: ProjectId(1),
            name: "Foo".to_string(),
            notes: None,
            links: Vec::new(),
            classification,
            completed: false,
            date_added: Utc::now(),
            date_completed: None,
        }
    }

    #[test]
    fn links_are_made_absolute() {
        let link = Link::new("Docs", " example.org/docs ").expect("link");
        assert_eq!(link.url, "https://example.org/docs");

        let kept = Link::new("Plain", "http://example.org").expect("link");
        assert_eq!(kept.url, "http://example.org");

        let err = Link::new("Docs", "   ").expect_err("blank url rejected");
        assert!(err.is_validation());
    }

    #[test]
    fn empty_types_fall_back_to_legacy_type() {
        let value = json!({
            "id": 7,
            "name": "Old",
            "types": [],
            "type": "node",
            "dateAdded": "2024-01-01T00:00:00Z"
        });
        let project: Project = serde_json::from_value(value).expect("decode");
        assert_eq!(project.classification, Classification::Legacy(ProjectType::Node));
        assert!(!project.completed);
        assert!(project.date_completed.is_none());
    }

    #[test]
    fn tag_set_wins_over_legacy_type() {
        let value = json!({
            "id": 8,
            "name": "New",
            "types": ["daily", "depin"],
            "type": "node",
            "dateAdded": "2024-01-01T00:00:00Z"
        });
        let project: Project = serde_json::from_value(value).expect("decode");
        let encoded = serde_json::to_value(&project).expect("encode");
        assert_eq!(encoded["types"], json!(["daily", "depin"]));
        assert!(encoded.get("type").is_none());
        assert_eq!(encoded["dateCompleted"], json!(null));
    }

    #[test]
    fn legacy_only_records_match_on_their_single_type() {
        let legacy = sample(Classification::Legacy(ProjectType::Retro));
        assert!(legacy.classification.matches_any(&BTreeSet::from([ProjectType::Retro])));
        assert!(!legacy.classification.matches_any(&BTreeSet::from([ProjectType::Daily])));

        let bare = sample(Classification::Unclassified);
        assert!(!bare.classification.matches_any(&BTreeSet::from([ProjectType::Other])));
    }

    #[test]
    fn patch_never_touches_identity_or_completion() {
        let original = sample(Classification::Tags(BTreeSet::from([ProjectType::Daily])))
            .marked_completed(Utc::now());
        let patched = original.apply_patch(ProjectPatch {
            name: Some("  Renamed ".to_string()),
            notes: Some(Some("remember".to_string())),
            links: Some(vec![Link {
                name: "Site".to_string(),
                url: "site.io".to_string(),
            }]),
            types: Some(BTreeSet::new()),
        });
        assert_eq!(patched.id, original.id);
        assert_eq!(patched.date_added, original.date_added);
        assert_eq!(patched.date_completed, original.date_completed);
        assert!(patched.completed);
        assert_eq!(patched.name, "Renamed");
        assert_eq!(patched.links[0].url, "https://site.io");
        assert_eq!(patched.classification, Classification::Unclassified);
    }

    #[test]
    fn blank_links_are_rejected_in_drafts_and_patches() {
        let blank = Link {
            name: String::new(),
            url: "   ".to_string(),
        };
        let patch = ProjectPatch {
            links: Some(vec![blank.clone()]),
            ..ProjectPatch::default()
        };
        assert!(patch.validate().expect_err("blank link").is_validation());

        let mut draft = ProjectDraft::new("Foo");
        draft.links.push(blank);
        assert!(draft.validate().expect_err("blank link").is_validation());

        let mut stored = sample(Classification::Unclassified);
        stored.links.push(Link {
            name: "Site".to_string(),
            url: String::new(),
        });
        assert!(stored.validate().is_err());
    }

    #[test]
    fn patch_notes_distinguish_absent_from_null() {
        let untouched: ProjectPatch = serde_json::from_value(json!({ "name": "Foo" })).expect("decode");
        assert_eq!(untouched.notes, None);

        let cleared: ProjectPatch = serde_json::from_value(json!({ "notes": null })).expect("decode");
        assert_eq!(cleared.notes, Some(None));

        let original = Project {
            notes: Some("old".to_string()),
            ..sample(Classification::Unclassified)
        };
        assert_eq!(original.apply_patch(untouched).notes.as_deref(), Some("old"));
        assert_eq!(original.apply_patch(cleared).notes, None);

        let blank = ProjectPatch {
            notes: Some(Some("  ".to_string())),
            ..ProjectPatch::default()
        };
        assert_eq!(original.apply_patch(blank).notes, None);
    }

    #[test]
    fn draft_links_can_be_added_and_removed() {
        let mut draft = ProjectDraft::new("Foo");
        draft.add_link("One", "one.xyz").expect("first");
        draft.add_link("Two", "https://two.xyz").expect("second");
        assert!(draft.add_link("", "three.xyz").is_err());

        let removed = draft.remove_link(0).expect("removed");
        assert_eq!(removed.url, "https://one.xyz");
        assert_eq!(draft.links.len(), 1);
        assert!(draft.remove_link(5).is_none());

        assert!(ProjectDraft::new("  ").validate().is_err());
    }

    #[test]
    fn vocabulary_parses_wire_values() {
        for kind in ProjectType::ALL {
            assert_eq!(ProjectType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ProjectType::parse("weekly"), None);
        assert_eq!(ProjectType::Depin.label(), "DePIN");
    }
}
