use crate::models::ProjectId;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MenuKind {
    Options,
    Links,
}

/// At most one per-project menu is open, of either kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum MenuState {
    #[default]
    Closed,
    Open { kind: MenuKind, id: ProjectId },
}

impl MenuState {
    /// Re-invoking the open menu closes it; anything else opens the requested
    /// menu and closes whatever was open before.
    pub fn toggle(&mut self, kind: MenuKind, id: ProjectId) {
        *self = if self.is_open(kind, id) {
            Self::Closed
        } else {
            Self::Open { kind, id }
        };
    }

    pub fn close(&mut self) {
        *self = Self::Closed;
    }

    /// Closes the menu only when it belongs to `id`, e.g. after the project
    /// was deleted.
    pub fn forget(&mut self, id: ProjectId) {
        if matches!(self, Self::Open { id: open, .. } if *open == id) {
            self.close();
        }
    }

    pub fn is_open(&self, kind: MenuKind, id: ProjectId) -> bool {
        *self == Self::Open { kind, id }
    }

    pub fn open_for(&self, kind: MenuKind) -> Option<ProjectId> {
        match *self {
            Self::Open { kind: open, id } if open == kind => Some(id),
            _ => None,
        }
    }
}
