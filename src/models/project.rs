use super::actor::{ActorId, Owned};
use crate::errors::{AppError, AppResult};
use crate::utils::time::{format_instant, parse_instant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ProjectId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub description: String,
    pub header_img: Option<String>,
    pub is_public: bool,
    pub is_open: bool,
    pub created_by: Option<ActorId>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn to_record(&self) -> ProjectRecord {
        ProjectRecord {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            header_img: self.header_img.clone(),
            is_public: self.is_public,
            is_open: self.is_open,
            created_by: self.created_by.as_ref().map(|a| a.as_str().to_string()),
            created_at: format_instant(&self.created_at),
        }
    }
}

impl Owned for Project {
    fn owner(&self) -> Option<&ActorId> {
        self.created_by.as_ref()
    }
}

/// Row shape of the `projects` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub header_img: Option<String>,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default = "default_true")]
    pub is_open: bool,
    #[serde(default)]
    pub created_by: Option<String>,
    pub created_at: String,
}

fn default_true() -> bool {
    true
}

impl TryFrom<ProjectRecord> for Project {
    type Error = AppError;

    fn try_from(rec: ProjectRecord) -> AppResult<Self> {
        let name = rec.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::InvalidRecord(format!(
                "project {} has an empty name",
                rec.id
            )));
        }
        let created_at = parse_instant(&rec.created_at)
            .map_err(|e| AppError::InvalidRecord(format!("project {}: {e}", rec.id)))?;

        Ok(Project {
            id: rec.id,
            name,
            description: rec.description,
            header_img: rec.header_img.filter(|s| !s.trim().is_empty()),
            is_public: rec.is_public,
            is_open: rec.is_open,
            created_by: rec
                .created_by
                .filter(|s| !s.trim().is_empty())
                .map(ActorId::new),
            created_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDraft {
    pub name: String,
    pub description: String,
    pub header_img: Option<String>,
    pub is_public: bool,
    pub is_open: bool,
    pub created_by: ActorId,
}

impl ProjectDraft {
    pub fn new(name: impl Into<String>, created_by: ActorId) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            header_img: None,
            is_public: true,
            is_open: true,
            created_by,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::EmptyName);
        }
        Ok(())
    }

    pub fn into_project(self, id: ProjectId, created_at: DateTime<Utc>) -> AppResult<Project> {
        self.validate()?;
        Ok(Project {
            id,
            name: self.name.trim().to_string(),
            description: self.description,
            header_img: self.header_img.filter(|s| !s.trim().is_empty()),
            is_public: self.is_public,
            is_open: self.is_open,
            created_by: Some(self.created_by),
            created_at,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub header_img: Option<String>,
    pub is_public: Option<bool>,
    pub is_open: Option<bool>,
}

impl ProjectPatch {
    pub fn apply_to(&self, current: &Project) -> AppResult<Project> {
        let mut out = current.clone();
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(AppError::EmptyName);
            }
            out.name = name.trim().to_string();
        }
        if let Some(description) = &self.description {
            out.description = description.clone();
        }
        if let Some(img) = &self.header_img {
            out.header_img = Some(img.clone()).filter(|s| !s.trim().is_empty());
        }
        if let Some(public) = self.is_public {
            out.is_public = public;
        }
        if let Some(open) = self.is_open {
            out.is_open = open;
        }
        Ok(out)
    }
}

/// Owner-only mutation guard shared by both backends.
pub fn ensure_project_owner(project: &Project, actor: &ActorId) -> AppResult<()> {
    if project.is_owned_by(actor) {
        Ok(())
    } else {
        Err(AppError::NotOwner(format!("project {}", project.id)))
    }
}
