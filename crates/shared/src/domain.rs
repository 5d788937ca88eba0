use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(LessonId);
id_newtype!(SectionId);
id_newtype!(PageId);
id_newtype!(MaterialId);

impl From<SectionId> for PageId {
    /// Sections and pages share one key space.
    fn from(value: SectionId) -> Self {
        Self(value.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectionKind {
    Vocab,
    Grammar,
    Exercise,
}

impl SectionKind {
    pub const ALL: [SectionKind; 3] = [Self::Vocab, Self::Grammar, Self::Exercise];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vocab => "Vocab",
            Self::Grammar => "Grammar",
            Self::Exercise => "Exercise",
        }
    }
}

impl std::str::FromStr for SectionKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown section type '{value}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    #[serde(rename = "type")]
    pub kind: SectionKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
}

impl Section {
    pub fn page_id(&self) -> PageId {
        PageId(self.id.0.clone())
    }
}

/// A lesson as listed by the navigation layer. `sections` is in presentation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: LessonId,
    pub title: String,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl Lesson {
    pub fn section(&self, section_id: &SectionId) -> Option<&Section> {
        self.sections.iter().find(|section| &section.id == section_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    pub id: MaterialId,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub public_url: String,
}

impl Material {
    pub fn from_upload(file_name: impl Into<String>, public_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: MaterialId::generate(),
            file_name: file_name.into(),
            created_at: now,
            updated_at: now,
            public_url: public_url.into(),
        }
    }

    /// Material for a bare url from the legacy `files` list.
    pub fn from_legacy_url(public_url: &str) -> Self {
        let file_name = public_url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .unwrap_or(public_url)
            .to_string();
        Self {
            id: MaterialId::new(public_url),
            file_name,
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
            public_url: public_url.to_string(),
        }
    }
}

/// Canonical in-memory page. Built only through [`crate::protocol::PageRecord::normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub id: PageId,
    pub lesson_id: Option<LessonId>,
    pub markdown: String,
    pub images: Vec<String>,
    pub audios: Vec<String>,
    pub materials: Vec<Material>,
    pub title: Option<String>,
    pub section_title: Option<String>,
    pub kind: Option<SectionKind>,
}

impl Page {
    pub fn material_by_url(&self, public_url: &str) -> Option<&Material> {
        self.materials
            .iter()
            .find(|material| material.public_url == public_url)
    }

    /// Removes every material with the given url and reports how many went.
    pub fn remove_material(&mut self, public_url: &str) -> usize {
        let before = self.materials.len();
        self.materials
            .retain(|material| material.public_url != public_url);
        before - self.materials.len()
    }
}

pub const DEFAULT_LESSON_MARKDOWN: &str = "# TITLE\n\n## CONTENT\n\n";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LessonValidationError {
    #[error("Please enter a lesson title")]
    MissingTitle,
    #[error("Please enter a section title")]
    MissingSectionTitle,
}

/// Output of the lesson-authoring form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLesson {
    pub title: String,
    pub section_title: String,
    pub section_kind: SectionKind,
    pub markdown: String,
}

impl NewLesson {
    pub fn new(title: impl Into<String>, section_title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            section_title: section_title.into(),
            section_kind: SectionKind::Vocab,
            markdown: DEFAULT_LESSON_MARKDOWN.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), LessonValidationError> {
        if self.title.trim().is_empty() {
            return Err(LessonValidationError::MissingTitle);
        }
        if self.section_title.trim().is_empty() {
            return Err(LessonValidationError::MissingSectionTitle);
        }
        Ok(())
    }

    pub fn into_page(self) -> Result<Page, LessonValidationError> {
        self.validate()?;
        Ok(Page {
            id: PageId::generate(),
            lesson_id: Some(LessonId::generate()),
            markdown: self.markdown,
            images: Vec::new(),
            audios: Vec::new(),
            materials: Vec::new(),
            title: Some(self.title),
            section_title: Some(self.section_title),
            kind: Some(self.section_kind),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_kind_parses_case_insensitively() {
        assert_eq!("grammar".parse::<SectionKind>(), Ok(SectionKind::Grammar));
        assert!("reading".parse::<SectionKind>().is_err());
    }

    #[test]
    fn section_serializes_kind_as_type() {
        let section = Section {
            id: SectionId::new("section-1-1"),
            kind: SectionKind::Vocab,
            title: "Basic Greetings".into(),
            section_title: None,
        };
        let json = serde_json::to_value(&section).expect("serialize");
        assert_eq!(json["type"], "Vocab");
        assert_eq!(json["id"], "section-1-1");
        assert!(json.get("section_title").is_none());
    }

    #[test]
    fn legacy_url_material_uses_last_path_segment() {
        let material = Material::from_legacy_url("https://cdn.example/files/kana.pdf");
        assert_eq!(material.file_name, "kana.pdf");
        assert_eq!(material.public_url, "https://cdn.example/files/kana.pdf");
    }

    #[test]
    fn new_lesson_requires_titles() {
        assert_eq!(
            NewLesson::new("  ", "Greetings").validate(),
            Err(LessonValidationError::MissingTitle)
        );
        assert_eq!(
            NewLesson::new("Intro", "").validate(),
            Err(LessonValidationError::MissingSectionTitle)
        );
    }

    #[test]
    fn new_lesson_becomes_page_with_fresh_ids() {
        let mut lesson = NewLesson::new("Intro", "Greetings");
        lesson.section_kind = SectionKind::Exercise;
        let page = lesson.into_page().expect("valid lesson");
        assert_eq!(page.markdown, DEFAULT_LESSON_MARKDOWN);
        assert_eq!(page.kind, Some(SectionKind::Exercise));
        assert_eq!(page.title.as_deref(), Some("Intro"));
        assert_eq!(page.section_title.as_deref(), Some("Greetings"));
        assert!(page.lesson_id.is_some());
        assert!(Uuid::parse_str(page.id.as_str()).is_ok());
    }

    #[test]
    fn remove_material_only_drops_matching_url() {
        let mut page = NewLesson::new("Intro", "Greetings")
            .into_page()
            .expect("valid lesson");
        page.materials.push(Material::from_upload("a.png", "https://cdn/a.png"));
        page.materials.push(Material::from_upload("b.png", "https://cdn/b.png"));
        assert_eq!(page.remove_material("https://cdn/a.png"), 1);
        assert_eq!(page.materials.len(), 1);
        assert!(page.material_by_url("https://cdn/b.png").is_some());
    }
}
