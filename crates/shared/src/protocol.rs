use serde::{Deserialize, Serialize};

use crate::domain::{LessonId, Material, Page, PageId, SectionKind};

/// Page as it travels over the wire.
///
/// Older records carry their body under `content` and their attachments as a
/// bare `files` url list. Both aliases are accepted on input and folded away by
/// [`PageRecord::normalize`]; they are never written back.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageRecord {
    pub id: PageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson_id: Option<LessonId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub audios: Vec<String>,
    #[serde(default)]
    pub materials: Vec<Material>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        rename = "sectionTitle",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub section_title: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SectionKind>,
}

impl PageRecord {
    pub fn normalize(self) -> Page {
        let markdown = self.markdown.or(self.content).unwrap_or_default();
        let mut materials = self.materials;
        for url in self.files.unwrap_or_default() {
            if !materials.iter().any(|material| material.public_url == url) {
                materials.push(Material::from_legacy_url(&url));
            }
        }

        Page {
            id: self.id,
            lesson_id: self.lesson_id,
            markdown,
            images: self.images,
            audios: self.audios,
            materials,
            title: self.title,
            section_title: self.section_title,
            kind: self.kind,
        }
    }
}

impl From<Page> for PageRecord {
    fn from(page: Page) -> Self {
        Self {
            id: page.id,
            lesson_id: page.lesson_id,
            markdown: Some(page.markdown),
            content: None,
            images: page.images,
            audios: page.audios,
            materials: page.materials,
            files: None,
            title: page.title,
            section_title: page.section_title,
            kind: page.kind,
        }
    }
}

impl From<&Page> for PageRecord {
    fn from(page: &Page) -> Self {
        page.clone().into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFileRequest {
    pub url: String,
    #[serde(rename = "pageId")]
    pub page_id: PageId,
}

#[derive(Debug, Clone, Serialize)]
pub struct LessonListQuery {
    pub l: &'static str,
}

impl LessonListQuery {
    pub const ALL: LessonListQuery = LessonListQuery { l: "all" };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageFetchQuery {
    pub p: PageId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSaveQuery {
    pub q: PageId,
}
