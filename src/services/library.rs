//! A user's stored books: generation, edits, regeneration, export.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::GenerationError;
use crate::models::{BookMetadata, BookRecord, Chapter, GenerationRequest};
use crate::services::export::{DocumentExporter, ExportError, ExportFormat, ExportedFile};
use crate::services::pipeline::BookGenerator;
use crate::storage::RecordStore;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("book {0} not found")]
    NotFound(Uuid),

    #[error("book {0} belongs to another user")]
    Forbidden(Uuid),

    #[error("chapter {index} does not exist (book has {count} chapters)")]
    InvalidChapter { index: usize, count: usize },

    #[error("a book must keep at least one chapter")]
    LastChapter,

    #[error("invalid edit: {0}")]
    InvalidEdit(String),

    #[error("book storage failed: {0}")]
    Store(#[source] anyhow::Error),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailsUpdate {
    pub title: Option<String>,
    pub synopsis: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChapterUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// A freshly generated and stored book with its generation metadata.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedBook {
    #[serde(flatten)]
    pub record: BookRecord,
    pub metadata: BookMetadata,
}

pub struct BookLibrary {
    store: Arc<dyn RecordStore>,
    generator: Arc<BookGenerator>,
    exporter: Arc<dyn DocumentExporter>,
}

impl BookLibrary {
    pub fn new(
        store: Arc<dyn RecordStore>,
        generator: Arc<BookGenerator>,
        exporter: Arc<dyn DocumentExporter>,
    ) -> Self {
        Self {
            store,
            generator,
            exporter,
        }
    }

    /// Newest first.
    pub async fn list(&self, user_id: &str) -> Result<Vec<BookRecord>, LibraryError> {
        let mut records = self.load(user_id).await?;
        records.retain(|record| record.is_owned_by(user_id));
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    pub async fn get(&self, user_id: &str, id: Uuid) -> Result<BookRecord, LibraryError> {
        let records = self.load(user_id).await?;
        let index = find_owned(&records, user_id, id)?;
        Ok(records[index].clone())
    }

    pub async fn create(
        &self,
        user_id: &str,
        request: &GenerationRequest,
    ) -> Result<CreatedBook, LibraryError> {
        let output = self.generator.generate(request).await?;
        let record = BookRecord::new(
            user_id,
            output.premise,
            output.parameters,
            output.book.document,
        );

        let mut records = self.load(user_id).await?;
        records.push(record.clone());
        self.save(user_id, records).await?;
        tracing::info!("stored book {} for user {}", record.id, user_id);

        Ok(CreatedBook {
            record,
            metadata: output.book.metadata,
        })
    }

    pub async fn update_details(
        &self,
        user_id: &str,
        id: Uuid,
        update: DetailsUpdate,
    ) -> Result<BookRecord, LibraryError> {
        let title = non_blank(update.title, "title")?;
        let synopsis = non_blank(update.synopsis, "synopsis")?;
        self.modify(user_id, id, |record| {
            if let Some(title) = title {
                record.document.title = title;
            }
            if let Some(synopsis) = synopsis {
                record.document.synopsis = synopsis;
            }
            Ok(())
        })
        .await
    }

    pub async fn update_chapter(
        &self,
        user_id: &str,
        id: Uuid,
        index: usize,
        update: ChapterUpdate,
    ) -> Result<BookRecord, LibraryError> {
        let title = non_blank(update.title, "chapter title")?;
        let content = non_blank(update.content, "chapter content")?;
        self.modify(user_id, id, |record| {
            let chapter = chapter_mut(record, index)?;
            if let Some(title) = title {
                chapter.title = title;
            }
            if let Some(content) = content {
                chapter.content = content;
            }
            Ok(())
        })
        .await
    }

    pub async fn add_chapter(
        &self,
        user_id: &str,
        id: Uuid,
        draft: ChapterUpdate,
    ) -> Result<BookRecord, LibraryError> {
        let title = non_blank(draft.title, "chapter title")?;
        let content = non_blank(draft.content, "chapter content")?.unwrap_or_default();
        self.modify(user_id, id, |record| {
            let index = record.document.chapters.len();
            record.document.chapters.push(Chapter::generated(
                title.unwrap_or_else(|| Chapter::default_title(index)),
                content,
            ));
            record.parameters.chapter_count = record.document.chapters.len();
            Ok(())
        })
        .await
    }

    pub async fn remove_chapter(
        &self,
        user_id: &str,
        id: Uuid,
        index: usize,
    ) -> Result<BookRecord, LibraryError> {
        self.modify(user_id, id, |record| {
            chapter_mut(record, index)?;
            if record.document.chapters.len() == 1 {
                return Err(LibraryError::LastChapter);
            }
            record.document.chapters.remove(index);
            record.parameters.chapter_count = record.document.chapters.len();
            Ok(())
        })
        .await
    }

    pub async fn regenerate_chapter(
        &self,
        user_id: &str,
        id: Uuid,
        index: usize,
    ) -> Result<BookRecord, LibraryError> {
        let current = self.get(user_id, id).await?;
        let total = current.document.chapters.len();
        if index >= total {
            return Err(LibraryError::InvalidChapter {
                index,
                count: total,
            });
        }

        let chapter = self
            .generator
            .regenerate_chapter(&current.premise, &current.parameters, index, total)
            .await?;

        self.modify(user_id, id, move |record| {
            *chapter_mut(record, index)? = chapter;
            Ok(())
        })
        .await
    }

    pub async fn delete(&self, user_id: &str, id: Uuid) -> Result<(), LibraryError> {
        let mut records = self.load(user_id).await?;
        let index = find_owned(&records, user_id, id)?;
        records.remove(index);
        self.save(user_id, records).await?;
        tracing::info!("deleted book {} for user {}", id, user_id);
        Ok(())
    }

    pub async fn export(
        &self,
        user_id: &str,
        id: Uuid,
        format: ExportFormat,
    ) -> Result<ExportedFile, LibraryError> {
        let record = self.get(user_id, id).await?;
        Ok(self.exporter.export(&record.document, format)?)
    }

    /// Read the whole list, apply `edit` to one owned record, write it back.
    async fn modify<F>(&self, user_id: &str, id: Uuid, edit: F) -> Result<BookRecord, LibraryError>
    where
        F: FnOnce(&mut BookRecord) -> Result<(), LibraryError> + Send,
    {
        let mut records = self.load(user_id).await?;
        let index = find_owned(&records, user_id, id)?;
        let record = &mut records[index];
        edit(record)?;
        record.touch();
        let updated = record.clone();
        self.save(user_id, records).await?;
        Ok(updated)
    }

    async fn load(&self, user_id: &str) -> Result<Vec<BookRecord>, LibraryError> {
        self.store
            .list_records(user_id)
            .await
            .map_err(LibraryError::Store)
    }

    async fn save(&self, user_id: &str, records: Vec<BookRecord>) -> Result<(), LibraryError> {
        self.store
            .save_all(user_id, records)
            .await
            .map_err(LibraryError::Store)
    }
}

fn find_owned(records: &[BookRecord], user_id: &str, id: Uuid) -> Result<usize, LibraryError> {
    let index = records
        .iter()
        .position(|record| record.id == id)
        .ok_or(LibraryError::NotFound(id))?;
    if !records[index].is_owned_by(user_id) {
        tracing::warn!("user {} tried to access book {} they do not own", user_id, id);
        return Err(LibraryError::Forbidden(id));
    }
    Ok(index)
}

fn chapter_mut(record: &mut BookRecord, index: usize) -> Result<&mut Chapter, LibraryError> {
    let count = record.document.chapters.len();
    record
        .document
        .chapters
        .get_mut(index)
        .ok_or(LibraryError::InvalidChapter { index, count })
}

/// `None` stays `None`; a provided value must not be blank.
fn non_blank(value: Option<String>, field: &str) -> Result<Option<String>, LibraryError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if v.is_empty() => Err(LibraryError::InvalidEdit(format!("{field} is empty"))),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::error::CompletionError;
    use crate::models::{BookDocument, BookParameters};
    use crate::services::export::BookExporter;
    use crate::services::llm::Completion;
    use crate::storage::MemoryRecordStore;
    use crate::test_support::{
        RecordingPacer, ScriptedCompletion, chapter_prose, completion, json_book,
    };

    const PREMISE: &str =
        "A lighthouse keeper discovers a message in a bottle from a ship lost a century ago.";

    fn library(
        script: Vec<Result<Completion, CompletionError>>,
    ) -> (BookLibrary, Arc<MemoryRecordStore>) {
        let store = Arc::new(MemoryRecordStore::default());
        let generator = Arc::new(BookGenerator::new(
            Arc::new(ScriptedCompletion::new(script)),
            Arc::new(RecordingPacer::default()),
            &test_config(),
        ));
        (
            BookLibrary::new(store.clone(), generator, Arc::new(BookExporter)),
            store,
        )
    }

    fn stored(owner: &str, chapters: usize) -> BookRecord {
        BookRecord::new(
            owner,
            PREMISE,
            BookParameters {
                size: "small".to_string(),
                genre: "Mystery".to_string(),
                audience: "Adult".to_string(),
                chapter_count: chapters,
            },
            BookDocument {
                title: "Salt and Light".to_string(),
                synopsis: "A keeper and a letter from a vanished ship.".to_string(),
                chapters: (0..chapters)
                    .map(|i| {
                        Chapter::generated(Chapter::default_title(i), chapter_prose("Elias"))
                    })
                    .collect(),
            },
        )
    }

    #[tokio::test]
    async fn create_generates_and_stores() {
        let (library, _) = library(vec![Ok(completion(&json_book("Salt and Light", 2), 900))]);
        let request = GenerationRequest {
            description: PREMISE.to_string(),
            size: "small".to_string(),
            genre: None,
            audience: None,
            chapter_count: Some(2),
        };

        let created = library.create("alice", &request).await.unwrap();

        assert_eq!(created.record.owner_id, "alice");
        assert_eq!(created.record.parameters.chapter_count, 2);
        assert_eq!(created.metadata.book_info.total_chapters, 2);
        let listed = library.list("alice").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.record.id);
    }

    #[tokio::test]
    async fn other_users_cannot_touch_a_book() {
        let (library, store) = library(Vec::new());
        let foreign = stored("bob", 2);
        let id = foreign.id;
        // a record that ended up in the wrong list must still be refused
        store.save_all("alice", vec![foreign]).await.unwrap();

        assert!(matches!(
            library.get("alice", id).await,
            Err(LibraryError::Forbidden(_))
        ));
        assert!(matches!(
            library.delete("alice", id).await,
            Err(LibraryError::Forbidden(_))
        ));
        assert!(library.list("alice").await.unwrap().is_empty());
        assert!(matches!(
            library.get("alice", Uuid::new_v4()).await,
            Err(LibraryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn edits_update_the_stored_record() {
        let (library, store) = library(Vec::new());
        let record = stored("alice", 2);
        let id = record.id;
        store.save_all("alice", vec![record]).await.unwrap();

        library
            .update_details(
                "alice",
                id,
                DetailsUpdate {
                    title: Some("  The Meridian  ".to_string()),
                    synopsis: None,
                },
            )
            .await
            .unwrap();
        library
            .update_chapter(
                "alice",
                id,
                1,
                ChapterUpdate {
                    title: Some("The Letter".to_string()),
                    content: None,
                },
            )
            .await
            .unwrap();
        let updated = library
            .add_chapter("alice", id, ChapterUpdate::default())
            .await
            .unwrap();

        assert_eq!(updated.document.title, "The Meridian");
        assert_eq!(updated.document.chapters[1].title, "The Letter");
        assert_eq!(updated.document.chapters[2].title, "Chapter 3");
        assert_eq!(updated.parameters.chapter_count, 3);
        assert!(updated.updated_at >= updated.created_at);

        let blank = library
            .update_details(
                "alice",
                id,
                DetailsUpdate {
                    title: Some("   ".to_string()),
                    synopsis: None,
                },
            )
            .await;
        assert!(matches!(blank, Err(LibraryError::InvalidEdit(_))));
    }

    #[tokio::test]
    async fn last_chapter_cannot_be_removed() {
        let (library, store) = library(Vec::new());
        let record = stored("alice", 2);
        let id = record.id;
        store.save_all("alice", vec![record]).await.unwrap();

        let updated = library.remove_chapter("alice", id, 0).await.unwrap();
        assert_eq!(updated.document.chapters.len(), 1);

        assert!(matches!(
            library.remove_chapter("alice", id, 0).await,
            Err(LibraryError::LastChapter)
        ));
        assert!(matches!(
            library.remove_chapter("alice", id, 5).await,
            Err(LibraryError::InvalidChapter { index: 5, count: 1 })
        ));
    }

    #[tokio::test]
    async fn regenerated_chapter_replaces_only_that_chapter() {
        let reply = serde_json::json!({
            "title": "A New Tide",
            "content": chapter_prose("Mara"),
        })
        .to_string();
        let (library, store) = library(vec![Ok(completion(&reply, 300))]);
        let record = stored("alice", 3);
        let id = record.id;
        store.save_all("alice", vec![record]).await.unwrap();

        let updated = library.regenerate_chapter("alice", id, 1).await.unwrap();

        assert_eq!(updated.document.chapters[1].title, "A New Tide");
        assert_eq!(updated.document.chapters[0].title, "Chapter 1");
        assert_eq!(updated.document.chapters.len(), 3);
    }

    #[tokio::test]
    async fn export_renders_owned_book() {
        let (library, store) = library(Vec::new());
        let record = stored("alice", 1);
        let id = record.id;
        store.save_all("alice", vec![record]).await.unwrap();

        let file = library.export("alice", id, ExportFormat::Txt).await.unwrap();
        assert_eq!(file.filename, "salt_and_light.txt");

        assert!(matches!(
            library.export("alice", id, ExportFormat::Pdf).await,
            Err(LibraryError::Export(ExportError::Unsupported(_)))
        ));
    }
}
