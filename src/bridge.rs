//! Связь плеера с бэкендом
//!
//! Сохранение прогресса по слайдам и подготовка теста после последнего
//! слайда. Подготовка либо проходит целиком (материал, генерация, проверка,
//! сохранение на диск), либо возвращает одну общую ошибку.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::api::{CourseApi, CourseRef};
use crate::config::PlayerConfig;
use crate::error::{PlayerError, Result};

/// Подготовленный тест, готовый к передаче в квиз
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedAssessment {
    pub course_id: String,
    /// Вопросы в формате бэкенда
    pub questions: Vec<serde_json::Value>,
    /// Файл, куда сохранён тест
    pub stored_at: Option<PathBuf>,
}

/// Локальное хранилище сгенерированных тестов
#[derive(Debug, Clone)]
pub struct AssessmentStore {
    dir: PathBuf,
}

impl AssessmentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(config: &PlayerConfig) -> Self {
        Self::new(config.assessment_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Путь к файлу теста курса
    pub fn path_for(&self, course_id: &str) -> PathBuf {
        let name: String = course_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("assessment-{}.json", name))
    }

    /// Сохранить вопросы: запись во временный файл и переименование
    pub async fn save(&self, course_id: &str, questions: &[serde_json::Value]) -> Result<PathBuf> {
        let dir = self.dir.clone();
        let path = self.path_for(course_id);
        let json = serde_json::to_vec_pretty(questions)?;

        tokio::task::spawn_blocking(move || -> Result<PathBuf> {
            std::fs::create_dir_all(&dir)?;
            let mut file = tempfile::NamedTempFile::new_in(&dir)?;
            std::io::Write::write_all(&mut file, &json)?;
            file.persist(&path).map_err(|e| PlayerError::Io(e.error))?;
            Ok(path)
        })
        .await
        .map_err(|e| PlayerError::Other(anyhow::anyhow!("Assessment save task failed: {}", e)))?
    }

    /// Прочитать сохранённые вопросы
    pub async fn load(&self, course_id: &str) -> Result<Vec<serde_json::Value>> {
        let raw = tokio::fs::read(self.path_for(course_id)).await?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// Мост между плеером и бэкендом курса
pub struct PersistenceBridge {
    api: Arc<dyn CourseApi>,
    course: CourseRef,
    store: AssessmentStore,
}

impl std::fmt::Debug for PersistenceBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceBridge")
            .field("course", &self.course)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl PersistenceBridge {
    pub fn new(api: Arc<dyn CourseApi>, course: CourseRef, store: AssessmentStore) -> Self {
        Self { api, course, store }
    }

    pub fn course(&self) -> &CourseRef {
        &self.course
    }

    pub fn store(&self) -> &AssessmentStore {
        &self.store
    }

    /// Сохранить прохождение слайда (номер с единицы)
    pub async fn report_slide_progress(&self, slide_number: u32) -> Result<()> {
        self.api.report_slide_progress(&self.course, slide_number).await.map_err(|e| {
            log::warn!("Failed to report slide {}: {}", slide_number, e);
            e
        })
    }

    /// Сохранить несколько слайдов параллельно. Результат по каждому номеру.
    pub async fn report_many(&self, slide_numbers: &[u32]) -> Vec<(u32, Result<()>)> {
        let reports = slide_numbers.iter().map(|&number| async move {
            (number, self.report_slide_progress(number).await)
        });
        join_all(reports).await
    }

    /// Подготовить тест по курсу
    pub async fn prepare_assessment(&self) -> Result<PreparedAssessment> {
        log::info!("Preparing assessment for course {}", self.course.course_id);
        let fail = |stage: &str, e: PlayerError| {
            log::error!("Assessment preparation failed at {}: {}", stage, e);
            PlayerError::AssessmentPreparation(format!("{}: {}", stage, e))
        };

        let material = self
            .api
            .fetch_source_material(&self.course)
            .await
            .map_err(|e| fail("source material", e))?
            .ok_or_else(|| {
                PlayerError::AssessmentPreparation("course has no source material".to_string())
            })?;

        let questions = self
            .api
            .generate_assessment(&self.course, &material)
            .await
            .map_err(|e| fail("generation", e))?;
        if questions.is_empty() {
            return Err(PlayerError::AssessmentPreparation("no questions were generated".to_string()));
        }

        let stored_at = self
            .store
            .save(&self.course.course_id, &questions)
            .await
            .map_err(|e| fail("storage", e))?;

        log::info!("Assessment with {} questions stored at {}", questions.len(), stored_at.display());
        Ok(PreparedAssessment {
            course_id: self.course.course_id.clone(),
            questions,
            stored_at: Some(stored_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryCourseApi;
    use serde_json::json;

    fn bridge(api: Arc<MemoryCourseApi>, dir: &Path) -> PersistenceBridge {
        PersistenceBridge::new(api, CourseRef::new("course/1", "tenant"), AssessmentStore::new(dir))
    }

    #[tokio::test]
    async fn test_prepare_assessment_stores_questions() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(
            MemoryCourseApi::new(Vec::new()).with_assessment("s3://material.pdf", vec![json!({"q": 1})]),
        );
        let bridge = bridge(api, dir.path());

        let prepared = bridge.prepare_assessment().await.unwrap();
        assert_eq!(prepared.questions, vec![json!({"q": 1})]);

        let stored_at = prepared.stored_at.unwrap();
        assert_eq!(stored_at, dir.path().join("assessment-course_1.json"));
        assert_eq!(bridge.store().load("course/1").await.unwrap(), vec![json!({"q": 1})]);
    }

    #[tokio::test]
    async fn test_failures_are_aggregated() {
        let dir = tempfile::tempdir().unwrap();

        // Нет исходного материала
        let api = Arc::new(MemoryCourseApi::new(Vec::new()));
        let err = bridge(api, dir.path()).prepare_assessment().await.unwrap_err();
        assert!(matches!(err, PlayerError::AssessmentPreparation(_)));

        // Пустой список вопросов
        let api = Arc::new(MemoryCourseApi::new(Vec::new()).with_assessment("material", Vec::new()));
        let err = bridge(api, dir.path()).prepare_assessment().await.unwrap_err();
        assert!(matches!(err, PlayerError::AssessmentPreparation(_)));

        // Сбой генерации
        let api = Arc::new(MemoryCourseApi::new(Vec::new()).with_assessment("material", vec![json!(1)]));
        api.fail_generations(1);
        let err = bridge(api.clone(), dir.path()).prepare_assessment().await.unwrap_err();
        assert!(err.to_string().contains("generation"));

        // Повтор проходит
        assert!(bridge(api, dir.path()).prepare_assessment().await.is_ok());
    }

    #[tokio::test]
    async fn test_report_many() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(MemoryCourseApi::new(Vec::new()));
        api.fail_progress_reports(1);
        let bridge = bridge(api.clone(), dir.path());

        let results = bridge.report_many(&[1, 2]).await;
        let failed: Vec<u32> = results.iter().filter(|(_, r)| r.is_err()).map(|(n, _)| *n).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(api.reported().len(), 1);
    }
}
