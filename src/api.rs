//! Клиент бэкенда курсов
//!
//! Четыре запроса: объяснения к слайдам, сохранение прогресса, исходный
//! материал курса и генерация теста. Плеер работает с бэкендом только через
//! трейт [`CourseApi`]. Реализации: [`HttpCourseApi`] на reqwest и
//! [`MemoryCourseApi`] в памяти.

use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

use crate::config::ApiConfig;
use crate::error::{PlayerError, Result};
use crate::slide::Explanation;

/// Курс и организация, к которой он относится
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRef {
    pub course_id: String,
    pub tenant_id: String,
}

impl CourseRef {
    pub fn new(course_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            course_id: course_id.into(),
            tenant_id: tenant_id.into(),
        }
    }
}

/// Ответ с исходным материалом курса
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMaterial {
    #[serde(default)]
    pub source_material: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressBody<'a> {
    course_id: &'a str,
    slide_number: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody<'a> {
    source_material: &'a str,
    course_id: &'a str,
    tenant_id: &'a str,
}

/// Бэкенд курсов
#[async_trait::async_trait]
pub trait CourseApi: Send + Sync {
    /// Объяснения ко всем слайдам курса
    async fn fetch_explanations(&self, course: &CourseRef) -> Result<Vec<Explanation>>;

    /// Сохранить прохождение слайда (номер с единицы)
    async fn report_slide_progress(&self, course: &CourseRef, slide_number: u32) -> Result<()>;

    /// Ссылка на исходный материал курса
    async fn fetch_source_material(&self, course: &CourseRef) -> Result<Option<String>>;

    /// Сгенерировать вопросы теста по исходному материалу
    async fn generate_assessment(
        &self,
        course: &CourseRef,
        source_material: &str,
    ) -> Result<Vec<serde_json::Value>>;
}

/// HTTP-клиент бэкенда
#[derive(Debug, Clone)]
pub struct HttpCourseApi {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpCourseApi {
    /// Создать клиент по конфигурации
    pub fn new(config: &ApiConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(PlayerError::Configuration("API base URL is empty".to_string()));
        }
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = self.authorized(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = match response.text().await {
            Ok(text) => text,
            Err(e) => format!("Failed to read error response: {}", e),
        };
        log::error!("{} failed (status {}): {}", what, status, error_text);
        Err(PlayerError::Persistence(format!("{} failed with status {}: {}", what, status, error_text)))
    }
}

#[async_trait::async_trait]
impl CourseApi for HttpCourseApi {
    async fn fetch_explanations(&self, course: &CourseRef) -> Result<Vec<Explanation>> {
        let url = self.endpoint(&format!("courses/{}/explanations", course.course_id));
        log::debug!("Fetching explanations from {}", url);

        let request = self.client.get(url).query(&[("tenantId", course.tenant_id.as_str())]);
        let explanations = self.send(request, "Explanation fetch").await?.json().await?;
        Ok(explanations)
    }

    async fn report_slide_progress(&self, course: &CourseRef, slide_number: u32) -> Result<()> {
        let body = ProgressBody {
            course_id: &course.course_id,
            slide_number,
        };
        let request = self.client.post(self.endpoint("progress")).json(&body);
        self.send(request, "Progress report").await?;
        log::debug!("Reported slide {} of course {}", slide_number, course.course_id);
        Ok(())
    }

    async fn fetch_source_material(&self, course: &CourseRef) -> Result<Option<String>> {
        let url = self.endpoint(&format!("courses/{}", course.course_id));
        let material: SourceMaterial = self.send(self.client.get(url), "Course fetch").await?.json().await?;
        Ok(material.source_material.filter(|s| !s.trim().is_empty()))
    }

    async fn generate_assessment(
        &self,
        course: &CourseRef,
        source_material: &str,
    ) -> Result<Vec<serde_json::Value>> {
        let body = GenerateBody {
            source_material,
            course_id: &course.course_id,
            tenant_id: &course.tenant_id,
        };
        let request = self.client.post(self.endpoint("assessments/generate")).json(&body);
        let questions = self.send(request, "Assessment generation").await?.json().await?;
        Ok(questions)
    }
}

/// Бэкенд в памяти: для офлайн-прогона, демо и тестов
#[derive(Debug, Default)]
pub struct MemoryCourseApi {
    explanations: Vec<Explanation>,
    source_material: Option<String>,
    questions: Vec<serde_json::Value>,
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    reported: Vec<u32>,
    progress_failures: usize,
    generation_failures: usize,
}

impl MemoryCourseApi {
    pub fn new(explanations: Vec<Explanation>) -> Self {
        Self {
            explanations,
            ..Self::default()
        }
    }

    /// Исходный материал и вопросы теста
    pub fn with_assessment(mut self, source_material: impl Into<String>, questions: Vec<serde_json::Value>) -> Self {
        self.source_material = Some(source_material.into());
        self.questions = questions;
        self
    }

    /// Следующие `count` сохранений прогресса завершатся ошибкой
    pub fn fail_progress_reports(&self, count: usize) {
        self.state.lock().progress_failures = count;
    }

    /// Следующие `count` генераций теста завершатся ошибкой
    pub fn fail_generations(&self, count: usize) {
        self.state.lock().generation_failures = count;
    }

    /// Успешно сохранённые номера слайдов
    pub fn reported(&self) -> Vec<u32> {
        self.state.lock().reported.clone()
    }
}

#[async_trait::async_trait]
impl CourseApi for MemoryCourseApi {
    async fn fetch_explanations(&self, _course: &CourseRef) -> Result<Vec<Explanation>> {
        Ok(self.explanations.clone())
    }

    async fn report_slide_progress(&self, _course: &CourseRef, slide_number: u32) -> Result<()> {
        let mut state = self.state.lock();
        if state.progress_failures > 0 {
            state.progress_failures -= 1;
            return Err(PlayerError::Persistence("progress endpoint unavailable".to_string()));
        }
        state.reported.push(slide_number);
        Ok(())
    }

    async fn fetch_source_material(&self, _course: &CourseRef) -> Result<Option<String>> {
        Ok(self.source_material.clone())
    }

    async fn generate_assessment(
        &self,
        _course: &CourseRef,
        _source_material: &str,
    ) -> Result<Vec<serde_json::Value>> {
        let mut state = self.state.lock();
        if state.generation_failures > 0 {
            state.generation_failures -= 1;
            return Err(PlayerError::Persistence("generation endpoint unavailable".to_string()));
        }
        Ok(self.questions.clone())
    }
}
