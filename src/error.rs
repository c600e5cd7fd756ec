//! Модуль обработки ошибок библиотеки course-player
//!
//! Здесь собраны ошибки операций. Ошибки движка озвучки и таймеров наружу
//! как ошибки не уходят: плеер переводит их в рекомендации для интерфейса
//! (см. [`crate::events::Advisory`]).

use thiserror::Error;

/// Ошибки библиотеки course-player
#[derive(Debug, Error)]
pub enum PlayerError {
    /// Ошибка HTTP запроса
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// У слайда нет текста для озвучки
    #[error("Narration content is unavailable")]
    ContentUnavailable,

    /// Курс не содержит ни одного слайда
    #[error("Course {0} has no slides")]
    EmptyCourse(String),

    /// Сбой движка озвучки
    #[error("Narration failure: {0}")]
    NarrationFailure(String),

    /// Индекс слайда вне диапазона
    #[error("Invalid slide index {index} (course has {count} slides)")]
    InvalidSlide { index: usize, count: usize },

    /// Бэкенд отклонил запрос
    #[error("Backend request failed: {0}")]
    Persistence(String),

    /// Не удалось подготовить тест по курсу
    #[error("Failed to prepare assessment: {0}")]
    AssessmentPreparation(String),

    /// Плеер уже остановлен
    #[error("Player has been shut down")]
    ShutDown,

    /// Другая ошибка
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<&str> for PlayerError {
    fn from(s: &str) -> Self {
        PlayerError::Other(anyhow::anyhow!(s.to_string()))
    }
}

impl From<String> for PlayerError {
    fn from(s: String) -> Self {
        PlayerError::Other(anyhow::anyhow!(s))
    }
}

/// Тип Result для библиотеки course-player
pub type Result<T> = std::result::Result<T, PlayerError>;
