//! Модуль конфигурации библиотеки course-player
//!
//! Пороги навигации, модель скорости чтения, периоды таймеров и параметры
//! доступа к бэкенду. Конфигурация читается из JSON и может быть
//! переопределена переменными окружения.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PlayerError, Result};

/// Минимальная скорость озвучки
pub const MIN_PLAYBACK_RATE: f64 = 0.5;
/// Максимальная скорость озвучки
pub const MAX_PLAYBACK_RATE: f64 = 2.0;
/// Верхняя граница периода обновления субтитров
pub const MAX_CAPTION_INTERVAL_MS: u64 = 100;

/// Переменная окружения с адресом API
pub const ENV_API_URL: &str = "COURSE_PLAYER_API_URL";
/// Переменная окружения с токеном доступа
pub const ENV_API_TOKEN: &str = "COURSE_PLAYER_API_TOKEN";
/// Переменная окружения с директорией для сохранённых тестов
pub const ENV_ASSESSMENT_DIR: &str = "COURSE_PLAYER_ASSESSMENT_DIR";

/// Параметры доступа к бэкенду курсов
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// Базовый адрес API
    pub base_url: String,
    /// Токен доступа (Bearer)
    pub auth_token: Option<String>,
    /// Таймаут одного запроса в секундах
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            auth_token: None,
            request_timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    /// Таймаут запроса
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Конфигурация плеера
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    /// Порог прогресса (в процентах), после которого открывается переход вперёд
    pub gate_threshold: f64,
    /// Порог прогресса для завершения последнего слайда
    pub completion_threshold: f64,
    /// Скорость чтения, символов в секунду
    pub chars_per_second: f64,
    /// Период таймера прогресса в миллисекундах
    pub tick_interval_ms: u64,
    /// Период обновления субтитров в миллисекундах
    pub caption_interval_ms: u64,
    /// Шаг перемотки в секундах
    pub skip_seconds: u32,
    /// Сколько держится индикатор перемотки, мс
    pub skip_feedback_ms: u64,
    /// Скорость озвучки по умолчанию
    pub default_rate: f64,
    /// Громкость по умолчанию (0 - 100)
    pub default_volume: u8,
    /// Запускать озвучку сразу после смены слайда
    pub autoplay: bool,
    /// Автоматически завершать курс, когда последний слайд дослушан
    pub auto_complete: bool,
    /// Директория для сохранения сгенерированных тестов
    pub assessment_dir: Option<String>,
    /// Параметры бэкенда
    pub api: ApiConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            gate_threshold: 80.0,
            completion_threshold: 100.0,
            chars_per_second: 25.0,
            tick_interval_ms: 100,
            caption_interval_ms: 100,
            skip_seconds: 10,
            skip_feedback_ms: 500,
            default_rate: 1.0,
            default_volume: 100,
            autoplay: true,
            auto_complete: false,
            assessment_dir: None,
            api: ApiConfig::default(),
        }
    }
}

impl PlayerConfig {
    /// Загрузить конфигурацию из JSON файла с учётом переменных окружения
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PlayerError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config: PlayerConfig = serde_json::from_str(&raw)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        log::info!("Loaded player configuration from {}", path.display());
        Ok(config)
    }

    /// Конфигурация по умолчанию с учётом переменных окружения
    pub fn from_env() -> Result<Self> {
        let mut config = PlayerConfig::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Применить переопределения. `lookup` возвращает значение по имени переменной.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api.base_url = url.trim().to_string();
        }
        if let Some(token) = lookup(ENV_API_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.api.auth_token = Some(token.trim().to_string());
        }
        if let Some(dir) = lookup(ENV_ASSESSMENT_DIR).filter(|v| !v.trim().is_empty()) {
            self.assessment_dir = Some(dir);
        }
    }

    /// Проверить согласованность параметров
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PlayerError::Configuration(msg));

        if !(self.gate_threshold > 0.0 && self.gate_threshold <= 100.0) {
            return invalid(format!("gate_threshold must be in (0, 100], got {}", self.gate_threshold));
        }
        if !(self.completion_threshold >= self.gate_threshold && self.completion_threshold <= 100.0) {
            return invalid(format!(
                "completion_threshold must be in [{}, 100], got {}",
                self.gate_threshold, self.completion_threshold
            ));
        }
        if !(self.chars_per_second > 0.0 && self.chars_per_second.is_finite()) {
            return invalid(format!("chars_per_second must be positive, got {}", self.chars_per_second));
        }
        if self.tick_interval_ms == 0 {
            return invalid("tick_interval_ms must be greater than zero".to_string());
        }
        if self.caption_interval_ms == 0 || self.caption_interval_ms > MAX_CAPTION_INTERVAL_MS {
            return invalid(format!(
                "caption_interval_ms must be in 1..={}, got {}",
                MAX_CAPTION_INTERVAL_MS, self.caption_interval_ms
            ));
        }
        if !(MIN_PLAYBACK_RATE..=MAX_PLAYBACK_RATE).contains(&self.default_rate) {
            return invalid(format!(
                "default_rate must be in {}..={}, got {}",
                MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE, self.default_rate
            ));
        }
        if self.default_volume > 100 {
            return invalid(format!("default_volume must be at most 100, got {}", self.default_volume));
        }
        Ok(())
    }

    /// Период таймера прогресса
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Период обновления субтитров
    pub fn caption_interval(&self) -> Duration {
        Duration::from_millis(self.caption_interval_ms)
    }

    /// Время показа индикатора перемотки
    pub fn skip_feedback(&self) -> Duration {
        Duration::from_millis(self.skip_feedback_ms)
    }

    /// Директория для сохранённых тестов
    pub fn assessment_dir(&self) -> PathBuf {
        match &self.assessment_dir {
            Some(dir) => PathBuf::from(dir),
            None => std::env::temp_dir().join("course-player"),
        }
    }
}

/// Ограничить скорость озвучки допустимым диапазоном
pub fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        return 1.0;
    }
    rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = PlayerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gate_threshold, 80.0);
        assert_eq!(config.completion_threshold, 100.0);
        assert_eq!(config.tick_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_validation_rejects_bad_thresholds() {
        let config = PlayerConfig {
            gate_threshold: 90.0,
            completion_threshold: 85.0,
            ..PlayerConfig::default()
        };
        assert!(matches!(config.validate(), Err(PlayerError::Configuration(_))));

        let config = PlayerConfig {
            caption_interval_ms: 250,
            ..PlayerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PlayerConfig {
            default_rate: 3.0,
            ..PlayerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (ENV_API_URL, "https://lms.example.com/api "),
            (ENV_API_TOKEN, "secret"),
            (ENV_ASSESSMENT_DIR, ""),
        ]
        .into_iter()
        .collect();

        let mut config = PlayerConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.api.base_url, "https://lms.example.com/api");
        assert_eq!(config.api.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.assessment_dir, None);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PlayerConfig =
            serde_json::from_str(r#"{ "gate_threshold": 75.0, "api": { "base_url": "http://x" } }"#).unwrap();
        assert_eq!(config.gate_threshold, 75.0);
        assert_eq!(config.chars_per_second, 25.0);
        assert_eq!(config.api.base_url, "http://x");
        assert_eq!(config.api.request_timeout_secs, 30);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.json");
        std::fs::write(&path, r#"{ "skip_seconds": 5, "auto_complete": true }"#).unwrap();

        let config = PlayerConfig::from_file(&path).unwrap();
        assert_eq!(config.skip_seconds, 5);
        assert!(config.auto_complete);

        assert!(PlayerConfig::from_file(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_clamp_rate() {
        assert_eq!(clamp_rate(0.1), MIN_PLAYBACK_RATE);
        assert_eq!(clamp_rate(5.0), MAX_PLAYBACK_RATE);
        assert_eq!(clamp_rate(1.25), 1.25);
        assert_eq!(clamp_rate(f64::NAN), 1.0);
    }
}
