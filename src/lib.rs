//! Основной файл библиотеки course-player
//!
//! Плеер слайдов для обучающих курсов: озвучивает каждый слайд, оценивает
//! прогресс прослушивания, не пускает вперёд, пока слайд не дослушан, сохраняет
//! прогресс на сервере и после последнего слайда готовит тест.

pub mod api;
pub mod bridge;
pub mod config;
pub mod error;
pub mod events;
pub mod gate;
pub mod logger;
pub mod narration;
pub mod notification;
pub mod player;
pub mod progress;
pub mod runtime;
pub mod slide;
pub mod subtitle;
pub mod timer;

use std::sync::Arc;

use tokio::sync::mpsc;

pub use crate::api::{CourseApi, CourseRef, HttpCourseApi, MemoryCourseApi};
pub use crate::bridge::{AssessmentStore, PersistenceBridge, PreparedAssessment};
pub use crate::config::PlayerConfig;
pub use crate::error::{PlayerError, Result};
pub use crate::events::{Advisory, PlayerEvent, PlayerObserver, SkipDirection};
pub use crate::narration::{NarrationBackend, NarrationEvent};
pub use crate::player::{NavigationOutcome, SlidePlayer};
pub use crate::runtime::{spawn_player, NarrationChannel, PlayerCommand, PlayerHandle};
pub use crate::slide::CourseScript;

/// Основная структура для работы с библиотекой
pub struct CoursePlayer {
    /// Конфигурация плеера
    config: PlayerConfig,
    /// Бэкенд курсов
    api: Arc<dyn CourseApi>,
    /// Наблюдатели для следующего открытого курса
    observers: Vec<Box<dyn PlayerObserver>>,
}

impl CoursePlayer {
    /// Создать экземпляр с указанным бэкендом
    pub fn new(config: PlayerConfig, api: Arc<dyn CourseApi>) -> Self {
        Self {
            config,
            api,
            observers: Vec::new(),
        }
    }

    /// Создать экземпляр с HTTP-бэкендом из конфигурации
    pub fn with_http(config: PlayerConfig) -> Result<Self> {
        let api = HttpCourseApi::new(&config.api)?;
        Ok(Self::new(config, Arc::new(api)))
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Добавить наблюдателя событий плеера
    pub fn add_observer(&mut self, observer: Box<dyn PlayerObserver>) {
        self.observers.push(observer);
    }

    /// Загрузить сценарий курса
    pub async fn load_script(&self, course: &CourseRef) -> Result<CourseScript> {
        log::info!("Loading course {} for tenant {}", course.course_id, course.tenant_id);
        let explanations = self.api.fetch_explanations(course).await?;
        CourseScript::from_explanations(course.course_id.clone(), explanations)
    }

    /// Открыть курс и запустить плеер.
    ///
    /// `backend` получает отправителя событий и возвращает синтезатор, который
    /// будет в них писать.
    pub async fn open<F>(&mut self, course: CourseRef, backend: F) -> Result<PlayerHandle>
    where
        F: FnOnce(mpsc::UnboundedSender<NarrationEvent>) -> Box<dyn NarrationBackend>,
    {
        let script = self.load_script(&course).await?;
        let narration = NarrationChannel::new();
        let player = SlidePlayer::new(self.config.clone(), script, backend(narration.sender()))?;
        for observer in self.observers.drain(..) {
            player.add_observer(observer);
        }

        let store = AssessmentStore::from_config(&self.config);
        let bridge = PersistenceBridge::new(self.api.clone(), course, store);
        spawn_player(player, Some(Arc::new(bridge)), narration)
    }
}
