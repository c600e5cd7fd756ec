//! События плеера и система наблюдателей
//!
//! Плеер сообщает интерфейсу обо всём через [`PlayerEvent`]. Отказы и сбои,
//! которые не являются ошибками операции, приходят как [`Advisory`]:
//! интерфейс показывает их пользователю (например, всплывающим сообщением).

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::bridge::PreparedAssessment;
use crate::narration::{NarrationPhase, PlaybackState};
use crate::progress::ProgressState;

/// Направление перемотки
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipDirection {
    Forward,
    Backward,
}

/// Индикатор перемотки, который интерфейс показывает короткое время
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipFeedback {
    pub direction: SkipDirection,
}

/// Рекомендация для интерфейса
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    /// Переход вперёд закрыт, слайд не дослушан
    NavigationRejected { required: f64, progress: f64 },
    /// На последнем слайде нужно действие «Завершить»
    UseCompleteAction,
    /// Для завершения курса последний слайд должен быть дослушан
    CompletionRequired { required: f64, progress: f64 },
    /// Завершить курс можно только с последнего слайда
    NotFinalSlide,
    /// У слайда нет текста для озвучки
    ContentUnavailable { slide_number: u32 },
    /// Сбой озвучки, можно попробовать снова
    NarrationFailed { message: String },
    /// Не удалось сохранить прогресс на сервере
    ProgressReportFailed { slide_number: u32, message: String },
    /// Не удалось подготовить тест
    AssessmentFailed { message: String },
    /// Тест уже готовится
    AssessmentInProgress,
}

impl Advisory {
    /// Текст сообщения для пользователя
    pub fn message(&self) -> String {
        match self {
            Advisory::NavigationRejected { required, .. } => {
                format!("complete at least {}% before continuing", required)
            }
            Advisory::UseCompleteAction => {
                "this is the last slide, use Complete to finish the course".to_string()
            }
            Advisory::CompletionRequired { required, .. } => {
                format!("listen to at least {}% of the last slide to complete the course", required)
            }
            Advisory::NotFinalSlide => "the course can only be completed from the last slide".to_string(),
            Advisory::ContentUnavailable { slide_number } => {
                format!("narration for slide {} is not available", slide_number)
            }
            Advisory::NarrationFailed { message } => format!("narration failed: {}", message),
            Advisory::ProgressReportFailed { slide_number, message } => {
                format!("failed to save progress for slide {}: {}", slide_number, message)
            }
            Advisory::AssessmentFailed { message } => {
                format!("failed to prepare assessment: {}", message)
            }
            Advisory::AssessmentInProgress => "the assessment is already being prepared".to_string(),
        }
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Событие плеера
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerEvent {
    /// Открыт слайд
    SlideChanged {
        index: usize,
        slide_number: u32,
        title: String,
    },
    /// Слайд отмечен пройденным
    SlideCompleted { index: usize },
    /// Изменилось состояние озвучки
    Narration {
        phase: NarrationPhase,
        playback: PlaybackState,
    },
    /// Изменился прогресс слайда
    Progress(ProgressState),
    /// Открылся переход вперёд
    AdvanceUnlocked,
    /// Озвучка слайда дочитана
    NarrationCompleted,
    /// Текущая строка субтитров
    Caption { text: String },
    /// Индикатор перемотки (`None` - скрыть)
    SkipFeedback { direction: Option<SkipDirection> },
    /// Рекомендация для интерфейса
    Advisory(Advisory),
    /// Началась подготовка теста
    AssessmentPreparing,
    /// Тест готов, можно переходить к прохождению
    AssessmentReady(PreparedAssessment),
    /// Плеер остановлен
    ShutDown,
}

/// Наблюдатель за событиями плеера
pub trait PlayerObserver: Send + Sync {
    /// Вызывается для каждого события
    fn on_event(&self, event: &PlayerEvent);
}

/// Реестр наблюдателей
#[derive(Default)]
pub struct EventHub {
    observers: RwLock<HashMap<usize, Box<dyn PlayerObserver>>>,
    next_id: AtomicUsize,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавить наблюдателя. Возвращает идентификатор для удаления.
    pub fn add_observer(&self, observer: Box<dyn PlayerObserver>) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.observers.write().insert(id, observer);
        id
    }

    /// Удалить наблюдателя
    pub fn remove_observer(&self, id: usize) -> Option<Box<dyn PlayerObserver>> {
        self.observers.write().remove(&id)
    }

    /// Количество наблюдателей
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Разослать событие всем наблюдателям
    pub fn notify(&self, event: &PlayerEvent) {
        let observers = self.observers.read();
        for observer in observers.values() {
            observer.on_event(event);
        }
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub").field("observers", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Counter(Arc<AtomicUsize>);

    impl PlayerObserver for Counter {
        fn on_event(&self, _event: &PlayerEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_hub_add_remove() {
        let hub = EventHub::new();
        let count = Arc::new(AtomicUsize::new(0));

        let first = hub.add_observer(Box::new(Counter(count.clone())));
        hub.add_observer(Box::new(Counter(count.clone())));
        hub.notify(&PlayerEvent::AdvanceUnlocked);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        assert!(hub.remove_observer(first).is_some());
        assert!(hub.remove_observer(first).is_none());
        hub.notify(&PlayerEvent::AdvanceUnlocked);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_advisory_message() {
        let advisory = Advisory::NavigationRejected { required: 80.0, progress: 42.0 };
        assert_eq!(advisory.to_string(), "complete at least 80% before continuing");
    }

    #[test]
    fn test_event_json_shape() {
        let event = PlayerEvent::Advisory(Advisory::UseCompleteAction);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "advisory", "kind": "use_complete_action" }));

        let event = PlayerEvent::SkipFeedback { direction: Some(SkipDirection::Backward) };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "skip_feedback", "direction": "backward" }));
    }
}
