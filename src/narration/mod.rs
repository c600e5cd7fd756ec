//! Модуль озвучки слайдов
//!
//! Движок озвучки работает через внедряемый порт [`NarrationBackend`]:
//! любой синтезатор речи, умеющий `speak` / `pause` / `resume` / `cancel` и
//! присылающий события начала, конца, паузы, продолжения и ошибки.

pub mod channel;
pub mod engine;
pub mod recording;
pub mod simulated;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use channel::{ChannelBackend, NarrationCommand};
pub use engine::{NarrationEngine, NarrationSignal, SkipOutcome};
pub use recording::{BackendCall, RecordingBackend};
pub use simulated::SimulatedBackend;

/// Идентификатор фразы, отправленной синтезатору
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UtteranceId(pub u64);

impl std::fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "utterance#{}", self.0)
    }
}

/// Параметры синтеза одной фразы
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeechParams {
    /// Скорость (0.5 - 2.0)
    pub rate: f64,
    /// Громкость (0.0 - 1.0)
    pub volume: f32,
}

/// Тип события синтезатора
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NarrationEventKind {
    Start,
    End,
    Pause,
    Resume,
    Error(String),
}

/// Событие синтезатора, привязанное к конкретной фразе
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationEvent {
    pub utterance: UtteranceId,
    pub kind: NarrationEventKind,
}

impl NarrationEvent {
    pub fn new(utterance: UtteranceId, kind: NarrationEventKind) -> Self {
        Self { utterance, kind }
    }
}

/// Фаза озвучки текущего слайда
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationPhase {
    /// Текст загружен (или отсутствует), синтез не запрошен
    #[default]
    Idle,
    /// Синтез запрошен, ждём события начала
    Loading,
    /// Идёт озвучка
    Playing,
    /// Пауза
    Paused,
    /// Озвучка слайда завершена
    Completed,
}

/// Состояние воспроизведения, которым владеет движок
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    /// Идёт ли озвучка
    pub is_playing: bool,
    /// Громкость (0 - 100)
    pub volume: u8,
    /// Выключен ли звук
    pub is_muted: bool,
    /// Скорость (0.5 - 2.0)
    pub playback_rate: f64,
    /// Текст текущей фразы
    pub current_utterance_text: Option<String>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            is_playing: false,
            volume: 100,
            is_muted: false,
            playback_rate: 1.0,
            current_utterance_text: None,
        }
    }
}

impl PlaybackState {
    /// Громкость, которую получает синтезатор
    pub fn effective_volume(&self) -> f32 {
        if self.is_muted {
            0.0
        } else {
            f32::from(self.volume.min(100)) / 100.0
        }
    }

    /// Параметры синтеза для следующей фразы
    pub fn speech_params(&self) -> SpeechParams {
        SpeechParams {
            rate: self.playback_rate,
            volume: self.effective_volume(),
        }
    }
}

/// Порт синтезатора речи.
///
/// Вызовы не блокируют: `speak` только ставит фразу в работу, а события
/// приходят позже и несут идентификатор фразы. Одновременно звучит не больше
/// одной фразы, поэтому движок всегда вызывает `cancel` перед новым `speak`.
pub trait NarrationBackend: Send {
    /// Начать озвучку текста
    fn speak(&mut self, utterance: UtteranceId, text: &str, params: SpeechParams) -> Result<()>;

    /// Поставить текущую фразу на паузу
    fn pause(&mut self);

    /// Продолжить текущую фразу
    fn resume(&mut self);

    /// Прервать текущую фразу без события окончания
    fn cancel(&mut self);

    /// Изменить громкость текущей фразы, если синтезатор это умеет
    fn set_volume(&mut self, _volume: f32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_volume() {
        let mut state = PlaybackState {
            volume: 40,
            ..PlaybackState::default()
        };
        assert!((state.effective_volume() - 0.4).abs() < f32::EPSILON);

        state.is_muted = true;
        assert_eq!(state.effective_volume(), 0.0);
        assert_eq!(state.speech_params().volume, 0.0);
    }
}
