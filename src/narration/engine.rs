//! Движок озвучки
//!
//! Держит единственную ссылку на текущую фразу. Любая новая фраза полностью
//! заменяет прежнюю: сначала `cancel`, потом `speak`. События синтезатора,
//! пришедшие для устаревшей фразы, отбрасываются.

use crate::config::{clamp_rate, PlayerConfig};
use crate::error::{PlayerError, Result};
use crate::events::SkipDirection;

use super::{
    NarrationBackend, NarrationEvent, NarrationEventKind, NarrationPhase, PlaybackState,
    UtteranceId,
};

/// Сигнал движка для плеера
#[derive(Debug, Clone, PartialEq)]
pub enum NarrationSignal {
    /// Синтезатор начал говорить
    Started,
    /// Озвучка продолжена после паузы
    Resumed,
    /// Озвучка поставлена на паузу со стороны синтезатора
    Paused,
    /// Текст слайда дочитан
    Completed,
    /// Синтезатор сообщил об ошибке
    Failed(String),
}

/// Результат перемотки
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SkipOutcome {
    /// У слайда нет текста
    NoContent,
    /// Позиция сдвинута
    Moved {
        /// Новая позиция в символах
        offset: usize,
        /// Новая позиция как доля текста (0.0 - 1.0)
        fraction: f64,
        /// Синтез перезапущен с новой позиции
        restarted: bool,
    },
    /// Перемотка за конец текста
    Completed,
}

/// Движок озвучки слайда
pub struct NarrationEngine {
    backend: Box<dyn NarrationBackend>,
    phase: NarrationPhase,
    playback: PlaybackState,
    /// Полный текст слайда
    text: String,
    /// Длина текста в символах
    text_len: usize,
    /// Позиция, с которой началась текущая (или следующая) фраза
    offset: usize,
    /// Текущая фраза
    active: Option<UtteranceId>,
    next_id: u64,
    chars_per_second: f64,
}

impl std::fmt::Debug for NarrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NarrationEngine")
            .field("phase", &self.phase)
            .field("playback", &self.playback)
            .field("text_len", &self.text_len)
            .field("offset", &self.offset)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl NarrationEngine {
    /// Создать движок поверх синтезатора
    pub fn new(backend: Box<dyn NarrationBackend>, config: &PlayerConfig) -> Self {
        Self {
            backend,
            phase: NarrationPhase::Idle,
            playback: PlaybackState {
                volume: config.default_volume.min(100),
                playback_rate: clamp_rate(config.default_rate),
                ..PlaybackState::default()
            },
            text: String::new(),
            text_len: 0,
            offset: 0,
            active: None,
            next_id: 1,
            chars_per_second: config.chars_per_second,
        }
    }

    pub fn phase(&self) -> NarrationPhase {
        self.phase
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Длина текста в символах
    pub fn text_len(&self) -> usize {
        self.text_len
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn active_utterance(&self) -> Option<UtteranceId> {
        self.active
    }

    pub fn has_content(&self) -> bool {
        self.text_len > 0
    }

    /// Загрузить текст нового слайда. Текущая фраза прерывается.
    pub fn load_text(&mut self, text: &str) -> Result<()> {
        self.cancel();
        self.text = text.trim().to_string();
        self.text_len = self.text.chars().count();
        self.offset = 0;
        self.playback.current_utterance_text = None;

        if self.text_len == 0 {
            return Err(PlayerError::ContentUnavailable);
        }
        Ok(())
    }

    /// Запустить или продолжить озвучку. Возвращает `true`, если синтезатору
    /// отправлена команда.
    pub fn play(&mut self) -> Result<bool> {
        if !self.has_content() {
            return Ok(false);
        }
        match self.phase {
            NarrationPhase::Playing | NarrationPhase::Loading => Ok(false),
            NarrationPhase::Paused if self.active.is_some() => {
                self.backend.resume();
                Ok(true)
            }
            NarrationPhase::Paused | NarrationPhase::Idle => {
                self.speak_from(self.offset)?;
                Ok(true)
            }
            NarrationPhase::Completed => {
                self.speak_from(0)?;
                Ok(true)
            }
        }
    }

    /// Поставить озвучку на паузу
    pub fn pause(&mut self) -> bool {
        match self.phase {
            NarrationPhase::Playing | NarrationPhase::Loading if self.active.is_some() => {
                self.backend.pause();
                self.phase = NarrationPhase::Paused;
                self.playback.is_playing = false;
                true
            }
            _ => false,
        }
    }

    /// Прервать озвучку без события окончания
    pub fn cancel(&mut self) {
        self.stop_active();
        self.phase = NarrationPhase::Idle;
    }

    /// Изменить скорость. Если озвучка идёт, она начинается заново с начала
    /// текста: частичная позиция при смене скорости не сохраняется.
    pub fn set_rate(&mut self, rate: f64) -> Result<bool> {
        let rate = clamp_rate(rate);
        if (rate - self.playback.playback_rate).abs() < f64::EPSILON {
            return Ok(false);
        }
        self.playback.playback_rate = rate;

        match self.phase {
            NarrationPhase::Playing | NarrationPhase::Loading => {
                log::info!("Playback rate changed to {:.2}, restarting narration", rate);
                self.speak_from(0)?;
                Ok(true)
            }
            NarrationPhase::Paused => {
                // Фраза на паузе синтезирована со старой скоростью
                self.stop_active();
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    /// Установить громкость (0 - 100)
    pub fn set_volume(&mut self, volume: u8) {
        self.playback.volume = volume.min(100);
        self.backend.set_volume(self.playback.effective_volume());
    }

    /// Переключить звук. Возвращает новое значение `is_muted`.
    pub fn toggle_mute(&mut self) -> bool {
        self.playback.is_muted = !self.playback.is_muted;
        self.backend.set_volume(self.playback.effective_volume());
        self.playback.is_muted
    }

    /// Перемотать на `seconds` секунд.
    ///
    /// Реальной звуковой дорожки нет, поэтому позиция оценивается как
    /// `progress% × длина`, а сдвиг считается по модели скорости чтения.
    /// Остаток текста синтезируется заново.
    pub fn skip(&mut self, direction: SkipDirection, seconds: u32, progress: f64) -> Result<SkipOutcome> {
        if !self.has_content() {
            return Ok(SkipOutcome::NoContent);
        }

        let len = self.text_len;
        let current = position_from_progress(progress, len);
        let delta = (f64::from(seconds) * self.chars_per_second).round() as usize;

        let target = match direction {
            SkipDirection::Forward => {
                let target = current.saturating_add(delta);
                if target >= len {
                    self.finish();
                    return Ok(SkipOutcome::Completed);
                }
                target
            }
            SkipDirection::Backward => current.saturating_sub(delta),
        };

        let restarted = match self.phase {
            NarrationPhase::Playing | NarrationPhase::Loading => {
                self.speak_from(target)?;
                true
            }
            phase => {
                self.stop_active();
                self.offset = target;
                if phase == NarrationPhase::Completed {
                    self.phase = NarrationPhase::Idle;
                }
                false
            }
        };

        Ok(SkipOutcome::Moved {
            offset: target,
            fraction: target as f64 / len as f64,
            restarted,
        })
    }

    /// Обработать событие синтезатора
    pub fn handle_event(&mut self, event: &NarrationEvent) -> Option<NarrationSignal> {
        if self.active != Some(event.utterance) {
            log::debug!("Ignoring {:?} for stale {}", event.kind, event.utterance);
            return None;
        }

        match &event.kind {
            NarrationEventKind::Start if self.phase == NarrationPhase::Loading => {
                self.phase = NarrationPhase::Playing;
                self.playback.is_playing = true;
                Some(NarrationSignal::Started)
            }
            NarrationEventKind::Resume if self.phase == NarrationPhase::Paused => {
                self.phase = NarrationPhase::Playing;
                self.playback.is_playing = true;
                Some(NarrationSignal::Resumed)
            }
            NarrationEventKind::Pause if self.phase == NarrationPhase::Playing => {
                self.phase = NarrationPhase::Paused;
                self.playback.is_playing = false;
                Some(NarrationSignal::Paused)
            }
            NarrationEventKind::End => {
                self.active = None;
                self.phase = NarrationPhase::Completed;
                self.playback.is_playing = false;
                self.offset = self.text_len;
                Some(NarrationSignal::Completed)
            }
            NarrationEventKind::Error(message) => {
                log::warn!("Narration error on {}: {}", event.utterance, message);
                self.active = None;
                self.playback.is_playing = false;
                self.phase = match self.phase {
                    NarrationPhase::Playing | NarrationPhase::Paused => NarrationPhase::Paused,
                    _ => NarrationPhase::Idle,
                };
                Some(NarrationSignal::Failed(message.clone()))
            }
            _ => None,
        }
    }

    /// Отметить текст дочитанным (перемотка за конец)
    fn finish(&mut self) {
        self.stop_active();
        self.phase = NarrationPhase::Completed;
        self.offset = self.text_len;
    }

    fn speak_from(&mut self, offset: usize) -> Result<()> {
        self.stop_active();
        let offset = offset.min(self.text_len);
        self.offset = offset;

        let remaining = char_suffix(&self.text, offset).to_string();
        if remaining.trim().is_empty() {
            self.phase = NarrationPhase::Completed;
            return Ok(());
        }

        let id = UtteranceId(self.next_id);
        self.next_id += 1;

        match self.backend.speak(id, &remaining, self.playback.speech_params()) {
            Ok(()) => {
                log::debug!("Speaking {} from offset {} ({} chars)", id, offset, remaining.chars().count());
                self.active = Some(id);
                self.phase = NarrationPhase::Loading;
                self.playback.current_utterance_text = Some(remaining);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to start narration: {}", e);
                self.phase = if offset > 0 { NarrationPhase::Paused } else { NarrationPhase::Idle };
                Err(match e {
                    PlayerError::NarrationFailure(_) => e,
                    other => PlayerError::NarrationFailure(other.to_string()),
                })
            }
        }
    }

    fn stop_active(&mut self) {
        if let Some(id) = self.active.take() {
            log::debug!("Cancelling {}", id);
            self.backend.cancel();
        }
        self.playback.is_playing = false;
    }
}

impl Drop for NarrationEngine {
    fn drop(&mut self) {
        self.stop_active();
    }
}

/// Позиция в символах по проценту прогресса
pub fn position_from_progress(progress: f64, len: usize) -> usize {
    let fraction = if progress.is_nan() { 0.0 } else { (progress / 100.0).clamp(0.0, 1.0) };
    ((fraction * len as f64).round() as usize).min(len)
}

fn char_suffix(text: &str, offset: usize) -> &str {
    match text.char_indices().nth(offset) {
        Some((index, _)) => &text[index..],
        None => "",
    }
}
