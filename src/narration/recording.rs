//! Синтезатор-заглушка, записывающий все вызовы
//!
//! Ничего не озвучивает. Нужен для тестов и для прогона плеера без звука:
//! события синтезатора тест формирует сам через [`RecordingBackend::event`].

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{PlayerError, Result};

use super::{NarrationBackend, NarrationEvent, NarrationEventKind, SpeechParams, UtteranceId};

/// Вызов синтезатора
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Speak {
        utterance: UtteranceId,
        text: String,
        params: SpeechParams,
    },
    Pause,
    Resume,
    Cancel,
    SetVolume(f32),
}

#[derive(Debug, Default)]
struct Recorded {
    calls: Vec<BackendCall>,
    active: Option<UtteranceId>,
    overlapping: usize,
    failures: VecDeque<String>,
}

/// Синтезатор, который только запоминает вызовы
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Все вызовы по порядку
    pub fn calls(&self) -> Vec<BackendCall> {
        self.inner.lock().calls.clone()
    }

    /// Отправленные на озвучку фразы
    pub fn spoken(&self) -> Vec<(UtteranceId, String)> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::Speak { utterance, text, .. } => Some((*utterance, text.clone())),
                _ => None,
            })
            .collect()
    }

    /// Фраза, которая сейчас звучит
    pub fn active(&self) -> Option<UtteranceId> {
        self.inner.lock().active
    }

    /// Сколько раз `speak` пришёл, пока прежняя фраза ещё звучала
    pub fn overlapping_speaks(&self) -> usize {
        self.inner.lock().overlapping
    }

    /// Следующий `speak` завершится ошибкой
    pub fn fail_next_speak(&self, message: impl Into<String>) {
        self.inner.lock().failures.push_back(message.into());
    }

    /// Сформировать событие для текущей фразы.
    ///
    /// `End` и `Error` завершают фразу.
    pub fn event(&self, kind: NarrationEventKind) -> Option<NarrationEvent> {
        let mut inner = self.inner.lock();
        let utterance = inner.active?;
        if matches!(kind, NarrationEventKind::End | NarrationEventKind::Error(_)) {
            inner.active = None;
        }
        Some(NarrationEvent::new(utterance, kind))
    }

    pub fn clear(&self) {
        self.inner.lock().calls.clear();
    }
}

impl NarrationBackend for RecordingBackend {
    fn speak(&mut self, utterance: UtteranceId, text: &str, params: SpeechParams) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(message) = inner.failures.pop_front() {
            return Err(PlayerError::NarrationFailure(message));
        }
        if inner.active.is_some() {
            inner.overlapping += 1;
        }
        inner.active = Some(utterance);
        inner.calls.push(BackendCall::Speak {
            utterance,
            text: text.to_string(),
            params,
        });
        Ok(())
    }

    fn pause(&mut self) {
        self.inner.lock().calls.push(BackendCall::Pause);
    }

    fn resume(&mut self) {
        self.inner.lock().calls.push(BackendCall::Resume);
    }

    fn cancel(&mut self) {
        let mut inner = self.inner.lock();
        inner.active = None;
        inner.calls.push(BackendCall::Cancel);
    }

    fn set_volume(&mut self, volume: f32) {
        self.inner.lock().calls.push(BackendCall::SetVolume(volume));
    }
}
