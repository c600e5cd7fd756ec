//! Синтезатор, имитирующий озвучку по таймеру
//!
//! Сразу присылает `Start`, а `End` через расчётную длительность текста.
//! Подходит для демонстрации и интеграционных тестов с управляемым временем
//! tokio.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{PlayerError, Result};
use crate::progress::estimate_duration;

use super::{NarrationBackend, NarrationEvent, NarrationEventKind, SpeechParams, UtteranceId};

struct Speaking {
    utterance: UtteranceId,
    remaining: Duration,
    started: Instant,
    task: Option<JoinHandle<()>>,
}

/// Синтезатор без звука, работающий на таймерах tokio
pub struct SimulatedBackend {
    events: mpsc::UnboundedSender<NarrationEvent>,
    chars_per_second: f64,
    current: Option<Speaking>,
}

impl SimulatedBackend {
    /// Создать синтезатор. События уходят в `events`.
    pub fn new(events: mpsc::UnboundedSender<NarrationEvent>, chars_per_second: f64) -> Self {
        Self {
            events,
            chars_per_second,
            current: None,
        }
    }

    fn spawn_run(
        &self,
        utterance: UtteranceId,
        first: NarrationEventKind,
        duration: Duration,
    ) -> Result<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PlayerError::NarrationFailure(format!("no async runtime: {}", e)))?;
        let events = self.events.clone();

        Ok(runtime.spawn(async move {
            if events.send(NarrationEvent::new(utterance, first)).is_err() {
                return;
            }
            tokio::time::sleep(duration).await;
            let _ = events.send(NarrationEvent::new(utterance, NarrationEventKind::End));
        }))
    }

    fn abort(&mut self) {
        if let Some(speaking) = self.current.take() {
            if let Some(task) = speaking.task {
                task.abort();
            }
        }
    }
}

impl NarrationBackend for SimulatedBackend {
    fn speak(&mut self, utterance: UtteranceId, text: &str, params: SpeechParams) -> Result<()> {
        self.abort();
        let duration = estimate_duration(text.chars().count(), params.rate, self.chars_per_second);
        let task = self.spawn_run(utterance, NarrationEventKind::Start, duration)?;
        self.current = Some(Speaking {
            utterance,
            remaining: duration,
            started: Instant::now(),
            task: Some(task),
        });
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(speaking) = self.current.as_mut() {
            if let Some(task) = speaking.task.take() {
                task.abort();
                speaking.remaining = speaking.remaining.saturating_sub(speaking.started.elapsed());
                let _ = self
                    .events
                    .send(NarrationEvent::new(speaking.utterance, NarrationEventKind::Pause));
            }
        }
    }

    fn resume(&mut self) {
        let (utterance, remaining) = match self.current.as_ref() {
            Some(speaking) if speaking.task.is_none() => (speaking.utterance, speaking.remaining),
            _ => return,
        };
        match self.spawn_run(utterance, NarrationEventKind::Resume, remaining) {
            Ok(task) => {
                if let Some(speaking) = self.current.as_mut() {
                    speaking.started = Instant::now();
                    speaking.task = Some(task);
                }
            }
            Err(e) => {
                let _ = self
                    .events
                    .send(NarrationEvent::new(utterance, NarrationEventKind::Error(e.to_string())));
            }
        }
    }

    fn cancel(&mut self) {
        self.abort();
    }
}

impl Drop for SimulatedBackend {
    fn drop(&mut self) {
        self.abort();
    }
}
