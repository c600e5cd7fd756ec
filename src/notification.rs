//! Модуль для реализации системы уведомлений
//!
//! Конкретные наблюдатели за событиями плеера: в лог, в память, в канал,
//! в файл журнала, через функцию обратного вызова и их комбинация.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::events::{PlayerEvent, PlayerObserver};

/// Наблюдатель, пишущий события в лог
#[derive(Debug, Default)]
pub struct LogObserver {
    /// Префикс сообщений (опционально)
    prefix: Option<String>,
}

impl LogObserver {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    /// Создать наблюдатель с префиксом
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: Some(prefix.into()) }
    }
}

impl PlayerObserver for LogObserver {
    fn on_event(&self, event: &PlayerEvent) {
        let prefix = self.prefix.as_deref().unwrap_or("");
        match event {
            // Прогресс и субтитры идут каждый тик
            PlayerEvent::Progress(_) | PlayerEvent::Caption { .. } => {
                log::trace!("{}{:?}", prefix, event)
            }
            PlayerEvent::Advisory(advisory) => log::warn!("{}{}", prefix, advisory),
            _ => log::info!("{}{:?}", prefix, event),
        }
    }
}

/// Наблюдатель, сохраняющий события в памяти
#[derive(Debug, Clone, Default)]
pub struct MemoryObserver {
    history: Arc<Mutex<Vec<PlayerEvent>>>,
}

impl MemoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Полученные события
    pub fn history(&self) -> Vec<PlayerEvent> {
        self.history.lock().clone()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }
}

impl PlayerObserver for MemoryObserver {
    fn on_event(&self, event: &PlayerEvent) {
        self.history.lock().push(event.clone());
    }
}

/// Наблюдатель, записывающий события в файл журнала (JSON по строке)
#[derive(Debug)]
pub struct JournalObserver {
    path: PathBuf,
}

impl JournalObserver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PlayerObserver for JournalObserver {
    fn on_event(&self, event: &PlayerEvent) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                log::warn!("Failed to serialize event for journal: {}", e);
                return;
            }
        };
        let entry = format!("[{}] {}\n", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"), json);

        match std::fs::OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(mut file) => {
                let _ = file.write_all(entry.as_bytes());
            }
            Err(e) => log::warn!("Failed to open journal {}: {}", self.path.display(), e),
        }
    }
}

/// Наблюдатель, пересылающий события в канал
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<PlayerEvent>,
}

impl ChannelObserver {
    pub fn new(sender: mpsc::UnboundedSender<PlayerEvent>) -> Self {
        Self { sender }
    }
}

impl PlayerObserver for ChannelObserver {
    fn on_event(&self, event: &PlayerEvent) {
        let _ = self.sender.send(event.clone());
    }
}

/// Наблюдатель, вызывающий функцию обратного вызова
pub struct CallbackObserver<F>
where
    F: Fn(&PlayerEvent) + Send + Sync + 'static,
{
    callback: F,
}

impl<F> CallbackObserver<F>
where
    F: Fn(&PlayerEvent) + Send + Sync + 'static,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> PlayerObserver for CallbackObserver<F>
where
    F: Fn(&PlayerEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: &PlayerEvent) {
        (self.callback)(event);
    }
}

/// Комбинированный наблюдатель
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Box<dyn PlayerObserver>>,
}

impl CompositeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавить наблюдателя
    pub fn add_observer(&mut self, observer: Box<dyn PlayerObserver>) {
        self.observers.push(observer);
    }

    pub fn clear(&mut self) {
        self.observers.clear();
    }
}

impl PlayerObserver for CompositeObserver {
    fn on_event(&self, event: &PlayerEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}
