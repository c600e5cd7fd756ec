//! Асинхронная обвязка плеера
//!
//! Плеер живёт в одной задаче tokio. Команды интерфейса, события
//! синтезатора, тики таймера и результаты запросов к бэкенду приходят в неё
//! сообщениями и обрабатываются по одному, поэтому состояние плеера не нужно
//! защищать блокировками. Сетевые запросы выполняются в отдельных задачах и
//! не задерживают цикл.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::bridge::{PersistenceBridge, PreparedAssessment};
use crate::error::{PlayerError, Result};
use crate::events::{PlayerEvent, SkipDirection};
use crate::narration::NarrationEvent;
use crate::notification::ChannelObserver;
use crate::player::{BridgeRequest, PlayerSnapshot, SlidePlayer};

/// Размер очереди команд
const COMMAND_BUFFER: usize = 64;

/// Команда интерфейса
#[derive(Debug)]
pub enum PlayerCommand {
    Play,
    Pause,
    TogglePlayback,
    Next,
    Previous,
    Select(usize),
    Complete,
    Skip(SkipDirection),
    SetRate(f64),
    SetVolume(u8),
    ToggleMute,
    /// Запросить снимок состояния
    Snapshot(oneshot::Sender<PlayerSnapshot>),
    Shutdown,
}

/// Канал событий синтезатора
#[derive(Debug)]
pub struct NarrationChannel {
    tx: mpsc::UnboundedSender<NarrationEvent>,
    rx: mpsc::UnboundedReceiver<NarrationEvent>,
}

impl NarrationChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Отправитель для синтезатора
    pub fn sender(&self) -> mpsc::UnboundedSender<NarrationEvent> {
        self.tx.clone()
    }
}

impl Default for NarrationChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Результат запроса к бэкенду
#[derive(Debug)]
enum BridgeResult {
    Reported(Vec<(u32, Result<()>)>),
    Prepared(Result<PreparedAssessment>),
}

/// Управление запущенным плеером
#[derive(Debug)]
pub struct PlayerHandle {
    commands: mpsc::Sender<PlayerCommand>,
    narration: mpsc::UnboundedSender<NarrationEvent>,
    events: mpsc::UnboundedReceiver<PlayerEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PlayerHandle {
    /// Отправить команду
    pub async fn send(&self, command: PlayerCommand) -> Result<()> {
        self.commands.send(command).await.map_err(|_| PlayerError::ShutDown)
    }

    /// Снимок состояния плеера
    pub async fn snapshot(&self) -> Result<PlayerSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(PlayerCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| PlayerError::ShutDown)
    }

    /// Отправитель событий синтезатора (для оболочки с настоящим синтезатором)
    pub fn narration_sender(&self) -> mpsc::UnboundedSender<NarrationEvent> {
        self.narration.clone()
    }

    /// Следующее событие плеера. `None`, когда плеер остановлен и события
    /// закончились.
    pub async fn next_event(&mut self) -> Option<PlayerEvent> {
        self.events.recv().await
    }

    /// Событие, если оно уже есть
    pub fn try_next_event(&mut self) -> Option<PlayerEvent> {
        self.events.try_recv().ok()
    }

    /// Токен остановки
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Остановить плеер и дождаться завершения задачи
    pub async fn shutdown(mut self) -> Result<()> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| PlayerError::Other(anyhow::anyhow!("Player task failed: {}", e)))?;
        }
        Ok(())
    }
}

impl Drop for PlayerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Запустить плеер в отдельной задаче.
///
/// Открывает первый слайд и возвращает управление. Без `bridge` запросы к
/// бэкенду не выполняются: прогресс не сохраняется, а подготовка теста
/// завершается ошибкой.
pub fn spawn_player(
    mut player: SlidePlayer,
    bridge: Option<Arc<PersistenceBridge>>,
    narration: NarrationChannel,
) -> Result<PlayerHandle> {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    player.add_observer(Box::new(ChannelObserver::new(events_tx)));
    player.start()?;

    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
    let cancel = CancellationToken::new();
    let narration_tx = narration.sender();

    let task = tokio::spawn(run(player, bridge, commands_rx, narration.rx, cancel.clone()));

    Ok(PlayerHandle {
        commands: commands_tx,
        narration: narration_tx,
        events: events_rx,
        cancel,
        task: Some(task),
    })
}

async fn run(
    mut player: SlidePlayer,
    bridge: Option<Arc<PersistenceBridge>>,
    mut commands: mpsc::Receiver<PlayerCommand>,
    mut narration: mpsc::UnboundedReceiver<NarrationEvent>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(player.config().tick_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_tick = Instant::now();
    let mut tasks: JoinSet<BridgeResult> = JoinSet::new();

    dispatch(&mut player, &bridge, &mut tasks);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(PlayerCommand::Shutdown) | None => break,
                Some(command) => apply(&mut player, command),
            },
            Some(event) = narration.recv() => player.handle_narration_event(&event),
            now = interval.tick() => {
                player.tick(now.saturating_duration_since(last_tick));
                last_tick = now;
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => match joined {
                Ok(result) => on_bridge_result(&mut player, result),
                Err(e) => log::error!("Backend task failed: {}", e),
            },
        }
        dispatch(&mut player, &bridge, &mut tasks);
    }

    tasks.abort_all();
    player.shutdown();
    log::debug!("Player loop finished");
}

fn apply(player: &mut SlidePlayer, command: PlayerCommand) {
    let result = match command {
        PlayerCommand::Play => player.play(),
        PlayerCommand::Pause => player.pause(),
        PlayerCommand::TogglePlayback => player.toggle_playback(),
        PlayerCommand::Next => player.next().map(drop),
        PlayerCommand::Previous => player.previous().map(drop),
        PlayerCommand::Select(index) => player.select(index).map(drop),
        PlayerCommand::Complete => player.complete().map(drop),
        PlayerCommand::Skip(direction) => player.skip(direction),
        PlayerCommand::SetRate(rate) => player.set_rate(rate),
        PlayerCommand::SetVolume(volume) => player.set_volume(volume),
        PlayerCommand::ToggleMute => player.toggle_mute().map(drop),
        PlayerCommand::Snapshot(reply) => {
            let _ = reply.send(player.snapshot());
            Ok(())
        }
        PlayerCommand::Shutdown => {
            player.shutdown();
            Ok(())
        }
    };
    if let Err(e) = result {
        log::warn!("Player command failed: {}", e);
    }
}

/// Передать накопившиеся запросы в фоновые задачи
fn dispatch(player: &mut SlidePlayer, bridge: &Option<Arc<PersistenceBridge>>, tasks: &mut JoinSet<BridgeResult>) {
    for request in player.take_requests() {
        let bridge = match bridge {
            Some(bridge) => bridge.clone(),
            None => {
                log::debug!("No backend configured, dropping {:?}", request);
                if request == BridgeRequest::PrepareAssessment {
                    player.on_assessment_prepared(Err(PlayerError::Configuration(
                        "no backend configured".to_string(),
                    )));
                }
                continue;
            }
        };

        match request {
            BridgeRequest::ReportProgress { slide_numbers } => {
                tasks.spawn(async move { BridgeResult::Reported(bridge.report_many(&slide_numbers).await) });
            }
            BridgeRequest::PrepareAssessment => {
                tasks.spawn(async move { BridgeResult::Prepared(bridge.prepare_assessment().await) });
            }
        }
    }
}

fn on_bridge_result(player: &mut SlidePlayer, result: BridgeResult) {
    match result {
        BridgeResult::Reported(results) => {
            for (slide_number, result) in results {
                player.on_progress_reported(slide_number, result);
            }
        }
        BridgeResult::Prepared(result) => player.on_assessment_prepared(result),
    }
}
