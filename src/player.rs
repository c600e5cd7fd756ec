//! Плеер слайдов курса
//!
//! [`SlidePlayer`] владеет всем состоянием текущего просмотра: движком
//! озвучки, трекером прогресса, субтитрами и правилами навигации. Плеер
//! синхронный и не знает о времени сам по себе: хост передаёт прошедшее время
//! в [`SlidePlayer::tick`], а события синтезатора в
//! [`SlidePlayer::handle_narration_event`]. Запросы к бэкенду копятся в
//! очереди ([`SlidePlayer::take_requests`]) и выполняются хостом.
//!
//! Любая смена слайда проходит через одну процедуру: сначала всё старое
//! останавливается (озвучка, таймеры, индикатор перемотки), затем
//! загружается новый слайд.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bridge::PreparedAssessment;
use crate::config::PlayerConfig;
use crate::error::{PlayerError, Result};
use crate::events::{Advisory, EventHub, PlayerEvent, PlayerObserver, SkipDirection, SkipFeedback};
use crate::gate::{Direction, GateDecision, NavigationGate};
use crate::narration::{
    NarrationBackend, NarrationEngine, NarrationEvent, NarrationPhase, NarrationSignal, PlaybackState,
    SkipOutcome,
};
use crate::progress::{estimate_duration, ProgressState, ProgressTracker, ProgressUpdate, FULL_PROGRESS};
use crate::slide::{CourseScript, Slide};
use crate::subtitle::SubtitleSynchronizer;
use crate::timer::{TimerGauge, TimerGuard};

/// Запрос к бэкенду, который должен выполнить хост
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeRequest {
    /// Сохранить прохождение слайдов (номера с единицы)
    ReportProgress { slide_numbers: Vec<u32> },
    /// Подготовить тест по курсу
    PrepareAssessment,
}

/// Результат навигации
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationOutcome {
    Moved { from: usize, to: usize },
    Stayed,
    Rejected(Advisory),
    /// Курс завершён, тест готовится
    Completed,
}

/// Состояние подготовки теста
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    #[default]
    Idle,
    Preparing,
    Ready,
}

/// Снимок состояния для интерфейса
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub index: usize,
    pub slide_count: usize,
    pub slide: Option<Slide>,
    pub progress: ProgressState,
    pub phase: NarrationPhase,
    pub playback: PlaybackState,
    pub caption: Option<String>,
    pub skip_feedback: Option<SkipFeedback>,
    pub assessment: AssessmentStatus,
}

/// Индикатор перемотки с обратным отсчётом
#[derive(Debug)]
struct FeedbackTimer {
    direction: SkipDirection,
    remaining: Duration,
    _guard: TimerGuard,
}

/// Плеер слайдов
pub struct SlidePlayer {
    config: PlayerConfig,
    script: CourseScript,
    current: usize,
    narration: NarrationEngine,
    tracker: ProgressTracker,
    gate: NavigationGate,
    subtitles: SubtitleSynchronizer,
    feedback: Option<FeedbackTimer>,
    hub: Arc<EventHub>,
    outbox: Vec<BridgeRequest>,
    /// Номера слайдов, которые не удалось сохранить
    unsynced: BTreeSet<u32>,
    assessment: AssessmentStatus,
    progress_gauge: TimerGauge,
    caption_gauge: TimerGauge,
    feedback_gauge: TimerGauge,
    started: bool,
    shut_down: bool,
}

impl std::fmt::Debug for SlidePlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidePlayer")
            .field("course", &self.script.course_id())
            .field("current", &self.current)
            .field("narration", &self.narration)
            .field("progress", &self.tracker.state())
            .field("assessment", &self.assessment)
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}

impl SlidePlayer {
    /// Создать плеер. Первый слайд открывается вызовом [`SlidePlayer::start`].
    pub fn new(config: PlayerConfig, script: CourseScript, backend: Box<dyn NarrationBackend>) -> Result<Self> {
        config.validate()?;
        if script.is_empty() {
            return Err(PlayerError::EmptyCourse(script.course_id().to_string()));
        }

        let progress_gauge = TimerGauge::new();
        let caption_gauge = TimerGauge::new();

        Ok(Self {
            narration: NarrationEngine::new(backend, &config),
            tracker: ProgressTracker::from_config(&config, progress_gauge.clone()),
            gate: NavigationGate::from_config(&config),
            subtitles: SubtitleSynchronizer::new(config.caption_interval(), caption_gauge.clone()),
            feedback: None,
            hub: Arc::new(EventHub::new()),
            outbox: Vec::new(),
            unsynced: BTreeSet::new(),
            assessment: AssessmentStatus::Idle,
            progress_gauge,
            caption_gauge,
            feedback_gauge: TimerGauge::new(),
            current: 0,
            config,
            script,
            started: false,
            shut_down: false,
        })
    }

    /// Открыть первый слайд
    pub fn start(&mut self) -> Result<()> {
        self.ensure_running()?;
        if !self.started {
            self.started = true;
            log::info!(
                "Starting course {} ({} slides)",
                self.script.course_id(),
                self.script.len()
            );
            self.on_slide_change(0);
        }
        Ok(())
    }

    /// Реестр наблюдателей плеера
    pub fn hub(&self) -> Arc<EventHub> {
        self.hub.clone()
    }

    /// Добавить наблюдателя
    pub fn add_observer(&self, observer: Box<dyn PlayerObserver>) -> usize {
        self.hub.add_observer(observer)
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_slide(&self) -> Option<&Slide> {
        self.script.slide(self.current)
    }

    pub fn slides(&self) -> &[Slide] {
        self.script.slides()
    }

    pub fn is_last_slide(&self) -> bool {
        self.current + 1 == self.script.len()
    }

    pub fn progress(&self) -> ProgressState {
        self.tracker.state()
    }

    pub fn narration_phase(&self) -> NarrationPhase {
        self.narration.phase()
    }

    pub fn playback(&self) -> &PlaybackState {
        self.narration.playback()
    }

    pub fn caption(&self) -> Option<&str> {
        self.subtitles.caption()
    }

    pub fn skip_feedback(&self) -> Option<SkipFeedback> {
        self.feedback.as_ref().map(|f| SkipFeedback { direction: f.direction })
    }

    pub fn assessment_status(&self) -> AssessmentStatus {
        self.assessment
    }

    /// Номера слайдов, ожидающие повторного сохранения
    pub fn unsynced_slides(&self) -> Vec<u32> {
        self.unsynced.iter().copied().collect()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Счётчик таймеров прогресса
    pub fn progress_timers(&self) -> &TimerGauge {
        &self.progress_gauge
    }

    /// Счётчик таймеров субтитров
    pub fn caption_timers(&self) -> &TimerGauge {
        &self.caption_gauge
    }

    /// Счётчик таймеров индикатора перемотки
    pub fn feedback_timers(&self) -> &TimerGauge {
        &self.feedback_gauge
    }

    /// Все живые таймеры плеера
    pub fn active_timers(&self) -> usize {
        self.progress_gauge.active() + self.caption_gauge.active() + self.feedback_gauge.active()
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            index: self.current,
            slide_count: self.script.len(),
            slide: self.current_slide().cloned(),
            progress: self.tracker.state(),
            phase: self.narration.phase(),
            playback: self.narration.playback().clone(),
            caption: self.caption().map(str::to_string),
            skip_feedback: self.skip_feedback(),
            assessment: self.assessment,
        }
    }

    /// Забрать накопившиеся запросы к бэкенду
    pub fn take_requests(&mut self) -> Vec<BridgeRequest> {
        std::mem::take(&mut self.outbox)
    }

    // Навигация

    /// Следующий слайд
    pub fn next(&mut self) -> Result<NavigationOutcome> {
        self.ensure_running()?;
        if self.is_last_slide() {
            return Ok(self.reject(Advisory::UseCompleteAction));
        }
        self.navigate(self.current + 1)
    }

    /// Предыдущий слайд
    pub fn previous(&mut self) -> Result<NavigationOutcome> {
        self.ensure_running()?;
        if self.current == 0 {
            return Ok(NavigationOutcome::Stayed);
        }
        self.navigate(self.current - 1)
    }

    /// Перейти к слайду по индексу
    pub fn select(&mut self, index: usize) -> Result<NavigationOutcome> {
        self.ensure_running()?;
        if index >= self.script.len() {
            return Err(PlayerError::InvalidSlide {
                index,
                count: self.script.len(),
            });
        }
        self.navigate(index)
    }

    /// Завершить курс с последнего слайда и запросить тест
    pub fn complete(&mut self) -> Result<NavigationOutcome> {
        self.ensure_running()?;
        match self.assessment {
            AssessmentStatus::Preparing => return Ok(self.reject(Advisory::AssessmentInProgress)),
            AssessmentStatus::Ready => return Ok(NavigationOutcome::Completed),
            AssessmentStatus::Idle => {}
        }

        if let GateDecision::Rejected(advisory) = self.gate.check_complete(self.is_last_slide(), &self.tracker.state())
        {
            return Ok(self.reject(advisory));
        }

        log::info!("Course {} completed, preparing assessment", self.script.course_id());
        let already_reported = self.current_slide().map_or(false, |s| s.completed) && self.unsynced.is_empty();
        if !already_reported {
            self.mark_slide_completed(self.current);
        }
        self.assessment = AssessmentStatus::Preparing;
        self.outbox.push(BridgeRequest::PrepareAssessment);
        self.emit(PlayerEvent::AssessmentPreparing);
        Ok(NavigationOutcome::Completed)
    }

    fn navigate(&mut self, target: usize) -> Result<NavigationOutcome> {
        let from = self.current;
        match self.gate.check_move(from, target, &self.tracker.state()) {
            GateDecision::Rejected(advisory) => Ok(self.reject(advisory)),
            GateDecision::Allowed(Direction::Stay) => Ok(NavigationOutcome::Stayed),
            GateDecision::Allowed(Direction::Backward) => {
                self.on_slide_change(target);
                Ok(NavigationOutcome::Moved { from, to: target })
            }
            GateDecision::Allowed(Direction::Forward) => {
                self.mark_slide_completed(from);
                self.on_slide_change(target);
                Ok(NavigationOutcome::Moved { from, to: target })
            }
        }
    }

    /// Отметить слайд пройденным и поставить в очередь его сохранение
    /// вместе с ранее не сохранёнными
    fn mark_slide_completed(&mut self, index: usize) {
        if self.script.mark_completed(index) {
            self.emit(PlayerEvent::SlideCompleted { index });
        }
        let mut slide_numbers: Vec<u32> = std::mem::take(&mut self.unsynced).into_iter().collect();
        let number = self.script.slide_number(index);
        if !slide_numbers.contains(&number) {
            slide_numbers.push(number);
        }
        self.outbox.push(BridgeRequest::ReportProgress { slide_numbers });
    }

    fn reject(&mut self, advisory: Advisory) -> NavigationOutcome {
        log::debug!("Rejected: {}", advisory);
        self.emit(PlayerEvent::Advisory(advisory.clone()));
        NavigationOutcome::Rejected(advisory)
    }

    /// Единая процедура смены слайда: остановка старого, загрузка нового
    fn on_slide_change(&mut self, index: usize) {
        self.teardown();
        self.current = index;

        let title = self.current_slide().map(|s| s.title.clone()).unwrap_or_default();
        let slide_number = self.script.slide_number(index);
        log::info!("Slide {} of {}: {}", slide_number, self.script.len(), title);
        self.emit(PlayerEvent::SlideChanged {
            index,
            slide_number,
            title,
        });
        self.emit(PlayerEvent::Progress(self.tracker.state()));

        let text = self.script.narration(index).unwrap_or_default().to_string();
        match self.narration.load_text(&text) {
            Ok(()) => {
                self.subtitles.load(&text);
                if let Some(caption) = self.subtitles.caption().map(str::to_string) {
                    self.emit(PlayerEvent::Caption { text: caption });
                }
                if self.config.autoplay {
                    self.play_narration();
                }
            }
            Err(e) => {
                log::warn!("Slide {} has no narration: {}", slide_number, e);
                self.emit(PlayerEvent::Advisory(Advisory::ContentUnavailable { slide_number }));
            }
        }
        self.emit_narration();
    }

    /// Остановить всё, что связано с текущим слайдом
    fn teardown(&mut self) {
        self.narration.cancel();
        self.tracker.reset();
        self.subtitles.clear();
        self.clear_feedback();
    }

    // Воспроизведение

    /// Запустить или продолжить озвучку
    pub fn play(&mut self) -> Result<()> {
        self.ensure_running()?;
        self.play_narration();
        self.emit_narration();
        Ok(())
    }

    /// Поставить озвучку на паузу
    pub fn pause(&mut self) -> Result<()> {
        self.ensure_running()?;
        if self.narration.pause() {
            self.stop_timers();
            self.emit_narration();
        }
        Ok(())
    }

    /// Переключить воспроизведение
    pub fn toggle_playback(&mut self) -> Result<()> {
        match self.narration.phase() {
            NarrationPhase::Playing | NarrationPhase::Loading => self.pause(),
            _ => self.play(),
        }
    }

    /// Изменить скорость озвучки (0.5 - 2.0).
    ///
    /// Идущая озвучка начинается заново с новой скоростью, прогресс
    /// сохраняется и продолжает расти с момента нового старта.
    pub fn set_rate(&mut self, rate: f64) -> Result<()> {
        self.ensure_running()?;
        match self.narration.set_rate(rate) {
            Ok(true) => self.stop_timers(),
            Ok(false) => {}
            Err(e) => {
                self.stop_timers();
                self.narration_failed(e.to_string());
            }
        }
        self.emit_narration();
        Ok(())
    }

    /// Установить громкость (0 - 100)
    pub fn set_volume(&mut self, volume: u8) -> Result<()> {
        self.ensure_running()?;
        self.narration.set_volume(volume);
        self.emit_narration();
        Ok(())
    }

    /// Переключить звук
    pub fn toggle_mute(&mut self) -> Result<bool> {
        self.ensure_running()?;
        let muted = self.narration.toggle_mute();
        self.emit_narration();
        Ok(muted)
    }

    /// Перемотать на шаг из конфигурации
    pub fn skip(&mut self, direction: SkipDirection) -> Result<()> {
        self.ensure_running()?;
        let progress = self.tracker.progress();

        match self.narration.skip(direction, self.config.skip_seconds, progress) {
            Ok(SkipOutcome::NoContent) => return Ok(()),
            Ok(SkipOutcome::Moved { fraction, restarted, .. }) => {
                if restarted {
                    self.stop_timers();
                }
                let update = self.tracker.seek_to_fraction(fraction);
                self.emit_progress(update);
                let progress = self.tracker.progress();
                if let Some(caption) = self.subtitles.sync_to(progress) {
                    self.emit(PlayerEvent::Caption { text: caption });
                }
            }
            Ok(SkipOutcome::Completed) => self.narration_completed(),
            Err(e) => {
                self.stop_timers();
                self.narration_failed(e.to_string());
            }
        }

        self.raise_feedback(direction);
        self.emit_narration();
        Ok(())
    }

    /// Продвинуть таймеры на прошедшее время
    pub fn tick(&mut self, elapsed: Duration) {
        if self.shut_down {
            return;
        }

        let update = self.tracker.advance(elapsed);
        self.emit_progress(update);

        if let Some(caption) = self.subtitles.advance(elapsed, self.tracker.progress()) {
            self.emit(PlayerEvent::Caption { text: caption });
        }

        let expired = match self.feedback.as_mut() {
            Some(feedback) if elapsed >= feedback.remaining => true,
            Some(feedback) => {
                feedback.remaining -= elapsed;
                false
            }
            None => false,
        };
        if expired {
            self.clear_feedback();
        }

        if update.finished {
            self.maybe_auto_complete();
        }
    }

    /// Обработать событие синтезатора
    pub fn handle_narration_event(&mut self, event: &NarrationEvent) {
        if self.shut_down {
            log::debug!("Ignoring {:?} after shutdown", event.kind);
            return;
        }

        let signal = match self.narration.handle_event(event) {
            Some(signal) => signal,
            None => return,
        };

        match signal {
            NarrationSignal::Started | NarrationSignal::Resumed => {
                let estimated = estimate_duration(
                    self.narration.text_len(),
                    self.narration.playback().playback_rate,
                    self.config.chars_per_second,
                );
                self.tracker.start(estimated);
                self.subtitles.start();
            }
            NarrationSignal::Paused => self.stop_timers(),
            NarrationSignal::Completed => self.narration_completed(),
            NarrationSignal::Failed(message) => {
                self.stop_timers();
                self.narration_failed(message);
            }
        }
        self.emit_narration();
    }

    // Результаты запросов к бэкенду

    /// Результат сохранения прогресса слайда
    pub fn on_progress_reported(&mut self, slide_number: u32, result: Result<()>) {
        match result {
            Ok(()) => {
                self.unsynced.remove(&slide_number);
            }
            Err(e) => {
                log::warn!("Slide {} will be re-sent on next navigation: {}", slide_number, e);
                self.unsynced.insert(slide_number);
                if !self.shut_down {
                    self.emit(PlayerEvent::Advisory(Advisory::ProgressReportFailed {
                        slide_number,
                        message: e.to_string(),
                    }));
                }
            }
        }
    }

    /// Результат подготовки теста
    pub fn on_assessment_prepared(&mut self, result: Result<PreparedAssessment>) {
        if self.shut_down {
            return;
        }
        match result {
            Ok(prepared) => {
                self.assessment = AssessmentStatus::Ready;
                self.emit(PlayerEvent::AssessmentReady(prepared));
            }
            Err(e) => {
                // Можно снова нажать «Завершить»
                self.assessment = AssessmentStatus::Idle;
                self.emit(PlayerEvent::Advisory(Advisory::AssessmentFailed { message: e.to_string() }));
            }
        }
    }

    /// Остановить плеер: озвучка прерывается, таймеры снимаются, дальнейшие
    /// события игнорируются
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        log::info!("Shutting down player for course {}", self.script.course_id());
        self.teardown();
        self.outbox.clear();
        self.shut_down = true;
        self.emit(PlayerEvent::ShutDown);
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shut_down {
            Err(PlayerError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn play_narration(&mut self) {
        if let Err(e) = self.narration.play() {
            self.narration_failed(e.to_string());
        }
    }

    fn narration_completed(&mut self) {
        self.subtitles.stop();
        let update = self.tracker.complete();
        self.emit_progress(update);
        if let Some(caption) = self.subtitles.sync_to(FULL_PROGRESS) {
            self.emit(PlayerEvent::Caption { text: caption });
        }
        self.emit(PlayerEvent::NarrationCompleted);
        self.maybe_auto_complete();
    }

    fn narration_failed(&mut self, message: String) {
        self.emit(PlayerEvent::Advisory(Advisory::NarrationFailed { message }));
    }

    fn maybe_auto_complete(&mut self) {
        if !self.config.auto_complete
            || !self.is_last_slide()
            || self.assessment != AssessmentStatus::Idle
            || !self.tracker.state().reached(self.gate.completion_threshold())
        {
            return;
        }
        log::info!("Last slide finished, completing course automatically");
        if let Err(e) = self.complete() {
            log::warn!("Automatic completion failed: {}", e);
        }
    }

    fn stop_timers(&mut self) {
        self.tracker.stop();
        self.subtitles.stop();
    }

    fn raise_feedback(&mut self, direction: SkipDirection) {
        // Новый индикатор заменяет прежний
        self.feedback = None;
        self.feedback = Some(FeedbackTimer {
            direction,
            remaining: self.config.skip_feedback(),
            _guard: self.feedback_gauge.arm(),
        });
        self.emit(PlayerEvent::SkipFeedback { direction: Some(direction) });
    }

    fn clear_feedback(&mut self) {
        if self.feedback.take().is_some() {
            self.emit(PlayerEvent::SkipFeedback { direction: None });
        }
    }

    fn emit_progress(&self, update: ProgressUpdate) {
        if update.changed {
            self.emit(PlayerEvent::Progress(self.tracker.state()));
        }
        if update.unlocked {
            log::info!("Slide {} unlocked", self.script.slide_number(self.current));
            self.emit(PlayerEvent::AdvanceUnlocked);
        }
    }

    fn emit_narration(&self) {
        self.emit(PlayerEvent::Narration {
            phase: self.narration.phase(),
            playback: self.narration.playback().clone(),
        });
    }

    fn emit(&self, event: PlayerEvent) {
        self.hub.notify(&event);
    }
}

impl Drop for SlidePlayer {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narration::{BackendCall, NarrationEventKind, RecordingBackend};
    use crate::notification::MemoryObserver;
    use crate::slide::Explanation;

    fn script(texts: &[&str]) -> CourseScript {
        let explanations = texts
            .iter()
            .enumerate()
            .map(|(i, text)| Explanation {
                slide: i as u32 + 1,
                content: format!("Slide {} content", i + 1),
                explanation: text.to_string(),
            })
            .collect();
        CourseScript::from_explanations("course-1", explanations).unwrap()
    }

    fn player_with(config: PlayerConfig, texts: &[&str]) -> (SlidePlayer, RecordingBackend, MemoryObserver) {
        let backend = RecordingBackend::new();
        let memory = MemoryObserver::new();
        let mut player = SlidePlayer::new(config, script(texts), Box::new(backend.clone())).unwrap();
        player.add_observer(Box::new(memory.clone()));
        player.start().unwrap();
        (player, backend, memory)
    }

    fn player(texts: &[&str]) -> (SlidePlayer, RecordingBackend, MemoryObserver) {
        player_with(PlayerConfig::default(), texts)
    }

    /// Синтезатор сообщает о событии текущей фразы
    fn backend_event(player: &mut SlidePlayer, backend: &RecordingBackend, kind: NarrationEventKind) {
        let event = backend.event(kind).expect("no active utterance");
        player.handle_narration_event(&event);
    }

    fn advisories(memory: &MemoryObserver) -> Vec<Advisory> {
        memory
            .history()
            .into_iter()
            .filter_map(|event| match event {
                PlayerEvent::Advisory(advisory) => Some(advisory),
                _ => None,
            })
            .collect()
    }

    fn long_text() -> String {
        "a".repeat(2500)
    }

    #[test]
    fn test_start_speaks_first_slide() {
        let (player, backend, memory) = player(&["Welcome to the course.", "Second."]);

        assert_eq!(backend.spoken().len(), 1);
        assert_eq!(backend.spoken()[0].1, "Welcome to the course.");
        assert_eq!(player.narration_phase(), NarrationPhase::Loading);
        assert_eq!(player.progress(), ProgressState::default());
        assert!(memory.history().contains(&PlayerEvent::SlideChanged {
            index: 0,
            slide_number: 1,
            title: "Slide 1 content".into(),
        }));
    }

    #[test]
    fn test_normal_completion_latches_at_eighty_percent() {
        let text = long_text();
        let (mut player, backend, memory) = player(&[&text, "Next slide."]);
        backend_event(&mut player, &backend, NarrationEventKind::Start);
        assert_eq!(player.progress_timers().active(), 1);

        player.tick(Duration::from_millis(79_900));
        assert!(!player.progress().can_advance);
        assert!(matches!(player.next().unwrap(), NavigationOutcome::Rejected(_)));

        player.tick(Duration::from_millis(100));
        assert!(player.progress().can_advance);
        assert!(memory.history().contains(&PlayerEvent::AdvanceUnlocked));

        player.tick(Duration::from_millis(20_000));
        assert_eq!(player.progress().progress, 100.0);
        assert_eq!(player.progress_timers().active(), 0);

        backend_event(&mut player, &backend, NarrationEventKind::End);
        assert_eq!(player.narration_phase(), NarrationPhase::Completed);
        assert!(memory.history().contains(&PlayerEvent::NarrationCompleted));
    }

    #[test]
    fn test_gate_rejects_below_threshold() {
        let text = long_text();
        let (mut player, backend, memory) = player(&[&text, "Next slide."]);
        backend_event(&mut player, &backend, NarrationEventKind::Start);

        player.tick(Duration::from_millis(79_000));
        let outcome = player.next().unwrap();
        assert!(matches!(
            outcome,
            NavigationOutcome::Rejected(Advisory::NavigationRejected { required, .. }) if required == 80.0
        ));
        assert_eq!(player.current_index(), 0);
        assert_eq!(advisories(&memory).len(), 1);
        assert_eq!(advisories(&memory)[0].to_string(), "complete at least 80% before continuing");

        // Отказ не трогает озвучку и прогресс
        assert_eq!(player.narration_phase(), NarrationPhase::Playing);
        assert!((player.progress().progress - 79.0).abs() < 1e-6);
    }

    #[test]
    fn test_backward_navigation_at_zero_progress() {
        let (mut player, backend, _) = player(&["One.", "Two."]);
        backend_event(&mut player, &backend, NarrationEventKind::End);
        assert!(matches!(player.next().unwrap(), NavigationOutcome::Moved { from: 0, to: 1 }));
        assert_eq!(player.progress().progress, 0.0);

        assert_eq!(player.previous().unwrap(), NavigationOutcome::Moved { from: 1, to: 0 });
        assert_eq!(player.previous().unwrap(), NavigationOutcome::Stayed);
    }

    #[test]
    fn test_forward_navigation_marks_and_reports() {
        let (mut player, backend, memory) = player(&["One.", "Two.", "Three."]);
        backend_event(&mut player, &backend, NarrationEventKind::End);
        player.next().unwrap();

        assert!(player.slides()[0].completed);
        assert!(!player.slides()[1].completed);
        assert!(memory.history().contains(&PlayerEvent::SlideCompleted { index: 0 }));
        assert_eq!(
            player.take_requests(),
            vec![BridgeRequest::ReportProgress { slide_numbers: vec![1] }]
        );

        // Сбой сохранения: локальная отметка остаётся, номер уходит повторно
        player.on_progress_reported(1, Err(PlayerError::Persistence("offline".into())));
        assert!(player.slides()[0].completed);
        assert_eq!(player.unsynced_slides(), vec![1]);
        assert!(matches!(
            advisories(&memory).last(),
            Some(Advisory::ProgressReportFailed { slide_number: 1, .. })
        ));

        backend_event(&mut player, &backend, NarrationEventKind::End);
        player.next().unwrap();
        assert_eq!(
            player.take_requests(),
            vec![BridgeRequest::ReportProgress { slide_numbers: vec![1, 2] }]
        );
        player.on_progress_reported(1, Ok(()));
        player.on_progress_reported(2, Ok(()));
        assert!(player.unsynced_slides().is_empty());
    }

    #[test]
    fn test_slide_change_cancels_before_speaking() {
        let (mut player, backend, _) = player(&["One.", "Two."]);
        backend_event(&mut player, &backend, NarrationEventKind::Start);
        let stale = NarrationEvent::new(player.narration.active_utterance().unwrap(), NarrationEventKind::End);

        player.tick(Duration::from_secs(1));
        assert!(player.progress().can_advance);
        player.next().unwrap();

        let calls = backend.calls();
        let cancel = calls.iter().rposition(|c| *c == BackendCall::Cancel).unwrap();
        let speak = calls.iter().rposition(|c| matches!(c, BackendCall::Speak { .. })).unwrap();
        assert!(cancel < speak);
        assert_eq!(backend.overlapping_speaks(), 0);

        // Конец старой фразы не засчитывается новому слайду
        player.handle_narration_event(&stale);
        assert_eq!(player.progress(), ProgressState::default());
        assert_eq!(player.narration_phase(), NarrationPhase::Loading);
    }

    #[test]
    fn test_single_progress_timer_under_rapid_changes() {
        let text = long_text();
        let (mut player, backend, _) = player(&[&text]);
        backend_event(&mut player, &backend, NarrationEventKind::Start);

        for i in 0..10 {
            let rate = if i % 2 == 0 { 2.0 } else { 0.5 };
            player.set_rate(rate).unwrap();
            backend_event(&mut player, &backend, NarrationEventKind::Start);
            player.skip(SkipDirection::Forward).unwrap();
            backend_event(&mut player, &backend, NarrationEventKind::Start);
            player.skip(SkipDirection::Backward).unwrap();
            backend_event(&mut player, &backend, NarrationEventKind::Start);
            player.tick(Duration::from_millis(300));

            let progress = player.progress().progress;
            assert!((0.0..=100.0).contains(&progress));
        }
        assert_eq!(player.progress_timers().peak(), 1);
        assert_eq!(player.caption_timers().peak(), 1);
        assert_eq!(backend.overlapping_speaks(), 0);
    }

    #[test]
    fn test_rate_change_keeps_progress_without_double_counting() {
        let text = long_text();
        let (mut player, backend, _) = player(&[&text]);
        backend_event(&mut player, &backend, NarrationEventKind::Start);
        player.tick(Duration::from_secs(10));
        let before = player.progress().progress;
        assert!((before - 10.0).abs() < 1e-6);

        player.set_rate(2.0).unwrap();
        assert_eq!(backend.spoken().last().unwrap().1, text);
        assert_eq!(player.progress_timers().active(), 0);

        // Пока новая фраза не началась, прогресс стоит
        player.tick(Duration::from_secs(5));
        assert_eq!(player.progress().progress, before);

        backend_event(&mut player, &backend, NarrationEventKind::Start);
        // При скорости 2.0 вся озвучка 50 с, секунда = 2%
        player.tick(Duration::from_secs(1));
        assert!((player.progress().progress - 12.0).abs() < 1e-6);
        assert_eq!(player.progress_timers().active(), 1);
    }

    #[test]
    fn test_skip_past_end_completes() {
        let (mut player, backend, memory) = player(&["Short narration text.", "Next."]);
        backend_event(&mut player, &backend, NarrationEventKind::Start);

        player.skip(SkipDirection::Forward).unwrap();
        assert_eq!(player.progress().progress, 100.0);
        assert!(player.progress().can_advance);
        assert_eq!(player.narration_phase(), NarrationPhase::Completed);
        assert!(memory.history().contains(&PlayerEvent::NarrationCompleted));
        assert_eq!(player.skip_feedback(), Some(SkipFeedback { direction: SkipDirection::Forward }));
        assert_eq!(player.progress_timers().active(), 0);
    }

    #[test]
    fn test_skip_recomputes_progress_and_keeps_latch() {
        let text = long_text();
        let (mut player, backend, _) = player(&[&text]);
        backend_event(&mut player, &backend, NarrationEventKind::Start);
        player.tick(Duration::from_secs(85));
        assert!(player.progress().can_advance);

        player.skip(SkipDirection::Backward).unwrap();
        // 85% от 2500 = 2125, минус 250 символов = 1875 = 75%
        assert!((player.progress().progress - 75.0).abs() < 1e-6);
        assert!(player.progress().can_advance);
        assert_eq!(backend.spoken().last().unwrap().1.len(), 625);
    }

    #[test]
    fn test_skip_feedback_clears_after_timeout() {
        let (mut player, _, memory) = player(&[&long_text()]);
        player.skip(SkipDirection::Backward).unwrap();
        assert_eq!(player.feedback_timers().active(), 1);

        player.tick(Duration::from_millis(400));
        assert!(player.skip_feedback().is_some());
        player.tick(Duration::from_millis(100));
        assert!(player.skip_feedback().is_none());
        assert_eq!(player.feedback_timers().active(), 0);
        assert_eq!(
            memory.history().last(),
            Some(&PlayerEvent::SkipFeedback { direction: None })
        );
    }

    #[test]
    fn test_content_unavailable() {
        // Пустое объяснение заменяется содержимым слайда
        let (_, backend, _) = player(&["", "Two."]);
        assert_eq!(backend.spoken()[0].1, "Slide 1 content");

        let explanations = vec![Explanation { slide: 1, content: " ".into(), explanation: "".into() }];
        let script = CourseScript::from_explanations("course-2", explanations).unwrap();
        let backend = RecordingBackend::new();
        let mut empty = SlidePlayer::new(PlayerConfig::default(), script, Box::new(backend.clone())).unwrap();
        let memory2 = MemoryObserver::new();
        empty.add_observer(Box::new(memory2.clone()));
        empty.start().unwrap();

        assert!(backend.spoken().is_empty());
        assert_eq!(empty.progress(), ProgressState::default());
        assert!(advisories(&memory2).contains(&Advisory::ContentUnavailable { slide_number: 1 }));
        empty.play().unwrap();
        empty.tick(Duration::from_secs(100));
        assert!(!empty.progress().can_advance);
    }

    #[test]
    fn test_narration_error_allows_retry() {
        let (mut player, backend, memory) = player(&["Retry this narration."]);
        backend_event(&mut player, &backend, NarrationEventKind::Start);
        player.tick(Duration::from_millis(200));

        backend_event(&mut player, &backend, NarrationEventKind::Error("synthesis-failed".into()));
        assert_eq!(player.narration_phase(), NarrationPhase::Paused);
        assert_eq!(player.progress_timers().active(), 0);
        assert!(matches!(advisories(&memory).last(), Some(Advisory::NarrationFailed { .. })));

        player.play().unwrap();
        assert_eq!(backend.spoken().len(), 2);
        assert_eq!(player.narration_phase(), NarrationPhase::Loading);
    }

    #[test]
    fn test_backend_failure_on_autoplay() {
        let backend = RecordingBackend::new();
        backend.fail_next_speak("no voices");
        let memory = MemoryObserver::new();
        let mut player = SlidePlayer::new(PlayerConfig::default(), script(&["Hello."]), Box::new(backend.clone())).unwrap();
        player.add_observer(Box::new(memory.clone()));
        player.start().unwrap();

        assert_eq!(player.narration_phase(), NarrationPhase::Idle);
        assert!(matches!(advisories(&memory).last(), Some(Advisory::NarrationFailed { .. })));
        player.play().unwrap();
        assert_eq!(backend.spoken().len(), 1);
    }

    #[test]
    fn test_pause_and_resume_stop_timers() {
        let (mut player, backend, _) = player(&[&long_text()]);
        backend_event(&mut player, &backend, NarrationEventKind::Start);
        player.tick(Duration::from_secs(1));

        player.toggle_playback().unwrap();
        assert_eq!(player.narration_phase(), NarrationPhase::Paused);
        assert_eq!(player.active_timers(), 0);
        player.tick(Duration::from_secs(10));
        assert!((player.progress().progress - 1.0).abs() < 1e-6);

        player.toggle_playback().unwrap();
        assert_eq!(backend.calls().last(), Some(&BackendCall::Resume));
        backend_event(&mut player, &backend, NarrationEventKind::Resume);
        assert_eq!(player.progress_timers().active(), 1);
        player.tick(Duration::from_secs(1));
        assert!((player.progress().progress - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_select_bounds_and_last_slide() {
        let (mut player, backend, memory) = player(&["One.", "Two."]);
        let err = player.select(5).unwrap_err();
        assert!(matches!(err, PlayerError::InvalidSlide { index: 5, count: 2 }));

        backend_event(&mut player, &backend, NarrationEventKind::End);
        assert!(matches!(player.select(1).unwrap(), NavigationOutcome::Moved { from: 0, to: 1 }));
        assert_eq!(player.select(1).unwrap(), NavigationOutcome::Stayed);
        assert_eq!(player.next().unwrap(), NavigationOutcome::Rejected(Advisory::UseCompleteAction));
        assert!(advisories(&memory).contains(&Advisory::UseCompleteAction));
    }

    #[test]
    fn test_complete_flow() {
        let (mut player, backend, memory) = player(&["One.", "Two."]);
        assert_eq!(player.complete().unwrap(), NavigationOutcome::Rejected(Advisory::NotFinalSlide));

        backend_event(&mut player, &backend, NarrationEventKind::End);
        player.next().unwrap();
        player.take_requests();

        backend_event(&mut player, &backend, NarrationEventKind::Start);
        assert!(matches!(
            player.complete().unwrap(),
            NavigationOutcome::Rejected(Advisory::CompletionRequired { .. })
        ));

        backend_event(&mut player, &backend, NarrationEventKind::End);
        assert_eq!(player.complete().unwrap(), NavigationOutcome::Completed);
        assert!(player.slides()[1].completed);
        assert_eq!(
            player.take_requests(),
            vec![
                BridgeRequest::ReportProgress { slide_numbers: vec![2] },
                BridgeRequest::PrepareAssessment
            ]
        );

        // Повторное нажатие, пока тест готовится
        assert_eq!(player.complete().unwrap(), NavigationOutcome::Rejected(Advisory::AssessmentInProgress));
        assert!(player.take_requests().is_empty());

        // Сбой подготовки: слушатель остаётся на слайде и может повторить
        player.on_assessment_prepared(Err(PlayerError::AssessmentPreparation("generation: down".into())));
        assert_eq!(player.assessment_status(), AssessmentStatus::Idle);
        assert_eq!(player.current_index(), 1);
        assert!(matches!(advisories(&memory).last(), Some(Advisory::AssessmentFailed { .. })));

        assert_eq!(player.complete().unwrap(), NavigationOutcome::Completed);
        assert_eq!(player.take_requests(), vec![BridgeRequest::PrepareAssessment]);
        let prepared = PreparedAssessment {
            course_id: "course-1".into(),
            questions: vec![serde_json::json!({"q": "?"})],
            stored_at: None,
        };
        player.on_assessment_prepared(Ok(prepared.clone()));
        assert_eq!(player.assessment_status(), AssessmentStatus::Ready);
        assert!(memory.history().contains(&PlayerEvent::AssessmentReady(prepared)));
    }

    #[test]
    fn test_auto_complete_on_last_slide() {
        let config = PlayerConfig {
            auto_complete: true,
            ..PlayerConfig::default()
        };
        let (mut player, backend, _) = player_with(config, &["Only slide."]);
        backend_event(&mut player, &backend, NarrationEventKind::Start);
        backend_event(&mut player, &backend, NarrationEventKind::End);

        assert_eq!(player.assessment_status(), AssessmentStatus::Preparing);
        assert!(player.take_requests().contains(&BridgeRequest::PrepareAssessment));
    }

    #[test]
    fn test_shutdown_tears_everything_down() {
        let (mut player, backend, memory) = player(&[&long_text(), "Two."]);
        backend_event(&mut player, &backend, NarrationEventKind::Start);
        player.skip(SkipDirection::Forward).unwrap();
        backend_event(&mut player, &backend, NarrationEventKind::Start);
        assert!(player.active_timers() > 0);
        let utterance = player.narration.active_utterance().unwrap();

        player.shutdown();
        assert_eq!(player.active_timers(), 0);
        assert_eq!(backend.active(), None);
        assert_eq!(memory.history().last(), Some(&PlayerEvent::ShutDown));

        // Поздние события и команды ничего не меняют
        let events_before = memory.history().len();
        player.handle_narration_event(&NarrationEvent::new(utterance, NarrationEventKind::End));
        player.tick(Duration::from_secs(60));
        assert!(matches!(player.next(), Err(PlayerError::ShutDown)));
        assert!(matches!(player.play(), Err(PlayerError::ShutDown)));
        assert_eq!(memory.history().len(), events_before);
        assert_eq!(player.active_timers(), 0);
    }

    #[test]
    fn test_volume_and_mute() {
        let (mut player, backend, _) = player(&["Volume."]);
        player.set_volume(30).unwrap();
        assert_eq!(player.playback().volume, 30);
        assert!(player.toggle_mute().unwrap());
        assert_eq!(backend.calls().last(), Some(&BackendCall::SetVolume(0.0)));
        assert!(!player.toggle_mute().unwrap());
    }

    #[test]
    fn test_snapshot() {
        let (player, _, _) = player(&["First sentence. Second sentence."]);
        let snapshot = player.snapshot();
        assert_eq!(snapshot.index, 0);
        assert_eq!(snapshot.slide_count, 1);
        assert_eq!(snapshot.caption.as_deref(), Some("First sentence."));
        assert_eq!(snapshot.assessment, AssessmentStatus::Idle);
    }
}
