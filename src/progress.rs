//! Модуль для отслеживания прогресса прослушивания слайда
//!
//! Прогресс оценивается по прошедшему времени, а не по реальной позиции
//! речи: каждый тик добавляет долю от расчётной длительности озвучки.
//! Оценка приблизительная, от неё требуется только монотонность и выход
//! на порог навигации примерно к концу озвучки.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{clamp_rate, PlayerConfig};
use crate::timer::{IntervalTimer, TimerGauge};

/// Допуск при сравнении прогресса с порогами
pub const PROGRESS_EPSILON: f64 = 1e-6;

/// Полный прогресс
pub const FULL_PROGRESS: f64 = 100.0;

/// Расчётная длительность озвучки текста.
///
/// `(длина / символов_в_секунду) × (1 / скорость)`. Модель скорости чтения
/// изолирована здесь, чтобы её можно было менять, не трогая логику навигации.
pub fn estimate_duration(text_len: usize, rate: f64, chars_per_second: f64) -> Duration {
    if text_len == 0 || !(chars_per_second > 0.0) {
        return Duration::ZERO;
    }
    let seconds = text_len as f64 / chars_per_second / clamp_rate(rate);
    Duration::from_secs_f64(seconds)
}

/// Состояние прогресса текущего слайда
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgressState {
    /// Процент прослушивания (0.0 - 100.0)
    pub progress: f64,
    /// Разрешён ли переход вперёд
    pub can_advance: bool,
}

impl ProgressState {
    /// Достигнут ли указанный порог
    pub fn reached(&self, threshold: f64) -> bool {
        self.progress + PROGRESS_EPSILON >= threshold
    }
}

/// Что изменилось после обновления прогресса
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressUpdate {
    /// Значение прогресса изменилось
    pub changed: bool,
    /// Только что открылся переход вперёд
    pub unlocked: bool,
    /// Только что достигнуты 100%
    pub finished: bool,
}

impl ProgressUpdate {
    fn merge(self, other: ProgressUpdate) -> Self {
        Self {
            changed: self.changed || other.changed,
            unlocked: self.unlocked || other.unlocked,
            finished: self.finished || other.finished,
        }
    }
}

/// Трекер прогресса слайда
#[derive(Debug)]
pub struct ProgressTracker {
    /// Текущее состояние
    state: ProgressState,
    /// Порог открытия перехода
    gate_threshold: f64,
    /// Период тика
    tick_interval: Duration,
    /// Расчётная длительность текущей озвучки
    estimated: Duration,
    /// Активный таймер (не более одного)
    timer: Option<IntervalTimer>,
    /// Счётчик таймеров прогресса
    gauge: TimerGauge,
}

impl ProgressTracker {
    /// Создать новый трекер
    pub fn new(gate_threshold: f64, tick_interval: Duration, gauge: TimerGauge) -> Self {
        Self {
            state: ProgressState::default(),
            gate_threshold,
            tick_interval,
            estimated: Duration::ZERO,
            timer: None,
            gauge,
        }
    }

    /// Создать трекер по конфигурации плеера
    pub fn from_config(config: &PlayerConfig, gauge: TimerGauge) -> Self {
        Self::new(config.gate_threshold, config.tick_interval(), gauge)
    }

    /// Текущее состояние
    pub fn state(&self) -> ProgressState {
        self.state
    }

    pub fn progress(&self) -> f64 {
        self.state.progress
    }

    pub fn can_advance(&self) -> bool {
        self.state.can_advance
    }

    /// Идёт ли сейчас отсчёт
    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Расчётная длительность, с которой работает таймер
    pub fn estimated_duration(&self) -> Duration {
        self.estimated
    }

    /// Запустить отсчёт для озвучки расчётной длительности `estimated`.
    ///
    /// Прежний таймер останавливается до того, как заводится новый.
    pub fn start(&mut self, estimated: Duration) {
        self.timer = None;
        self.estimated = estimated;
        if self.state.progress >= FULL_PROGRESS || estimated.is_zero() {
            return;
        }
        self.timer = Some(IntervalTimer::start(&self.gauge, self.tick_interval));
    }

    /// Остановить отсчёт, сохранив прогресс
    pub fn stop(&mut self) {
        self.timer = None;
    }

    /// Продвинуть таймер на прошедшее время
    pub fn advance(&mut self, elapsed: Duration) -> ProgressUpdate {
        let fires = match self.timer.as_mut() {
            Some(timer) => timer.advance(elapsed),
            None => return ProgressUpdate::default(),
        };

        let mut update = ProgressUpdate::default();
        for _ in 0..fires {
            update = update.merge(self.tick());
            if self.timer.is_none() {
                break;
            }
        }
        update
    }

    /// Один тик таймера
    fn tick(&mut self) -> ProgressUpdate {
        if self.estimated.is_zero() {
            return ProgressUpdate::default();
        }
        let increment =
            self.tick_interval.as_secs_f64() / self.estimated.as_secs_f64() * FULL_PROGRESS;
        let update = self.set_progress(self.state.progress + increment);
        if update.finished {
            self.timer = None;
        }
        update
    }

    /// Пересчитать прогресс после перемотки. Открытый переход не закрывается.
    pub fn seek_to_fraction(&mut self, fraction: f64) -> ProgressUpdate {
        let update = self.set_progress(fraction * FULL_PROGRESS);
        if update.finished {
            self.timer = None;
        }
        update
    }

    /// Отметить озвучку завершённой: 100% и открытый переход
    pub fn complete(&mut self) -> ProgressUpdate {
        self.timer = None;
        self.set_progress(FULL_PROGRESS)
    }

    /// Остановить таймер и обнулить состояние
    pub fn reset(&mut self) {
        self.timer = None;
        self.estimated = Duration::ZERO;
        self.state = ProgressState::default();
    }

    fn set_progress(&mut self, value: f64) -> ProgressUpdate {
        let before = self.state;

        let mut value = if value.is_nan() { 0.0 } else { value.clamp(0.0, FULL_PROGRESS) };
        if value + PROGRESS_EPSILON >= FULL_PROGRESS {
            value = FULL_PROGRESS;
        }
        self.state.progress = value;

        if !self.state.can_advance && self.state.reached(self.gate_threshold) {
            self.state.can_advance = true;
        }

        ProgressUpdate {
            changed: before.progress != self.state.progress,
            unlocked: !before.can_advance && self.state.can_advance,
            finished: before.progress < FULL_PROGRESS && self.state.progress >= FULL_PROGRESS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> (ProgressTracker, TimerGauge) {
        let gauge = TimerGauge::new();
        (ProgressTracker::new(80.0, Duration::from_millis(100), gauge.clone()), gauge)
    }

    #[test]
    fn test_estimate_duration() {
        assert_eq!(estimate_duration(2500, 1.0, 25.0), Duration::from_secs(100));
        assert_eq!(estimate_duration(2500, 2.0, 25.0), Duration::from_secs(50));
        assert_eq!(estimate_duration(0, 1.0, 25.0), Duration::ZERO);
        // Скорость вне диапазона ограничивается
        assert_eq!(estimate_duration(250, 10.0, 25.0), Duration::from_secs(5));
    }

    #[test]
    fn test_latch_at_eighty_percent() {
        let (mut tracker, _) = tracker();
        tracker.start(estimate_duration(2500, 1.0, 25.0));

        let update = tracker.advance(Duration::from_millis(79_900));
        assert!(update.changed);
        assert!(!tracker.can_advance());
        assert!((tracker.progress() - 79.9).abs() < 1e-6);

        let update = tracker.advance(Duration::from_millis(100));
        assert!(update.unlocked);
        assert!(tracker.can_advance());

        let update = tracker.advance(Duration::from_millis(20_000));
        assert!(update.finished);
        assert_eq!(tracker.progress(), 100.0);
        assert!(!tracker.is_running());
    }

    #[test]
    fn test_latch_survives_backward_seek() {
        let (mut tracker, _) = tracker();
        tracker.seek_to_fraction(0.85);
        assert!(tracker.can_advance());

        tracker.seek_to_fraction(0.1);
        assert!((tracker.progress() - 10.0).abs() < 1e-9);
        assert!(tracker.can_advance());

        tracker.reset();
        assert_eq!(tracker.state(), ProgressState::default());
    }

    #[test]
    fn test_progress_is_clamped() {
        let (mut tracker, _) = tracker();
        tracker.seek_to_fraction(3.0);
        assert_eq!(tracker.progress(), 100.0);
        tracker.seek_to_fraction(-1.0);
        assert_eq!(tracker.progress(), 0.0);

        // Очень короткий текст: один тик перекрывает всю длительность
        let (mut tracker, _) = self::tracker();
        tracker.start(Duration::from_millis(10));
        let update = tracker.advance(Duration::from_millis(500));
        assert!(update.unlocked && update.finished);
        assert_eq!(tracker.progress(), 100.0);
    }

    #[test]
    fn test_restart_keeps_single_timer() {
        let (mut tracker, gauge) = tracker();
        for _ in 0..5 {
            tracker.start(Duration::from_secs(10));
        }
        assert_eq!(gauge.active(), 1);
        assert_eq!(gauge.peak(), 1);

        tracker.stop();
        assert_eq!(gauge.active(), 0);

        let update = tracker.advance(Duration::from_secs(5));
        assert_eq!(update, ProgressUpdate::default());
    }

    #[test]
    fn test_start_after_completion_is_noop() {
        let (mut tracker, gauge) = tracker();
        tracker.complete();
        tracker.start(Duration::from_secs(10));
        assert!(!tracker.is_running());
        assert_eq!(gauge.active(), 0);
    }
}
