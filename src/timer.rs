//! Логические таймеры плеера
//!
//! Плеер не заводит собственных потоков или задач: хост (см. `runtime`)
//! передаёт прошедшее время, а [`IntervalTimer`] превращает его в срабатывания
//! с фиксированным периодом. Каждый живой таймер держит [`TimerGuard`],
//! зарегистрированный в [`TimerGauge`], поэтому число активных таймеров
//! всегда можно проверить.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Счётчик активных таймеров одного вида
#[derive(Debug, Clone, Default)]
pub struct TimerGauge {
    inner: Arc<GaugeInner>,
}

#[derive(Debug, Default)]
struct GaugeInner {
    active: AtomicUsize,
    peak: AtomicUsize,
    armed_total: AtomicUsize,
}

impl TimerGauge {
    /// Создать новый счётчик
    pub fn new() -> Self {
        Self::default()
    }

    /// Зарегистрировать таймер. Таймер живёт, пока жив guard.
    pub fn arm(&self) -> TimerGuard {
        let active = self.inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(active, Ordering::SeqCst);
        self.inner.armed_total.fetch_add(1, Ordering::SeqCst);
        TimerGuard { gauge: self.clone() }
    }

    /// Сколько таймеров активно сейчас
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Максимум одновременно активных таймеров за всё время
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }

    /// Сколько раз таймер заводился
    pub fn armed_total(&self) -> usize {
        self.inner.armed_total.load(Ordering::SeqCst)
    }
}

/// Регистрация живого таймера в [`TimerGauge`]
#[derive(Debug)]
pub struct TimerGuard {
    gauge: TimerGauge,
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.gauge.inner.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Периодический таймер, работающий от переданного извне времени
#[derive(Debug)]
pub struct IntervalTimer {
    period: Duration,
    carry: Duration,
    _guard: TimerGuard,
}

impl IntervalTimer {
    /// Завести таймер с указанным периодом
    pub fn start(gauge: &TimerGauge, period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            carry: Duration::ZERO,
            _guard: gauge.arm(),
        }
    }

    /// Период таймера
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Продвинуть таймер на `elapsed` и вернуть число срабатываний
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        self.carry += elapsed;
        let fires = self.carry.as_nanos() / self.period.as_nanos();
        let fires = u32::try_from(fires).unwrap_or(u32::MAX);
        self.carry -= self.period * fires;
        fires
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_tracks_guards() {
        let gauge = TimerGauge::new();
        let a = gauge.arm();
        let b = gauge.arm();
        assert_eq!(gauge.active(), 2);
        drop(a);
        assert_eq!(gauge.active(), 1);
        drop(b);
        assert_eq!(gauge.active(), 0);
        assert_eq!(gauge.peak(), 2);
        assert_eq!(gauge.armed_total(), 2);
    }

    #[test]
    fn test_interval_carries_remainder() {
        let gauge = TimerGauge::new();
        let mut timer = IntervalTimer::start(&gauge, Duration::from_millis(100));

        assert_eq!(timer.advance(Duration::from_millis(50)), 0);
        assert_eq!(timer.advance(Duration::from_millis(60)), 1);
        assert_eq!(timer.advance(Duration::from_millis(290)), 3);
        assert_eq!(timer.advance(Duration::from_millis(0)), 0);

        drop(timer);
        assert_eq!(gauge.active(), 0);
    }
}
