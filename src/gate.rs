//! Правила перехода между слайдами
//!
//! Назад можно всегда. Вперёд только когда слайд дослушан до порога
//! навигации. Завершить курс можно только с последнего слайда, дослушанного
//! до порога завершения. Отказ не ошибка, а рекомендация для интерфейса.

use crate::config::PlayerConfig;
use crate::events::Advisory;
use crate::progress::ProgressState;

/// Направление перехода
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Backward,
    Stay,
    Forward,
}

/// Решение по переходу
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Allowed(Direction),
    Rejected(Advisory),
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allowed(_))
    }
}

/// Правила навигации
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavigationGate {
    gate_threshold: f64,
    completion_threshold: f64,
}

impl NavigationGate {
    pub fn new(gate_threshold: f64, completion_threshold: f64) -> Self {
        Self {
            gate_threshold,
            completion_threshold,
        }
    }

    pub fn from_config(config: &PlayerConfig) -> Self {
        Self::new(config.gate_threshold, config.completion_threshold)
    }

    pub fn gate_threshold(&self) -> f64 {
        self.gate_threshold
    }

    pub fn completion_threshold(&self) -> f64 {
        self.completion_threshold
    }

    /// Можно ли идти вперёд при таком состоянии прогресса
    pub fn forward_open(&self, state: &ProgressState) -> bool {
        state.can_advance || state.reached(self.gate_threshold)
    }

    /// Проверить переход с `current` на `target`. Диапазон индексов
    /// проверяет вызывающий.
    pub fn check_move(&self, current: usize, target: usize, state: &ProgressState) -> GateDecision {
        if target < current {
            return GateDecision::Allowed(Direction::Backward);
        }
        if target == current {
            return GateDecision::Allowed(Direction::Stay);
        }
        if self.forward_open(state) {
            GateDecision::Allowed(Direction::Forward)
        } else {
            GateDecision::Rejected(Advisory::NavigationRejected {
                required: self.gate_threshold,
                progress: state.progress,
            })
        }
    }

    /// Проверить завершение курса с текущего слайда
    pub fn check_complete(&self, is_last: bool, state: &ProgressState) -> GateDecision {
        if !is_last {
            return GateDecision::Rejected(Advisory::NotFinalSlide);
        }
        if state.reached(self.completion_threshold) {
            GateDecision::Allowed(Direction::Forward)
        } else {
            GateDecision::Rejected(Advisory::CompletionRequired {
                required: self.completion_threshold,
                progress: state.progress,
            })
        }
    }
}

impl Default for NavigationGate {
    fn default() -> Self {
        Self::from_config(&PlayerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(progress: f64, can_advance: bool) -> ProgressState {
        ProgressState { progress, can_advance }
    }

    #[test]
    fn test_forward_threshold() {
        let gate = NavigationGate::default();

        let decision = gate.check_move(0, 1, &state(79.0, false));
        assert_eq!(
            decision,
            GateDecision::Rejected(Advisory::NavigationRejected { required: 80.0, progress: 79.0 })
        );

        assert!(gate.check_move(0, 1, &state(80.0, false)).is_allowed());
        assert!(gate.check_move(0, 3, &state(80.0, true)).is_allowed());
        // Защёлка открыта, даже если прогресс пересчитан назад
        assert!(gate.check_move(0, 1, &state(10.0, true)).is_allowed());
    }

    #[test]
    fn test_backward_always_allowed() {
        let gate = NavigationGate::default();
        assert_eq!(
            gate.check_move(2, 1, &state(0.0, false)),
            GateDecision::Allowed(Direction::Backward)
        );
        assert_eq!(
            gate.check_move(1, 1, &state(0.0, false)),
            GateDecision::Allowed(Direction::Stay)
        );
    }

    #[test]
    fn test_complete_requires_full_progress() {
        let gate = NavigationGate::default();
        assert_eq!(gate.check_complete(false, &state(100.0, true)), GateDecision::Rejected(Advisory::NotFinalSlide));
        assert!(!gate.check_complete(true, &state(99.0, true)).is_allowed());
        assert!(gate.check_complete(true, &state(100.0, true)).is_allowed());
    }
}
