//! Модуль субтитров к озвучке
//!
//! Текст слайда режется на предложения, и по оценке позиции озвучки
//! (`progress% × длина`) выбирается текущее. Точной синхронизации с речью
//! нет, субтитры показываются по мере возможности.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::narration::engine::position_from_progress;
use crate::timer::{IntervalTimer, TimerGauge};

static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+").expect("valid sentence regex"));

/// Предложение текста озвучки
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    /// Текст предложения без крайних пробелов
    pub text: String,
    /// Начало в символах (включительно)
    pub start: usize,
    /// Конец в символах (не включительно)
    pub end: usize,
}

/// Разбить текст на предложения по `.`, `!` и `?`.
///
/// Знаки препинания остаются в предложении, пустые куски пропускаются.
pub fn split_sentences(text: &str) -> Vec<Sentence> {
    let mut sentences = Vec::new();
    let mut push = |from: usize, to: usize| {
        let piece = &text[from..to];
        if piece.trim().is_empty() {
            return;
        }
        let start = text[..from].chars().count();
        let end = start + piece.chars().count();
        sentences.push(Sentence {
            text: piece.trim().to_string(),
            start,
            end,
        });
    };

    let mut from = 0;
    for found in SENTENCE_END.find_iter(text) {
        push(from, found.end());
        from = found.end();
    }
    if from < text.len() {
        push(from, text.len());
    }
    sentences
}

/// Синхронизатор субтитров текущего слайда
#[derive(Debug)]
pub struct SubtitleSynchronizer {
    sentences: Vec<Sentence>,
    text: String,
    text_len: usize,
    interval: Duration,
    timer: Option<IntervalTimer>,
    gauge: TimerGauge,
    current: Option<usize>,
}

impl SubtitleSynchronizer {
    pub fn new(interval: Duration, gauge: TimerGauge) -> Self {
        Self {
            sentences: Vec::new(),
            text: String::new(),
            text_len: 0,
            interval,
            timer: None,
            gauge,
            current: None,
        }
    }

    /// Загрузить текст нового слайда
    pub fn load(&mut self, text: &str) {
        self.clear();
        self.text = text.trim().to_string();
        self.text_len = self.text.chars().count();
        self.sentences = split_sentences(&self.text);
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    /// Запустить обновление субтитров. Повторный вызов ничего не делает.
    pub fn start(&mut self) {
        if self.timer.is_none() && !self.text.is_empty() {
            self.timer = Some(IntervalTimer::start(&self.gauge, self.interval));
        }
    }

    /// Остановить обновление, оставив текущую строку
    pub fn stop(&mut self) {
        self.timer = None;
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Текущая строка: выбранное предложение, иначе первое, иначе весь текст
    pub fn caption(&self) -> Option<&str> {
        if self.text.is_empty() {
            return None;
        }
        let sentence = self
            .current
            .and_then(|index| self.sentences.get(index))
            .or_else(|| self.sentences.first());
        Some(sentence.map_or(self.text.as_str(), |s| s.text.as_str()))
    }

    /// Индекс предложения, содержащего позицию `offset`
    pub fn sentence_at(&self, offset: usize) -> Option<usize> {
        if self.sentences.is_empty() {
            return None;
        }
        let index = self
            .sentences
            .iter()
            .position(|s| offset < s.end)
            .unwrap_or(self.sentences.len() - 1);
        Some(index)
    }

    /// Продвинуть таймер. Возвращает новую строку, если предложение сменилось.
    pub fn advance(&mut self, elapsed: Duration, progress: f64) -> Option<String> {
        let fires = self.timer.as_mut()?.advance(elapsed);
        if fires == 0 {
            return None;
        }
        self.sync_to(progress)
    }

    /// Выбрать предложение по прогрессу. Возвращает строку только при смене
    /// предложения.
    pub fn sync_to(&mut self, progress: f64) -> Option<String> {
        let offset = position_from_progress(progress, self.text_len);
        let index = self.sentence_at(offset)?;
        if self.current == Some(index) {
            return None;
        }
        self.current = Some(index);
        self.caption().map(str::to_string)
    }

    /// Сбросить текст и остановить таймер
    pub fn clear(&mut self) {
        self.timer = None;
        self.sentences.clear();
        self.text.clear();
        self.text_len = 0;
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "First sentence. Second one! Is this the third?";

    fn synchronizer() -> (SubtitleSynchronizer, TimerGauge) {
        let gauge = TimerGauge::new();
        let mut sync = SubtitleSynchronizer::new(Duration::from_millis(100), gauge.clone());
        sync.load(TEXT);
        (sync, gauge)
    }

    #[test]
    fn test_split_sentences() {
        let sentences = split_sentences(TEXT);
        let texts: Vec<_> = sentences.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["First sentence.", "Second one!", "Is this the third?"]);
        assert_eq!(sentences[0].start, 0);
        assert_eq!(sentences[0].end, 15);
        assert_eq!(sentences[2].end, TEXT.len());
    }

    #[test]
    fn test_split_without_terminator() {
        let sentences = split_sentences("No punctuation here");
        assert_eq!(sentences.len(), 1);
        assert_eq!(sentences[0].text, "No punctuation here");

        let sentences = split_sentences("Wait... what?! Trailing words");
        let texts: Vec<_> = sentences.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Wait...", "what?!", "Trailing words"]);

        assert!(split_sentences("  ").is_empty());
    }

    #[test]
    fn test_char_offsets_for_unicode() {
        let sentences = split_sentences("Привет. Мир!");
        assert_eq!(sentences[0].end, 7);
        assert_eq!(sentences[1].start, 7);
        assert_eq!(sentences[1].end, 12);
    }

    #[test]
    fn test_caption_fallback() {
        let (sync, _) = synchronizer();
        assert_eq!(sync.caption(), Some("First sentence."));

        let mut empty = SubtitleSynchronizer::new(Duration::from_millis(100), TimerGauge::new());
        empty.load("");
        assert_eq!(empty.caption(), None);
    }

    #[test]
    fn test_caption_changes_only_with_sentence() {
        let (mut sync, gauge) = synchronizer();
        sync.start();
        sync.start();
        assert_eq!(gauge.active(), 1);

        assert_eq!(sync.advance(Duration::from_millis(100), 0.0), Some("First sentence.".into()));
        // То же предложение: без повторного события
        assert_eq!(sync.advance(Duration::from_millis(100), 10.0), None);
        // Тик ещё не наступил
        assert_eq!(sync.advance(Duration::from_millis(50), 50.0), None);
        assert_eq!(sync.advance(Duration::from_millis(50), 50.0), Some("Second one!".into()));
        assert_eq!(sync.advance(Duration::from_millis(100), 100.0), Some("Is this the third?".into()));

        sync.stop();
        assert_eq!(gauge.active(), 0);
        assert_eq!(sync.advance(Duration::from_secs(1), 0.0), None);
        assert_eq!(sync.caption(), Some("Is this the third?"));
    }

    #[test]
    fn test_clear_drops_timer() {
        let (mut sync, gauge) = synchronizer();
        sync.start();
        sync.clear();
        assert_eq!(gauge.active(), 0);
        assert_eq!(sync.caption(), None);
        assert_eq!(sync.sync_to(50.0), None);
    }
}
