//! Слайды курса и их тексты для озвучки

use serde::{Deserialize, Serialize};

use crate::error::{PlayerError, Result};

/// Объяснение к слайду, полученное с сервера
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// Номер слайда (с единицы)
    pub slide: u32,
    /// Содержимое слайда
    pub content: String,
    /// Текст объяснения для озвучки
    #[serde(default)]
    pub explanation: String,
}

/// Слайд курса
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    pub id: u32,
    pub title: String,
    pub content: String,
    /// Слайд пройден (выставляется только при переходе дальше)
    pub completed: bool,
    pub image_url: Option<String>,
}

/// Сценарий курса: слайды и тексты их озвучки
#[derive(Debug, Clone, PartialEq)]
pub struct CourseScript {
    course_id: String,
    slides: Vec<Slide>,
    narrations: Vec<String>,
}

impl CourseScript {
    /// Собрать сценарий из списка объяснений.
    ///
    /// Номера слайдов ожидаются плотными и с единицы. Список сортируется,
    /// пропуски попадают в лог, повторы номера отбрасываются.
    pub fn from_explanations(course_id: impl Into<String>, mut explanations: Vec<Explanation>) -> Result<Self> {
        let course_id = course_id.into();
        explanations.sort_by_key(|e| e.slide);

        let before = explanations.len();
        explanations.dedup_by_key(|e| e.slide);
        if explanations.len() != before {
            log::warn!(
                "Course {}: dropped {} duplicate explanations",
                course_id,
                before - explanations.len()
            );
        }

        let mut expected = 1;
        for explanation in &explanations {
            if explanation.slide != expected {
                log::warn!(
                    "Course {}: expected slide {}, got {}",
                    course_id,
                    expected,
                    explanation.slide
                );
            }
            expected = explanation.slide + 1;
        }

        if explanations.is_empty() {
            return Err(PlayerError::EmptyCourse(course_id));
        }

        let (slides, narrations) = explanations
            .into_iter()
            .map(|e| {
                let narration = if e.explanation.trim().is_empty() {
                    e.content.clone()
                } else {
                    e.explanation
                };
                let slide = Slide {
                    id: e.slide,
                    title: title_for(e.slide, &e.content),
                    content: e.content,
                    completed: false,
                    image_url: None,
                };
                (slide, narration)
            })
            .unzip();

        Ok(Self {
            course_id,
            slides,
            narrations,
        })
    }

    pub fn course_id(&self) -> &str {
        &self.course_id
    }

    pub fn slides(&self) -> &[Slide] {
        &self.slides
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    pub fn slide(&self, index: usize) -> Option<&Slide> {
        self.slides.get(index)
    }

    /// Текст озвучки слайда
    pub fn narration(&self, index: usize) -> Option<&str> {
        self.narrations.get(index).map(String::as_str)
    }

    /// Номер слайда для сервера (с единицы)
    pub fn slide_number(&self, index: usize) -> u32 {
        self.slides
            .get(index)
            .map(|s| s.id)
            .unwrap_or_else(|| u32::try_from(index + 1).unwrap_or(u32::MAX))
    }

    /// Отметить слайд пройденным. Возвращает `true`, если отметка новая.
    pub fn mark_completed(&mut self, index: usize) -> bool {
        match self.slides.get_mut(index) {
            Some(slide) if !slide.completed => {
                slide.completed = true;
                true
            }
            _ => false,
        }
    }
}

fn title_for(number: u32, content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches('#').trim().to_string())
        .filter(|line| !line.is_empty())
        .unwrap_or_else(|| format!("Slide {}", number))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn explanation(slide: u32, content: &str, explanation: &str) -> Explanation {
        Explanation {
            slide,
            content: content.to_string(),
            explanation: explanation.to_string(),
        }
    }

    #[test]
    fn test_script_sorted_and_deduplicated() {
        let script = CourseScript::from_explanations(
            "c1",
            vec![
                explanation(2, "Second", "Explain two."),
                explanation(1, "# Intro\nWelcome", "Explain one."),
                explanation(2, "Duplicate", "Ignored."),
            ],
        )
        .unwrap();

        assert_eq!(script.len(), 2);
        assert_eq!(script.slide(0).unwrap().title, "Intro");
        assert_eq!(script.narration(1), Some("Explain two."));
        assert_eq!(script.slide_number(1), 2);
    }

    #[test]
    fn test_blank_explanation_falls_back_to_content() {
        let script =
            CourseScript::from_explanations("c1", vec![explanation(1, "Only content.", "  ")]).unwrap();
        assert_eq!(script.narration(0), Some("Only content."));
    }

    #[test]
    fn test_empty_course() {
        let err = CourseScript::from_explanations("c1", Vec::new()).unwrap_err();
        assert!(matches!(err, PlayerError::EmptyCourse(id) if id == "c1"));
    }

    #[test]
    fn test_mark_completed_once() {
        let mut script =
            CourseScript::from_explanations("c1", vec![explanation(1, "", "Text.")]).unwrap();
        assert_eq!(script.slide(0).unwrap().title, "Slide 1");
        assert!(script.mark_completed(0));
        assert!(!script.mark_completed(0));
        assert!(!script.mark_completed(5));
    }

    #[test]
    fn test_explanation_json() {
        let parsed: Vec<Explanation> =
            serde_json::from_str(r#"[{"slide": 1, "content": "Intro"}]"#).unwrap();
        assert_eq!(parsed[0].explanation, "");
    }
}
