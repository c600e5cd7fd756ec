//! Пример прохождения курса без сервера и без звука
//!
//! Курс берётся из памяти, озвучка имитируется таймерами. Пример проходит все
//! слайды, дожидаясь открытия перехода, завершает курс и печатает готовый тест.
//!
//! Запуск: `cargo run --example player_demo`

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use course_player::narration::SimulatedBackend;
use course_player::notification::{CompositeObserver, JournalObserver, LogObserver};
use course_player::slide::Explanation;
use course_player::{
    CoursePlayer, CourseRef, MemoryCourseApi, PlayerCommand, PlayerConfig, PlayerEvent, PlayerHandle,
};

fn demo_course() -> Vec<Explanation> {
    let slides = [
        ("Welcome", "Welcome to security awareness training. This short course takes a few seconds."),
        ("Passwords", "Use a password manager. Never reuse passwords across services!"),
        ("Phishing", "Check the sender before clicking links. When in doubt, report the email."),
    ];
    slides
        .iter()
        .enumerate()
        .map(|(i, (title, text))| Explanation {
            slide: i as u32 + 1,
            content: format!("# {}", title),
            explanation: text.to_string(),
        })
        .collect()
}

async fn wait_for<F>(handle: &mut PlayerHandle, mut predicate: F) -> Result<PlayerEvent>
where
    F: FnMut(&PlayerEvent) -> bool,
{
    while let Some(event) = handle.next_event().await {
        match &event {
            PlayerEvent::Caption { text } => println!("  » {}", text),
            PlayerEvent::Advisory(advisory) => println!("  ! {}", advisory),
            _ => {}
        }
        if predicate(&event) {
            return Ok(event);
        }
    }
    bail!("player stopped unexpectedly")
}

#[tokio::main]
async fn main() -> Result<()> {
    course_player::logger::init_logger();

    let dir = tempfile::tempdir().context("failed to create assessment directory")?;
    let mut config = PlayerConfig::from_env()?;
    // Быстрое чтение, чтобы пример не шёл минутами
    config.chars_per_second = 60.0;
    config.assessment_dir = Some(dir.path().display().to_string());

    let questions = vec![
        serde_json::json!({ "question": "Should passwords be reused?", "answer": false }),
        serde_json::json!({ "question": "What do you do with a suspicious email?", "answer": "report" }),
    ];
    let api = MemoryCourseApi::new(demo_course()).with_assessment("memory://security-basics", questions);

    let mut player = CoursePlayer::new(config.clone(), Arc::new(api));
    let mut observers = CompositeObserver::new();
    observers.add_observer(Box::new(LogObserver::with_prefix("[demo] ")));
    observers.add_observer(Box::new(JournalObserver::new(dir.path().join("events.log"))));
    player.add_observer(Box::new(observers));

    let chars_per_second = config.chars_per_second;
    let mut handle = player
        .open(CourseRef::new("security-basics", "acme"), |events| {
            Box::new(SimulatedBackend::new(events, chars_per_second))
        })
        .await?;

    loop {
        let snapshot = handle.snapshot().await?;
        let title = snapshot.slide.map(|s| s.title).unwrap_or_default();
        println!("Slide {}/{}: {}", snapshot.index + 1, snapshot.slide_count, title);

        if snapshot.index + 1 == snapshot.slide_count {
            wait_for(&mut handle, |e| *e == PlayerEvent::NarrationCompleted).await?;
            handle.send(PlayerCommand::Complete).await?;
            break;
        }

        wait_for(&mut handle, |e| *e == PlayerEvent::AdvanceUnlocked).await?;
        handle.send(PlayerCommand::Next).await?;
        wait_for(&mut handle, |e| matches!(e, PlayerEvent::SlideChanged { .. })).await?;
    }

    let ready = wait_for(&mut handle, |e| matches!(e, PlayerEvent::AssessmentReady(_))).await?;
    if let PlayerEvent::AssessmentReady(prepared) = ready {
        println!("Assessment ready with {} questions", prepared.questions.len());
        if let Some(path) = prepared.stored_at {
            println!("Stored at {}", path.display());
        }
    }

    handle.shutdown().await?;
    Ok(())
}
