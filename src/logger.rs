use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

const DEFAULT_FILTER: &str = "warn,course_player=info";

/// Инициализирует логгер. Повторный вызов ничего не делает.
pub fn init_logger() {
    if let Err(e) = try_init_logger() {
        log::debug!("Logger already initialized: {}", e);
    }
}

/// Инициализирует логгер, возвращая ошибку, если он уже установлен
pub fn try_init_logger() -> Result<(), log::SetLoggerError> {
    // Базовый фильтр, переопределяется через RUST_LOG
    let env = Env::default().filter_or("RUST_LOG", DEFAULT_FILTER);

    let mut builder = Builder::from_env(env);

    // Шумные зависимости приглушаем
    builder
        .filter_module("mio", LevelFilter::Error)
        .filter_module("hyper", LevelFilter::Error)
        .filter_module("tokio_util", LevelFilter::Error)
        .filter_module("reqwest", LevelFilter::Warn)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .try_init()
}
