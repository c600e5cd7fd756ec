//! Синтезатор на стороне UI
//!
//! Команды озвучки уходят через канал в оболочку, у которой есть настоящий
//! синтезатор речи. События оболочка возвращает через
//! [`crate::runtime::PlayerHandle::narration_sender`].

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{PlayerError, Result};

use super::{NarrationBackend, SpeechParams, UtteranceId};

/// Команда для синтезатора оболочки
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum NarrationCommand {
    Speak {
        utterance: UtteranceId,
        text: String,
        params: SpeechParams,
    },
    Pause,
    Resume,
    Cancel,
    SetVolume { volume: f32 },
}

/// Синтезатор, пересылающий команды в канал
#[derive(Debug, Clone)]
pub struct ChannelBackend {
    tx: mpsc::UnboundedSender<NarrationCommand>,
}

impl ChannelBackend {
    /// Создать синтезатор и приёмник команд для оболочки
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NarrationCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, command: NarrationCommand) {
        if let Err(e) = self.tx.send(command) {
            log::warn!("Speech host is gone, dropping {:?}", e.0);
        }
    }
}

impl NarrationBackend for ChannelBackend {
    fn speak(&mut self, utterance: UtteranceId, text: &str, params: SpeechParams) -> Result<()> {
        self.tx
            .send(NarrationCommand::Speak {
                utterance,
                text: text.to_string(),
                params,
            })
            .map_err(|_| PlayerError::NarrationFailure("speech host disconnected".to_string()))
    }

    fn pause(&mut self) {
        self.forward(NarrationCommand::Pause);
    }

    fn resume(&mut self) {
        self.forward(NarrationCommand::Resume);
    }

    fn cancel(&mut self) {
        self.forward(NarrationCommand::Cancel);
    }

    fn set_volume(&mut self, volume: f32) {
        self.forward(NarrationCommand::SetVolume { volume });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_are_forwarded() {
        let (mut backend, mut rx) = ChannelBackend::new();
        let params = SpeechParams { rate: 1.5, volume: 0.5 };

        backend.speak(UtteranceId(7), "Hello.", params).unwrap();
        backend.pause();
        backend.cancel();

        assert_eq!(
            rx.try_recv().unwrap(),
            NarrationCommand::Speak { utterance: UtteranceId(7), text: "Hello.".into(), params }
        );
        assert_eq!(rx.try_recv().unwrap(), NarrationCommand::Pause);
        assert_eq!(rx.try_recv().unwrap(), NarrationCommand::Cancel);
    }

    #[test]
    fn test_speak_fails_without_host() {
        let (mut backend, rx) = ChannelBackend::new();
        drop(rx);

        let err = backend
            .speak(UtteranceId(1), "Anyone?", SpeechParams { rate: 1.0, volume: 1.0 })
            .unwrap_err();
        assert!(matches!(err, PlayerError::NarrationFailure(_)));

        // Остальные команды просто теряются
        backend.cancel();
    }

    #[test]
    fn test_command_json_shape() {
        let json = serde_json::to_value(NarrationCommand::SetVolume { volume: 0.25 }).unwrap();
        assert_eq!(json, serde_json::json!({ "command": "set_volume", "volume": 0.25 }));
    }
}
