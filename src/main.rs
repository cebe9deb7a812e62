//! Application entry point: AI Teacher terminal front end.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime.
//! 4. Open the key-value store and build the Gemini tutor.
//! 5. Load the Whisper model if present; otherwise voice input is disabled.
//! 6. Start the [`Orchestrator`] (restores settings and the transcript).
//! 7. Ask for an API key when none is configured.
//! 8. Run the REPL: stdin lines and recognition events, multiplexed with
//!    `tokio::select!`.  Turns run on spawned tasks so `/stop` and `/mic`
//!    stay responsive.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use ai_teacher::{
    audio::{CpalOutput, PlaybackEngine},
    config::{AppConfig, AppPaths, UiConfig},
    conversation::{
        AppContext, Level, ListenOutcome, Message, MessageId, Orchestrator, OrchestratorError,
        PlaybackOutcome, RecognitionOutcome, Role, SendKind, Topic, TurnOutcome, Voice,
    },
    store::{CredentialStore, JsonFileStore, KeyValueStore},
    stt::{
        MicRecognizer, ModelPaths, RecognitionBridge, RecognitionEvent, Recognizer, WhisperEngine,
        MODEL_SOURCE_URL,
    },
    tutor::{GeminiTutor, TRANSLATION_MARKER},
};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

const HELP: &str = "\
Type a sentence to talk to the tutor, or a command:
  /topics            list conversation topics
  /topic <name>      start a new conversation about <name>
  /level <name>      beginner | intermediate | advanced
  /voice <name>      Kore | Puck | Charon | Fenrir | Zephyr
  /preview <name>    hear a voice (again to stop)
  /history           show the conversation with message numbers
  /replay [n]        replay the last (or n-th) tutor message
  /slow [n]          replay slowly
  /rewind <n>        delete message n and everything after it
  /mic               start/stop voice input
  /lang              switch voice input between English and Korean
  /stop              stop audio
  /reset             clear the conversation
  /key               enter a new API key
  /help              show this help
  /quit              exit";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Say(String),
    Topics,
    Topic(Topic),
    Level(Level),
    Voice(Voice),
    Preview(Voice),
    History,
    Replay { index: Option<usize>, slow: bool },
    Rewind(usize),
    Mic,
    Lang,
    Stop,
    Reset,
    Key,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line.  `Ok(None)` for blank lines.
    fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(Command::Say(line.to_string())));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "topics" => Command::Topics,
            "topic" => Command::Topic(
                Topic::parse(arg).ok_or_else(|| format!("unknown topic '{arg}' (see /topics)"))?,
            ),
            "level" => Command::Level(
                Level::parse(arg).ok_or_else(|| format!("unknown level '{arg}'"))?,
            ),
            "voice" => Command::Voice(
                Voice::parse(arg).ok_or_else(|| format!("unknown voice '{arg}'"))?,
            ),
            "preview" => Command::Preview(
                Voice::parse(arg).ok_or_else(|| format!("unknown voice '{arg}'"))?,
            ),
            "history" => Command::History,
            "replay" => Command::Replay {
                index: parse_index(arg)?,
                slow: false,
            },
            "slow" => Command::Replay {
                index: parse_index(arg)?,
                slow: true,
            },
            "rewind" => Command::Rewind(
                parse_index(arg)?.ok_or_else(|| "usage: /rewind <n>".to_string())?,
            ),
            "mic" => Command::Mic,
            "lang" => Command::Lang,
            "stop" => Command::Stop,
            "reset" => Command::Reset,
            "key" => Command::Key,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(format!("unknown command '/{other}' (see /help)")),
        };
        Ok(Some(command))
    }
}

/// 1-based message number, or `None` when omitted.
fn parse_index(arg: &str) -> Result<Option<usize>, String> {
    if arg.is_empty() {
        return Ok(None);
    }
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(format!("'{arg}' is not a message number")),
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Reply text as displayed, without the translation block when disabled.
fn visible_reply(content: &str, show_translation: bool) -> &str {
    if show_translation {
        return content;
    }
    match content.find(TRANSLATION_MARKER) {
        Some(end) => content[..end].trim_end(),
        None => content,
    }
}

fn print_message(number: usize, message: &Message, ui: &UiConfig) {
    match message.role {
        Role::User => println!("[{number}] you> {}", message.content),
        Role::Assistant => println!(
            "[{number}] tutor> {}",
            visible_reply(&message.content, ui.show_translation)
        ),
    }
}

fn print_by_id(orchestrator: &Orchestrator, id: MessageId, ui: &UiConfig) {
    let messages = orchestrator.messages();
    if let Some((index, message)) = messages.iter().enumerate().find(|(_, m)| m.id == id) {
        print_message(index + 1, message, ui);
    }
}

fn print_topics() {
    println!("Topics:");
    for topic in Topic::ALL {
        println!(
            "  {:<12} {} - {}",
            topic.name(),
            topic.display_name(),
            topic.description()
        );
    }
}

fn report_turn(orchestrator: &Orchestrator, outcome: TurnOutcome, ui: &UiConfig) {
    match outcome {
        TurnOutcome::Completed { message_id, .. } | TurnOutcome::Failed { message_id } => {
            print_by_id(orchestrator, message_id, ui);
            if orchestrator.credential_required() {
                println!("(API key problem: use /key to enter a new one)");
            }
        }
        TurnOutcome::Busy => println!("(still working on the previous turn)"),
        TurnOutcome::Superseded => println!("(reply dropped: the conversation changed)"),
        TurnOutcome::Ignored => {}
    }
}

fn report_playback(outcome: PlaybackOutcome) {
    match outcome {
        PlaybackOutcome::Started | PlaybackOutcome::Stopped => {}
        PlaybackOutcome::Unavailable => println!("(audio unavailable)"),
        PlaybackOutcome::Busy => println!("(still working on the previous turn)"),
        PlaybackOutcome::NotFound => println!("(no tutor message to replay there)"),
    }
}

fn report_error(e: &OrchestratorError) {
    log::error!("{e}");
    match e {
        OrchestratorError::Recognition(r) => match r.alert() {
            Some(alert) => println!("{alert}"),
            None => println!("voice input failed: {r}"),
        },
        OrchestratorError::Storage(_) => println!("could not save the conversation: {e}"),
    }
}

// ---------------------------------------------------------------------------
// REPL
// ---------------------------------------------------------------------------

/// Spawn one conversation turn; the result is printed when it completes.
fn spawn_turn(orchestrator: &Orchestrator, text: String, ui: &UiConfig) {
    let orchestrator = orchestrator.clone();
    let ui = ui.clone();
    tokio::spawn(async move {
        match orchestrator.handle_send(&text, SendKind::Normal).await {
            Ok(outcome) => report_turn(&orchestrator, outcome, &ui),
            Err(e) => report_error(&e),
        }
    });
}

/// Nth assistant message id (1-based over the whole log), or the latest
/// spoken reply when `index` is `None`.
fn replay_target(orchestrator: &Orchestrator, index: Option<usize>) -> Option<MessageId> {
    let messages = orchestrator.messages();
    match index {
        Some(n) => messages.get(n - 1).map(|m| m.id),
        None => messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && m.has_audio)
            .map(|m| m.id),
    }
}

/// Returns `false` when the REPL should exit.
fn run_command(
    command: Command,
    orchestrator: &Orchestrator,
    ui: &UiConfig,
    awaiting_key: &mut bool,
) -> bool {
    match command {
        Command::Say(text) => spawn_turn(orchestrator, text, ui),
        Command::Topics => print_topics(),
        Command::Topic(topic) => {
            let orchestrator = orchestrator.clone();
            let ui = ui.clone();
            tokio::spawn(async move {
                match orchestrator.select_topic(topic).await {
                    Ok(outcome) => report_turn(&orchestrator, outcome, &ui),
                    Err(e) => report_error(&e),
                }
            });
        }
        Command::Level(level) => {
            let orchestrator = orchestrator.clone();
            let ui = ui.clone();
            tokio::spawn(async move {
                match orchestrator.change_level(level).await {
                    Ok(Some(outcome)) => report_turn(&orchestrator, outcome, &ui),
                    Ok(None) => println!("level set to {level}"),
                    Err(e) => report_error(&e),
                }
            });
        }
        Command::Voice(voice) => match orchestrator.select_voice(voice) {
            Ok(()) => println!("voice set to {voice}"),
            Err(e) => report_error(&e),
        },
        Command::Preview(voice) => {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                report_playback(orchestrator.preview_voice(voice).await);
            });
        }
        Command::History => {
            let messages = orchestrator.messages();
            if messages.is_empty() {
                println!("(no messages yet)");
            }
            for (i, message) in messages.iter().enumerate() {
                print_message(i + 1, message, ui);
            }
        }
        Command::Replay { index, slow } => match replay_target(orchestrator, index) {
            Some(id) => {
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move {
                    report_playback(orchestrator.replay(id, slow).await);
                });
            }
            None => report_playback(PlaybackOutcome::NotFound),
        },
        Command::Rewind(n) => {
            let Some(id) = orchestrator.messages().get(n - 1).map(|m| m.id) else {
                println!("(no message {n})");
                return true;
            };
            match orchestrator.restart_from_message(id) {
                Ok(_) => println!("conversation rewound to {} messages", n - 1),
                Err(e) => report_error(&e),
            }
        }
        Command::Mic => match orchestrator.toggle_listening() {
            Ok(ListenOutcome::Started(language)) => {
                println!("listening ({language})... /mic again to finish");
            }
            Ok(ListenOutcome::Stopping) => {}
            Err(e) => report_error(&e),
        },
        Command::Lang => {
            let language = orchestrator.toggle_input_language();
            println!("voice input language: {language}");
        }
        Command::Stop => orchestrator.stop_audio(),
        Command::Reset => match orchestrator.reset_conversation() {
            Ok(()) => print_topics(),
            Err(e) => report_error(&e),
        },
        Command::Key => match orchestrator.change_credential() {
            Ok(()) => {
                *awaiting_key = true;
                println!("Enter your Gemini API key:");
            }
            Err(e) => report_error(&e),
        },
        Command::Help => println!("{HELP}"),
        Command::Quit => return false,
    }
    true
}

async fn handle_recognition_event(
    event: RecognitionEvent,
    orchestrator: &Orchestrator,
    ui: &UiConfig,
) {
    if let RecognitionEvent::Interim(text) = &event {
        if ui.show_interim {
            println!("  ... {text}");
        }
    }

    // A finished utterance becomes a turn; run it off the REPL task.
    if matches!(event, RecognitionEvent::Finished(_)) {
        let orchestrator = orchestrator.clone();
        let ui = ui.clone();
        tokio::spawn(async move {
            match orchestrator.handle_recognition(event).await {
                Ok(RecognitionOutcome::Submitted(outcome)) => {
                    report_turn(&orchestrator, outcome, &ui);
                }
                Ok(RecognitionOutcome::NoResult) => println!("(nothing was recognized)"),
                Ok(_) => {}
                Err(e) => report_error(&e),
            }
        });
        return;
    }

    match orchestrator.handle_recognition(event).await {
        Ok(RecognitionOutcome::Alert(alert)) => println!("{alert}"),
        Ok(_) => {}
        Err(e) => report_error(&e),
    }
}

async fn repl(
    orchestrator: Orchestrator,
    probe: Arc<GeminiTutor>,
    mut events: mpsc::UnboundedReceiver<RecognitionEvent>,
    ui: UiConfig,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut awaiting_key = orchestrator.credential_required();
    if awaiting_key {
        println!("A Gemini API key is required (https://aistudio.google.com/apikey).");
        println!("Enter your Gemini API key:");
    } else if orchestrator.topic_active() {
        for (i, message) in orchestrator.messages().iter().enumerate() {
            print_message(i + 1, message, &ui);
        }
    } else {
        print_topics();
        println!("Pick one with /topic <name>, or /help.");
    }

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };

                if awaiting_key {
                    match orchestrator.submit_credential(probe.as_ref(), &line).await {
                        Ok(()) => {
                            awaiting_key = false;
                            println!("API key saved.");
                            if !orchestrator.topic_active() {
                                print_topics();
                            }
                        }
                        Err(e) => println!("{e}"),
                    }
                    continue;
                }

                match Command::parse(&line) {
                    Ok(Some(command)) => {
                        if !run_command(command, &orchestrator, &ui, &mut awaiting_key) {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(message) => println!("{message}"),
                }
            }
            Some(event) = events.recv() => {
                handle_recognition_event(event, &orchestrator, &ui).await;
            }
        }
    }

    orchestrator.stop_audio();
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn build_recognizer(config: &AppConfig, paths: &AppPaths) -> Option<Arc<dyn Recognizer>> {
    let model = ModelPaths::resolve(paths, &config.stt);
    if !model.exists() {
        log::warn!(
            "Whisper model not found at {}; voice input disabled (models: {MODEL_SOURCE_URL})",
            model.model_file.display()
        );
        return None;
    }

    match WhisperEngine::load(&model.model_file, config.stt.use_gpu) {
        Ok(engine) => {
            log::info!("Whisper model loaded: {}", model.model_file.display());
            Some(Arc::new(MicRecognizer::new(Arc::new(engine), config.stt.clone())))
        }
        Err(e) => {
            log::warn!("Could not load Whisper model ({e}); voice input disabled");
            None
        }
    }
}

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("AI Teacher starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    let paths = AppPaths::new();

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(async move {
        // 4. Storage and tutor
        let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::open(&paths.storage_file));
        let credentials = CredentialStore::new(Arc::clone(&store));
        let tutor = Arc::new(GeminiTutor::from_config(&config.gemini, credentials.clone()));

        // 5. Voice input (optional)
        let (bridge, events) = RecognitionBridge::new(build_recognizer(&config, &paths));

        // 6. Orchestrator
        let orchestrator = Orchestrator::start(AppContext {
            store,
            credentials,
            tutor: tutor.clone(),
            playback: PlaybackEngine::with_sample_rate(
                Arc::new(CpalOutput::new()),
                config.audio.sample_rate,
            ),
            recognition: Arc::new(bridge),
            audio: config.audio.clone(),
        });

        // 7-8. Credential prompt and REPL
        repl(orchestrator, tutor, events, config.ui.clone()).await
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_turn() {
        assert_eq!(
            Command::parse("  I like coffee ").unwrap(),
            Some(Command::Say("I like coffee".into()))
        );
        assert_eq!(Command::parse("   ").unwrap(), None);
    }

    #[test]
    fn commands_with_arguments() {
        assert_eq!(
            Command::parse("/topic restaurant").unwrap(),
            Some(Command::Topic(Topic::Restaurant))
        );
        assert_eq!(
            Command::parse("/level a").unwrap(),
            Some(Command::Level(Level::Advanced))
        );
        assert_eq!(
            Command::parse("/voice puck").unwrap(),
            Some(Command::Voice(Voice::Puck))
        );
        assert_eq!(
            Command::parse("/slow 3").unwrap(),
            Some(Command::Replay {
                index: Some(3),
                slow: true
            })
        );
        assert_eq!(
            Command::parse("/replay").unwrap(),
            Some(Command::Replay {
                index: None,
                slow: false
            })
        );
        assert_eq!(Command::parse("/rewind 2").unwrap(), Some(Command::Rewind(2)));
    }

    #[test]
    fn bad_commands_are_reported() {
        assert!(Command::parse("/topic moon").is_err());
        assert!(Command::parse("/rewind").is_err());
        assert!(Command::parse("/rewind 0").is_err());
        assert!(Command::parse("/dance").is_err());
    }

    #[test]
    fn translation_can_be_hidden() {
        let reply = "Sounds good!\n💡 Correction: none\n🇰🇷 번역: 좋아요!";
        assert_eq!(visible_reply(reply, true), reply);
        assert_eq!(
            visible_reply(reply, false),
            "Sounds good!\n💡 Correction: none"
        );
    }
}
