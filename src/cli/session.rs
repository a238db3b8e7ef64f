//! `run` and `ask` command handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use sotto::session::Channel;
use sotto::voice::{
    CommandSpeechSink, ConsoleAdapter, NullTranscriber, NullWakeWordSource, VoiceController,
};

use super::common::{build_runtime, teardown};

/// Interactive assistant: typed input from stdin plus wake detection.
pub(crate) async fn cmd_run(fresh: bool) -> Result<()> {
    let runtime = build_runtime(fresh).await?;

    let speech = CommandSpeechSink::new(
        &runtime.config.voice.speech_command,
        runtime.config.voice.speech_voice.clone(),
    );
    let controller = VoiceController::new(
        runtime.agent.clone(),
        Arc::new(NullWakeWordSource),
        Arc::new(NullTranscriber),
        Arc::new(speech),
        vec![Arc::new(ConsoleAdapter)],
        runtime.config.voice.clone(),
    );
    controller.start_listening().await?;

    println!("Sotto is listening. Type your message and press Enter.");
    println!("Type 'quit' or 'exit' to stop.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
            line = lines.next_line() => {
                match line? {
                    None => break,
                    Some(input) => {
                        let input = input.trim().to_string();
                        if input.is_empty() {
                            continue;
                        }
                        if input == "quit" || input == "exit" {
                            println!("Goodbye!");
                            break;
                        }
                        controller.submit_text(&input).await;
                    }
                }
            }
        }
    }

    controller.shutdown(Duration::from_secs(5)).await;
    teardown(&runtime).await?;
    Ok(())
}

/// One-shot text turn.
pub(crate) async fn cmd_ask(message: &str, fresh: bool) -> Result<()> {
    let runtime = build_runtime(fresh).await?;

    match runtime.agent.handle_turn(message, Channel::Text).await {
        Ok(reply) => println!("{}", reply),
        Err(e) => {
            teardown(&runtime).await.ok();
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    teardown(&runtime).await?;
    Ok(())
}
