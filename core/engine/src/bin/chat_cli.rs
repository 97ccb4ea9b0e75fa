// src/bin/chat_cli.rs

use std::io::{self, BufRead, Write};

use tracing_subscriber::EnvFilter;

use chat_engine::config_manager::config_path_from_args;
use chat_engine::{ChatEngineBuilder, ConversationState, EngineConfig};

fn main() {
    if let Err(e) = real_main() {
        eprintln!("chat_cli error: {e}");
        std::process::exit(1);
    }
}

fn real_main() -> anyhow::Result<()> {
    // 终端模式下默认只输出 warn 以上，避免日志和对话混在一起
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    //   cargo run --bin chat_cli -- --config chat_engine.toml
    let args: Vec<String> = std::env::args().collect();
    let config = EngineConfig::load_or_default(&config_path_from_args(&args))?;
    let engine = ChatEngineBuilder::from_config(&config)?.build()?;

    println!("\n--- Chatbot is Ready (Terminal Mode) ---");
    println!("Type your message and press Enter. Type 'quit' to exit.");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut state = ConversationState::General;
    let mut line = String::new();

    loop {
        print!("You: ");
        stdout.flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim_end_matches(|c| c == '\r' || c == '\n');

        if input.to_lowercase() == "quit" {
            println!("Bot: Goodbye!");
            break;
        }

        let reply = engine.respond(input, state);
        state = reply.state;
        println!("Bot: {}", reply.reply);
    }

    Ok(())
}
