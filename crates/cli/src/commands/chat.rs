//! `tars chat`: Interactive or single-message conversation.

use std::io::Write;

use tars_agent::{Assistant, AssistantReply, Session};
use tars_config::AppConfig;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{load_config, open_knowledge};

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set the ANTHROPIC_API_KEY environment variable, or add api_key to:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let (completion, _) = tars_providers::build_from_config(&config)?;
    let knowledge = open_knowledge(&config).await?;
    let assistant = Assistant::new(completion, knowledge.clone(), &config);
    let mut session = Session::from_config(&config)?;

    if let Some(msg) = message {
        eprint!("  Thinking...");
        let reply = assistant.chat(&mut session, &msg).await;
        eprint!("\r              \r");
        let reply = reply.map_err(|e| e.user_message())?;
        print_reply(&reply);
        return Ok(());
    }

    let stats = knowledge.stats().await?;
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║          TARS: Interactive Mode              ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Model:      {}", config.anthropic.model);
    println!("  Knowledge:  {} documents, {} chunks", stats.documents, stats.chunks);
    println!("  Session:    {}", session.id());
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        eprint!("  ...");
        let result = assistant.chat(&mut session, line).await;
        eprint!("\r     \r");
        match result {
            Ok(reply) => {
                println!();
                print_reply(&reply);
                println!();
            }
            Err(e) if e.is_recoverable() => {
                eprintln!("  [Error] {}", e.user_message());
                println!();
            }
            Err(e) => return Err(e.user_message().into()),
        }
    }

    println!();
    println!("  Goodbye! 👋");
    println!();
    Ok(())
}

fn print_reply(reply: &AssistantReply) {
    for line in reply.text.lines() {
        println!("  TARS > {line}");
    }
    if reply.context_free {
        println!("  (no matching documents; answered from general knowledge)");
    }
    if !reply.sources.is_empty() {
        println!("  Sources: {}", reply.sources.join(", "));
    }
}
