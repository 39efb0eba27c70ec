//! `harbor ask` — Answer one question in the terminal.

use std::path::Path;

use harbor_agent::AssembledAnswer;

use super::bootstrap;

pub async fn run(config_path: Option<&Path>, question: &str, json: bool) -> anyhow::Result<()> {
    if question.trim().is_empty() {
        anyhow::bail!("the question must not be empty");
    }

    let config = bootstrap::load_config(config_path)?;
    let query_loop = bootstrap::build_query_loop(&config).await?;

    let result = query_loop.process_query(question).await;
    let assembled = AssembledAnswer::from_result(&result);

    if json {
        println!("{}", serde_json::to_string_pretty(&assembled)?);
        return Ok(());
    }

    println!("{}", assembled.answer);
    if !assembled.tool_calls.is_empty() {
        println!();
        println!("Sources:");
        for call in &assembled.tool_calls {
            println!(
                "  • {} → {}",
                call.tool,
                call.source_file.as_deref().unwrap_or("(no results)")
            );
        }
    }
    println!("\n[{} iteration(s)]", assembled.iterations);
    Ok(())
}
