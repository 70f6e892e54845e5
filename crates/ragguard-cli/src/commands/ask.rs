//! Ask command

use crate::app::{AskArgs, OutputFormat};
use anyhow::Result;
use ragguard_core::{AnswerResponse, Config, QueryOrchestrator, RagGuardError};
use ragguard_server::AskResponse;

pub async fn run(args: AskArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let orchestrator = QueryOrchestrator::from_config(config).await?;
    let question = args.question.join(" ");

    let outcome = orchestrator.ask(&args.client_id, &question).await;
    orchestrator.audit().flush().await;
    let answer = outcome.map_err(RagGuardError::from)?;

    match format {
        OutputFormat::Json => {
            let body = AskResponse::from_answer(answer, orchestrator.compliance_level());
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Cli => print_answer(&answer),
    }
    Ok(())
}

fn print_answer(answer: &AnswerResponse) {
    println!(
        "Mode:        {}{}",
        answer.mode,
        answer
            .degraded_reason
            .map(|r| format!(" ({})", r))
            .unwrap_or_default()
    );
    println!(
        "Confidence:  {} ({:.0}%)",
        answer.confidence_label,
        answer.confidence_score * 100.0
    );
    println!("Model:       {}", answer.model);
    println!();
    println!("{}", answer.answer_text);
    println!();
    println!("Sources:");
    for source in &answer.sources {
        println!("  - {}", source);
    }
    println!();
    println!("Request:     {}", answer.request_id);
    println!("Remaining:   {}", answer.rate_limit_remaining);
}
