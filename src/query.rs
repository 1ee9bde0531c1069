//! The `rag query` command.

use anyhow::Result;

use crate::config::Config;
use crate::pipeline::Retrieval;
use crate::server::build_pipeline;

/// Answer one question against the persisted index and print the result.
///
/// With `show_prompt`, the rendered prompt (or the no-match notice) is
/// printed before the model is called.
pub async fn run_query(config: &Config, question: &str, show_prompt: bool) -> Result<()> {
    let pipeline = build_pipeline(config).await?;

    let retrieval = pipeline.retrieve(question).await?;
    if show_prompt {
        match &retrieval {
            Retrieval::NoMatch(_) => println!("(no context passed the relevance cutoff)"),
            Retrieval::Context { prompt, results } => {
                println!("--- prompt ({} chunks) ---", results.len());
                for r in results {
                    println!("  {:.3}  {}", r.score, r.chunk.source_id);
                }
                println!("{}", prompt);
                println!("--- end prompt ---");
                println!();
            }
        }
    }

    let answer = pipeline.answer_from(retrieval).await?;
    println!("Answer: {}", answer.text);
    println!("Sources: {:?}", answer.sources);
    Ok(())
}
