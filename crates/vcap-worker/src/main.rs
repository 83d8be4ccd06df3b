//! One-shot caption runner.
//!
//! Runs the pipeline for each reference given on the command line and
//! prints one JSON document per reference: the caption on success, the
//! failure payload otherwise.

use tracing::info;

use vcap_worker::{init_tracing, CaptionPipeline, PipelineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("vcap=info");

    let references: Vec<String> = std::env::args().skip(1).collect();
    if references.is_empty() {
        anyhow::bail!("usage: vcap-worker <url-or-id>...");
    }

    let config = PipelineConfig::from_env();
    info!("Pipeline config: {:?}", config);
    let pipeline = CaptionPipeline::from_config(&config);

    let mut failures = 0usize;
    for reference in &references {
        let document = match pipeline.run_reference(reference).await {
            Ok(output) => output.caption.into_payload(),
            Err(err) => {
                failures += 1;
                serde_json::to_value(err.to_payload())?
            }
        };
        println!("{}", serde_json::to_string(&document)?);
    }

    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
