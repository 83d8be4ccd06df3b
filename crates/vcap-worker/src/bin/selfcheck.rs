use std::path::Path;
use std::process::Command;

use vcap_worker::PipelineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = PipelineConfig::from_env();

    println!(
        "vcap-selfcheck: starting with media_root={} feature_root={} caption_root={}",
        config.layout.media_root.display(),
        config.layout.feature_root.display(),
        config.layout.caption_root.display()
    );
    for root in config.layout.roots() {
        ensure_dir(root).await?;
    }
    ensure_tool(&config.toolchain.ytdlp_bin, "--version")?;
    ensure_tool(&config.toolchain.ffprobe_bin, "-version")?;

    println!("vcap-selfcheck: ok");
    Ok(())
}

async fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {}: {}", path.display(), e))
}

fn ensure_tool(program: &Path, version_flag: &str) -> anyhow::Result<()> {
    let output = Command::new(program)
        .arg(version_flag)
        .output()
        .map_err(|e| anyhow::anyhow!("{} not available: {}", program.display(), e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "{} {} failed: {:?}",
            program.display(),
            version_flag,
            output.status
        ));
    }
    Ok(())
}
