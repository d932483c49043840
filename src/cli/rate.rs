//! One-shot rate command handler.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use riskmeter::config::Config;
use riskmeter::{NewsItem, RiskMeter};

/// Rate the items in `input` and print the verdict as JSON.
pub(crate) async fn cmd_rate(config: Config, input: PathBuf) -> Result<()> {
    let raw = read_input(&input)?;
    let items: Vec<NewsItem> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of objects", input.display()))?;

    let meter = RiskMeter::from_config(&config)?;
    let verdict = meter.rate(&items).await?;
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}

fn read_input(input: &Path) -> Result<String> {
    if input == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(input).with_context(|| format!("Failed to read {}", input.display()))
}
