//! CLI support: embedding model download.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tokio::io::AsyncWriteExt;

const HF_BASE: &str = "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main";

/// Files the local embedding provider needs, relative to the repo root on
/// the hub and to the cache dir on disk.
const MODEL_FILES: [(&str, &str); 2] = [
    ("onnx/model.onnx", "model.onnx"),
    ("tokenizer.json", "tokenizer.json"),
];

/// Download the ONNX embedding model and tokenizer into the cache directory.
/// Files already present are left alone.
pub async fn model_download(config: &crate::config::EmbeddingConfig) -> Result<()> {
    let cache_dir = crate::config::expand_tilde(&config.cache_dir);
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("failed to create cache dir: {}", cache_dir.display()))?;

    for (remote, local) in MODEL_FILES {
        let dest = cache_dir.join(local);
        if dest.exists() {
            println!("{local} already present at {}", dest.display());
            continue;
        }
        println!("Downloading {local}...");
        fetch_to(&format!("{HF_BASE}/{remote}"), &dest).await?;
        println!("Saved {}", dest.display());
    }

    println!("Embedding model ready.");
    Ok(())
}

/// Fetch a URL into `dest` with a progress bar, writing to a temp file and
/// renaming so a failed download never leaves a truncated file behind.
async fn fetch_to(url: &str, dest: &Path) -> Result<()> {
    let response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;
    anyhow::ensure!(
        response.status().is_success(),
        "download failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
                    .expect("valid template")
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let body = response.bytes().await.context("error reading response")?;
    pb.inc(body.len() as u64);

    let tmp = dest.with_extension("partial");
    let mut file = tokio::fs::File::create(&tmp)
        .await
        .with_context(|| format!("failed to create {}", tmp.display()))?;
    file.write_all(&body).await.context("error writing file")?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp, dest)
        .await
        .with_context(|| format!("failed to move {} into place", dest.display()))?;

    pb.finish_and_clear();
    Ok(())
}
