use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

pub async fn read_file_to_string_async(path: &Path) -> Result<String> {
    let data = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading file: {}", path.display()))?;
    Ok(data)
}

/// Resolve the subject text for a task: inline snippet or file contents.
/// Empty input is rejected here so no task issues a pointless model call.
pub async fn read_subject(file: Option<&PathBuf>, inline: Option<&str>) -> Result<String> {
    let text = match (file, inline) {
        (Some(path), _) => {
            if !path.exists() {
                bail!("file not found: {}", path.display());
            }
            read_file_to_string_async(path).await?
        }
        (None, Some(snippet)) => snippet.to_string(),
        (None, None) => bail!("no input; provide --file or an inline snippet"),
    };
    if text.trim().is_empty() {
        bail!("empty input; provide a non-empty code snippet");
    }
    Ok(text)
}
