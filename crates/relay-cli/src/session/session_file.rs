use anyhow::Result;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use relay::models::message::Message;

pub fn ensure_session_dir() -> Result<PathBuf> {
    let home_dir =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
    let config_dir = home_dir.join(".config").join("relay").join("sessions");

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

pub fn session_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.jsonl", name))
}

/// Messages of an earlier session, or nothing for a new one
pub fn read_messages(session_file: &Path) -> Result<Vec<Message>> {
    if !session_file.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(session_file)?);
    let mut messages = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        messages.push(serde_json::from_str(&line)?);
    }
    Ok(messages)
}

pub fn persist_messages(session_file: &Path, messages: &[Message]) -> Result<()> {
    let file = fs::File::create(session_file)?; // Create or truncate the file
    persist_messages_internal(file, messages)
}

fn persist_messages_internal(session_file: File, messages: &[Message]) -> Result<()> {
    let mut writer = std::io::BufWriter::new(session_file);

    for message in messages {
        serde_json::to_writer(&mut writer, &message)?;
        writeln!(writer)?;
    }

    writer.flush()?;
    Ok(())
}

/// Store a generated image next to the session file
pub fn save_image(session_file: &Path, data: &[u8]) -> Result<PathBuf> {
    let dir = session_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let stem = session_file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("session");
    let path = dir.join(format!("{}-{}.png", stem, uuid::Uuid::new_v4()));
    fs::write(&path, data)?;
    Ok(path)
}
