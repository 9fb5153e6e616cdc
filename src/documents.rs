//! Almacén de documentos: el listado del directorio de cada bot es la fuente
//! de verdad del conjunto de documentos.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{BotError, BotResult};
use crate::models::Bot;

/// Reduce un nombre recibido del cliente a un nombre de fichero plano dentro
/// de `data_dir`. Rechaza nombres vacíos, `.`/`..` y ocultos.
pub fn sanitize_filename(raw: &str) -> BotResult<String> {
    let candidate = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if candidate.is_empty() || candidate.starts_with('.') {
        return Err(BotError::InvalidFilename(raw.to_string()));
    }
    Ok(candidate.to_string())
}

pub async fn ensure_dir(bot: &Bot) -> BotResult<()> {
    fs::create_dir_all(&bot.data_dir).await?;
    Ok(())
}

/// Ficheros regulares del directorio del bot, ordenados por nombre.
/// Un directorio inexistente equivale a "sin documentos".
pub fn list_files(data_dir: &Path) -> Vec<PathBuf> {
    if !data_dir.is_dir() {
        return Vec::new();
    }

    WalkDir::new(data_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Entrada ilegible en {}: {}", data_dir.display(), e);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .map(|e| e.into_path())
        .collect()
}

pub fn list_documents(bot: &Bot) -> Vec<String> {
    list_files(&bot.data_dir)
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect()
}

pub fn has_documents(bot: &Bot) -> bool {
    !list_files(&bot.data_dir).is_empty()
}

/// Escribe (o sobrescribe) `filename` en el directorio del bot.
pub async fn save(bot: &Bot, filename: &str, content: &[u8]) -> BotResult<PathBuf> {
    let filename = sanitize_filename(filename)?;
    ensure_dir(bot).await?;
    let path = bot.data_dir.join(&filename);
    fs::write(&path, content).await?;
    info!(
        "[{}] Documento guardado: {} ({} bytes)",
        bot.id,
        filename,
        content.len()
    );
    Ok(path)
}

/// Borra `filename`. Falla con `DocumentNotFound` si no existe o si es un
/// nombre que nunca aparece en el listado (oculto, vacío, `..`).
pub async fn remove(bot: &Bot, filename: &str) -> BotResult<()> {
    let filename = sanitize_filename(filename)
        .map_err(|_| BotError::DocumentNotFound(filename.to_string()))?;
    let path = bot.data_dir.join(&filename);
    match fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Err(BotError::DocumentNotFound(filename)),
    }
    fs::remove_file(&path).await?;
    info!("[{}] Documento eliminado: {}", bot.id, filename);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot_in(dir: &Path) -> Bot {
        Bot {
            id: "bot1".to_string(),
            name: "Bot".to_string(),
            description: String::new(),
            system_prompt: String::new(),
            collection_name: "c1".to_string(),
            data_dir: dir.join("data_bot1"),
        }
    }

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_filename("C:\\docs\\a.pdf").unwrap(), "a.pdf");
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename("docs/").is_err());
        assert!(sanitize_filename(".env").is_err());
    }

    #[tokio::test]
    async fn save_overwrites_and_lists_once() {
        let tmp = tempfile::tempdir().unwrap();
        let bot = bot_in(tmp.path());

        save(&bot, "a.txt", b"uno").await.unwrap();
        save(&bot, "a.txt", b"dos").await.unwrap();

        assert_eq!(list_documents(&bot), vec!["a.txt".to_string()]);
        let content = std::fs::read_to_string(bot.data_dir.join("a.txt")).unwrap();
        assert_eq!(content, "dos");
    }

    #[tokio::test]
    async fn remove_missing_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let bot = bot_in(tmp.path());
        ensure_dir(&bot).await.unwrap();

        let err = remove(&bot, "nope.txt").await.unwrap_err();
        assert!(matches!(err, BotError::DocumentNotFound(_)));
    }

    #[tokio::test]
    async fn remove_unlistable_name_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let bot = bot_in(tmp.path());
        ensure_dir(&bot).await.unwrap();
        std::fs::write(bot.data_dir.join(".hidden"), "x").unwrap();

        for name in [".hidden", "..", ""] {
            let err = remove(&bot, name).await.unwrap_err();
            assert!(matches!(err, BotError::DocumentNotFound(_)), "{name}");
        }
        assert!(bot.data_dir.join(".hidden").exists());
    }

    #[test]
    fn missing_directory_lists_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let bot = bot_in(tmp.path());
        assert!(list_documents(&bot).is_empty());
        assert!(!has_documents(&bot));
    }
}
