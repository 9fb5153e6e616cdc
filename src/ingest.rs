//! Carga de los documentos del directorio de un bot (PDF, DOCX y texto plano)
//! y troceado en chunks para calcular embeddings.

use std::{fs, path::Path};

use anyhow::{anyhow, Context, Result};
use docx_rs::{read_docx, DocumentChild, ParagraphChild, RunChild};
use mime_guess::MimeGuess;
use tracing::{info, warn};
use uuid::Uuid;

use crate::documents;
use crate::models::{DocumentChunk, LoadedDocument};

/// Tamaño máximo (en caracteres) de un chunk.
pub const MAX_CHUNK_CHARS: usize = 1200;

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "csv", "json", "html", "htm", "xml", "log", "rst",
];

/// Lee todos los ficheros soportados de `data_dir`. Los ficheros ilegibles o
/// con formato no soportado se omiten con un aviso.
pub fn load_documents(data_dir: &Path) -> Result<Vec<LoadedDocument>> {
    if !data_dir.is_dir() {
        return Err(anyhow!("La ruta no es un directorio: {}", data_dir.display()));
    }

    let mut loaded = Vec::new();
    for path in documents::list_files(data_dir) {
        let filename = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());

        match extract_text(&path) {
            Ok(Some(text)) if !text.trim().is_empty() => {
                loaded.push(LoadedDocument { filename, text });
            }
            Ok(Some(_)) => warn!("Fichero vacío o sin texto útil: {}", path.display()),
            Ok(None) => {}
            Err(e) => warn!("No se pudo leer {}: {:#}. Saltando fichero.", path.display(), e),
        }
    }

    info!(
        "Cargados {} documentos desde {}",
        loaded.len(),
        data_dir.display()
    );
    Ok(loaded)
}

/// Extrae el texto de un fichero según su extensión. `Ok(None)` significa
/// formato no soportado.
pub fn extract_text(path: &Path) -> Result<Option<String>> {
    let extension = path
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("")
        .to_lowercase();

    let text = match extension.as_str() {
        "pdf" => pdf_extract::extract_text(path)
            .with_context(|| format!("Error extrayendo texto del PDF {}", path.display()))?,
        "docx" => extract_docx_text(path)?,
        ext if TEXT_EXTENSIONS.contains(&ext) || is_text_mime(path) => {
            fs::read_to_string(path).context("Fichero no-texto o no-UTF8")?
        }
        _ => {
            info!(
                "Saltando fichero con extensión no soportada ('.{}'): {}",
                extension,
                path.display()
            );
            return Ok(None);
        }
    };
    Ok(Some(text))
}

fn is_text_mime(path: &Path) -> bool {
    MimeGuess::from_path(path)
        .first()
        .map(|m| m.type_() == mime_guess::mime::TEXT)
        .unwrap_or(false)
}

fn extract_docx_text(path: &Path) -> Result<String> {
    let buf = fs::read(path)?;
    let docx = read_docx(&buf).map_err(|e| anyhow!("DOCX inválido {}: {}", path.display(), e))?;

    let mut content = String::new();
    for child in docx.document.children {
        if let DocumentChild::Paragraph(para) = child {
            for child in &para.children {
                if let ParagraphChild::Run(run) = child {
                    for run_child in &run.children {
                        if let RunChild::Text(text) = run_child {
                            content.push_str(&text.text);
                        }
                    }
                }
            }
            // Un párrafo DOCX equivale a un bloque separado por línea en blanco.
            content.push_str("\n\n");
        }
    }
    Ok(content)
}

/// Trocea todos los documentos, asignando un id único por chunk.
pub fn chunk_documents(documents: &[LoadedDocument]) -> Vec<DocumentChunk> {
    documents
        .iter()
        .flat_map(|doc| {
            split_into_chunks(&doc.text, MAX_CHUNK_CHARS)
                .into_iter()
                .enumerate()
                .map(|(index, text)| DocumentChunk {
                    id: Uuid::new_v4().to_string(),
                    source: doc.filename.clone(),
                    index,
                    text,
                })
        })
        .collect()
}

/// Agrupa párrafos hasta `max_chars`. Un párrafo más largo que el límite se
/// corta por caracteres.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        if current.len() + paragraph.len() + 2 > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if paragraph.len() > max_chars {
            let chars: Vec<char> = paragraph.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
