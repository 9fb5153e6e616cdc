//! Base de datos vectorial persistente en disco, con una colección por bot.
//!
//! Cada colección vive en `<raíz>/<nombre>/collection.json` y se reescribe en
//! cada inserción. La búsqueda es exacta por similitud coseno.
//!
//! API pública:
//!   - `VectorClient::get_or_create(&str)` (idempotente)
//!   - `VectorClient::delete(&str)` (best-effort)
//!   - `Collection::add` / `Collection::query`.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, RwLock},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const COLLECTION_FILE: &str = "collection.json";
const COSINE_SPACE: &str = "cosine";

/// Un chunk con su embedding, tal como se guarda en la colección.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub source: String,
    pub text: String,
    pub embedding: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub score: f64,
    pub record: VectorRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionData {
    name: String,
    space: String,
    created_at: DateTime<Utc>,
    records: Vec<VectorRecord>,
}

#[derive(Debug)]
pub struct Collection {
    name: String,
    file: PathBuf,
    data: RwLock<CollectionData>,
}

impl Collection {
    fn create(name: &str, dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("No se pudo crear {}", dir.display()))?;
        let file = dir.join(COLLECTION_FILE);

        let data = if file.exists() {
            let raw = fs::read_to_string(&file)?;
            let data: CollectionData = serde_json::from_str(&raw)
                .with_context(|| format!("Colección corrupta en {}", file.display()))?;
            if data.space != COSINE_SPACE {
                return Err(anyhow!(
                    "La colección '{}' usa el espacio '{}' en lugar de '{}'",
                    name,
                    data.space,
                    COSINE_SPACE
                ));
            }
            data
        } else {
            let data = CollectionData {
                name: name.to_string(),
                space: COSINE_SPACE.to_string(),
                created_at: Utc::now(),
                records: Vec::new(),
            };
            fs::write(&file, serde_json::to_vec(&data)?)?;
            data
        };

        Ok(Self {
            name: name.to_string(),
            file,
            data: RwLock::new(data),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn count(&self) -> usize {
        self.data.read().map(|d| d.records.len()).unwrap_or(0)
    }

    /// Añade registros y persiste la colección.
    pub fn add(&self, records: Vec<VectorRecord>) -> Result<()> {
        let mut data = self
            .data
            .write()
            .map_err(|_| anyhow!("Lock envenenado en la colección '{}'", self.name))?;
        data.records.extend(records);
        let bytes = serde_json::to_vec(&*data)?;
        fs::write(&self.file, bytes)
            .with_context(|| format!("No se pudo persistir {}", self.file.display()))?;
        Ok(())
    }

    /// Los `top_k` registros más similares, de mayor a menor puntuación.
    pub fn query(&self, embedding: &[f64], top_k: usize) -> Vec<ScoredRecord> {
        let Ok(data) = self.data.read() else {
            return Vec::new();
        };

        let mut scored: Vec<ScoredRecord> = data
            .records
            .iter()
            .map(|record| ScoredRecord {
                score: cosine_similarity(embedding, &record.embedding),
                record: record.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        scored
    }
}

/// Cliente de la base de datos vectorial. Se comparte entre todos los bots.
#[derive(Debug)]
pub struct VectorClient {
    root: PathBuf,
    open: Mutex<HashMap<String, Arc<Collection>>>,
}

impl VectorClient {
    pub fn persistent(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("No se pudo crear {}", root.display()))?;
        info!("Base de datos vectorial en {}", root.display());
        Ok(Self {
            root,
            open: Mutex::new(HashMap::new()),
        })
    }

    /// Devuelve la colección, creándola (en espacio coseno) si no existe.
    pub fn get_or_create(&self, name: &str) -> Result<Arc<Collection>> {
        validate_collection_name(name)?;
        let mut open = self
            .open
            .lock()
            .map_err(|_| anyhow!("Lock envenenado en el cliente vectorial"))?;

        if let Some(collection) = open.get(name) {
            return Ok(collection.clone());
        }

        let collection = Arc::new(Collection::create(name, &self.root.join(name))?);
        open.insert(name.to_string(), collection.clone());
        Ok(collection)
    }

    /// Borra la colección. Que no exista no es un error: se registra y se ignora.
    pub fn delete(&self, name: &str) {
        if let Err(e) = self.try_delete(name) {
            warn!("No se pudo borrar la colección '{}': {:#}", name, e);
        }
    }

    fn try_delete(&self, name: &str) -> Result<()> {
        validate_collection_name(name)?;
        let was_open = self
            .open
            .lock()
            .map_err(|_| anyhow!("Lock envenenado en el cliente vectorial"))?
            .remove(name)
            .is_some();

        let dir = self.root.join(name);
        if !dir.exists() {
            if was_open {
                return Ok(());
            }
            return Err(anyhow!("La colección '{}' no existe", name));
        }
        fs::remove_dir_all(&dir)?;
        info!("Colección '{}' eliminada.", name);
        Ok(())
    }

    pub fn exists(&self, name: &str) -> bool {
        let is_open = self
            .open
            .lock()
            .map(|open| open.contains_key(name))
            .unwrap_or(false);
        is_open || self.root.join(name).join(COLLECTION_FILE).is_file()
    }

    /// Colecciones persistidas en disco.
    pub fn list_collections(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|e| e.path().join(COLLECTION_FILE).is_file())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }
}

fn validate_collection_name(name: &str) -> Result<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if name.is_empty() || name.len() > 63 || !valid_chars {
        return Err(anyhow!("Nombre de colección inválido: '{name}'"));
    }
    Ok(())
}

pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
