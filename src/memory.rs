//! Memoria de conversación acotada por tokens (FIFO).

use std::collections::VecDeque;

use crate::models::{Role, Turn};

pub const DEFAULT_TOKEN_LIMIT: usize = 2000;

/// Estimación barata de tokens: ~4 caracteres por token.
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() + 3) / 4
}

#[derive(Debug, Clone)]
pub struct ChatMemory {
    token_limit: usize,
    turns: VecDeque<Turn>,
    tokens: usize,
}

impl Default for ChatMemory {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_LIMIT)
    }
}

impl ChatMemory {
    pub fn new(token_limit: usize) -> Self {
        Self {
            token_limit,
            turns: VecDeque::new(),
            tokens: 0,
        }
    }

    /// Añade un turno y expulsa los más antiguos hasta volver al presupuesto.
    /// El turno recién añadido nunca se expulsa.
    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        let turn = Turn {
            role,
            content: content.into(),
        };
        self.tokens += estimate_tokens(&turn.content);
        self.turns.push_back(turn);

        while self.tokens > self.token_limit && self.turns.len() > 1 {
            if let Some(evicted) = self.turns.pop_front() {
                self.tokens -= estimate_tokens(&evicted.content);
            }
        }
    }

    /// Los últimos `n` turnos, el más reciente al final.
    pub fn recent(&self, n: usize) -> Vec<Turn> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip).cloned().collect()
    }

    pub fn all(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.tokens = 0;
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn token_count(&self) -> usize {
        self.tokens
    }

    pub fn token_limit(&self) -> usize {
        self.token_limit
    }
}
