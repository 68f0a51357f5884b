//! Nickname color assignment over a fixed, ordered palette.
//!
//! The k-th distinct nickname in the table gets `palette[k % N]`, where k is
//! the table size at assignment time. Assignments are stable until a local
//! rename moves them with [`ColorAssigner::rebind`]. Nothing is ever evicted.

#[cfg(test)]
#[path = "color_test.rs"]
mod color_test;

use std::collections::HashMap;
use std::fmt;

use crate::config::DEFAULT_PALETTE;

/// A palette entry, e.g. `"orange"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Color(String);

impl Color {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ColorAssigner {
    palette: Vec<Color>,
    assigned: HashMap<String, Color>,
}

impl ColorAssigner {
    /// Build an assigner over `palette`. An empty palette falls back to [`DEFAULT_PALETTE`].
    #[must_use]
    pub fn new(palette: &[String]) -> Self {
        let palette: Vec<Color> = if palette.is_empty() {
            DEFAULT_PALETTE.iter().map(|name| Color::new(*name)).collect()
        } else {
            palette.iter().map(Color::new).collect()
        };
        Self { palette, assigned: HashMap::new() }
    }

    #[must_use]
    pub fn palette(&self) -> &[Color] {
        &self.palette
    }

    /// Color of `nickname`, assigning the next palette slot on first sight.
    pub fn color_for(&mut self, nickname: &str) -> Color {
        if let Some(color) = self.assigned.get(nickname) {
            return color.clone();
        }
        let color = self.palette[self.assigned.len() % self.palette.len()].clone();
        self.assigned.insert(nickname.to_owned(), color.clone());
        color
    }

    /// Move `old`'s color to `new` and forget `old`.
    ///
    /// If `new` already has a color it is overwritten. If `old` has none,
    /// nothing is recorded and `new` is colored on first use.
    pub fn rebind(&mut self, old: &str, new: &str) {
        if old == new {
            return;
        }
        if let Some(color) = self.assigned.remove(old) {
            self.assigned.insert(new.to_owned(), color);
        }
    }

    /// Current color of `nickname` without assigning one.
    #[must_use]
    pub fn get(&self, nickname: &str) -> Option<&Color> {
        self.assigned.get(nickname)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

impl Default for ColorAssigner {
    fn default() -> Self {
        Self::new(&[])
    }
}
