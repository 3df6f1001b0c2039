//! Named text values that the change detector can monitor.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

/// Looks up the current text of a named source.
///
/// A missing source is `None`, never an error.
pub trait TextSourceLookup: Send + Sync {
    fn text(&self, name: &str) -> Option<String>;
}

impl<F> TextSourceLookup for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn text(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// In-process registry of text sources, written by whoever owns the text
/// (a console, an overlay, a scoreboard) and read by the detector.
#[derive(Clone, Default)]
pub struct TextSources {
    sources: Arc<RwLock<HashMap<String, String>>>,
}

impl TextSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: &str, text: &str) {
        let mut sources = match self.sources.write() {
            Ok(sources) => sources,
            Err(e) => e.into_inner(),
        };
        sources.insert(name.to_string(), text.to_string());
    }

    pub fn remove(&self, name: &str) -> Option<String> {
        let mut sources = match self.sources.write() {
            Ok(sources) => sources,
            Err(e) => e.into_inner(),
        };
        sources.remove(name)
    }

    /// Names of all registered sources, sorted.
    pub fn names(&self) -> Vec<String> {
        let sources = match self.sources.read() {
            Ok(sources) => sources,
            Err(e) => e.into_inner(),
        };
        let mut names: Vec<String> = sources.keys().cloned().collect();
        names.sort();
        names
    }
}

impl TextSourceLookup for TextSources {
    fn text(&self, name: &str) -> Option<String> {
        let sources = match self.sources.read() {
            Ok(sources) => sources,
            Err(e) => e.into_inner(),
        };
        sources.get(name).cloned()
    }
}
