//! The built-in persona registry.
//!
//! Personas are declared once in [`BUILTIN`] and materialised at startup
//! against a memory root; each gets its own `<memory_root>/<name>` directory.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::PersonaError;
use crate::persona::Persona;

/// A static persona declaration.
#[derive(Debug, Clone, Copy)]
pub struct PersonaDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub prompt: &'static str,
}

macro_rules! default_prompt {
    () => {
        "You are an expert assistant named ADA.\n\
         Your primary task is answering USER queries.\n\
         Respond concisely while returning critical information.\n\
         Respond only in json using the optional keys: [\"text\", \"code\"] or with available tool calls.\n\
         Only respond with code if prompted for source code."
    };
}

pub const DEFAULT: PersonaDefinition = PersonaDefinition {
    name: "default",
    description: "The standard expert assistant.",
    prompt: default_prompt!(),
};

pub const JESTER: PersonaDefinition = PersonaDefinition {
    name: "jester",
    description: "The standard expert assistant, but as a joke.",
    prompt: concat!(
        default_prompt!(),
        "\nRespond only in rhyme.\n",
        "Occasionally, add a joke.\n",
        "Occasionally, speak in pig-latin."
    ),
};

/// Every built-in persona, in listing order.
pub const BUILTIN: &[PersonaDefinition] = &[DEFAULT, JESTER];

/// Ordered collection of personas with lookup by name.
#[derive(Debug, Clone)]
pub struct Personas {
    ordered: Vec<Arc<Persona>>,
    by_name: BTreeMap<String, usize>,
}

impl Personas {
    /// Build the built-in personas rooted at `memory_root`.
    pub fn builtin(memory_root: &Path, memory_limit: usize) -> Self {
        Self::from_definitions(BUILTIN, memory_root, memory_limit)
    }

    pub fn from_definitions(
        definitions: &[PersonaDefinition],
        memory_root: &Path,
        memory_limit: usize,
    ) -> Self {
        let mut ordered = Vec::with_capacity(definitions.len());
        let mut by_name = BTreeMap::new();
        for def in definitions {
            let persona = Persona::new(def.name, def.description, def.prompt, memory_root.join(def.name))
                .with_memory_limit(memory_limit);
            by_name.insert(def.name.to_string(), ordered.len());
            ordered.push(Arc::new(persona));
        }
        Self { ordered, by_name }
    }

    pub fn all(&self) -> &[Arc<Persona>] {
        &self.ordered
    }

    pub fn get(&self, name: &str) -> Option<Arc<Persona>> {
        self.by_name.get(name).map(|&i| Arc::clone(&self.ordered[i]))
    }

    /// Like [`Personas::get`] but with a typed error for unknown names.
    pub fn require(&self, name: &str) -> Result<Arc<Persona>, PersonaError> {
        self.get(name).ok_or_else(|| PersonaError::NotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.ordered.iter().map(|p| p.name()).collect()
    }
}
