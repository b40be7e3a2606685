//! Module definitions.
//!
//! A module is the host page's ordered list of sections plus its learning
//! objectives. It is read-only once loaded. Sections are identified by their
//! position, so reordering the content of a published module invalidates
//! every persisted snapshot for it; that is a compatibility contract of the
//! definition format, not something the loader repairs.

use std::path::Path;

use serde::Deserialize;

use crate::core::section::{RawSection, Section};
use crate::error::{Result, StepgateError};
use crate::util::read_to_string_limited;

/// Module definition as authored by the host page.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleDefinition {
    pub id: String,
    #[serde(default)]
    pub objectives: Vec<String>,
    pub content: Vec<RawSection>,
    /// Closing quiz, appended after the content.
    #[serde(default)]
    pub quiz: Option<RawSection>,
}

/// A validated, normalized learning module.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub id: String,
    pub objectives: Vec<String>,
    pub sections: Vec<Section>,
}

impl Module {
    /// Parse a module from its JSON definition.
    pub fn from_json(text: &str) -> Result<Self> {
        let definition: ModuleDefinition = serde_json::from_str(text)
            .map_err(|e| StepgateError::invalid_module(e.to_string()))?;
        Self::from_definition(definition)
    }

    /// Read and parse a module definition file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = read_to_string_limited(path)?;
        Self::from_json(&text)
    }

    /// Validate and normalize an authored definition.
    pub fn from_definition(definition: ModuleDefinition) -> Result<Self> {
        let ModuleDefinition {
            id,
            objectives,
            mut content,
            quiz,
        } = definition;

        if id.trim().is_empty() {
            return Err(StepgateError::invalid_module("module id is empty"));
        }

        content.extend(quiz);
        if content.is_empty() {
            return Err(StepgateError::invalid_module(format!(
                "module {} has no content",
                id
            )));
        }

        let mut sections = Vec::with_capacity(content.len());
        for (index, raw) in content.into_iter().enumerate() {
            let mut section = raw.normalize(index)?;
            if let Some(objective) = section.completes_objective {
                if objective >= objectives.len() {
                    tracing::warn!(
                        "module {} section {}: objective {} does not exist ({} objectives), link dropped",
                        id,
                        index,
                        objective,
                        objectives.len()
                    );
                    section.completes_objective = None;
                }
            }
            sections.push(section);
        }

        Ok(Self {
            id,
            objectives,
            sections,
        })
    }

    /// Number of sections.
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// A validated module always has content.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Section at `index`, if any.
    pub fn section(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)
    }

    /// Section at `index`, or a range error.
    pub fn require(&self, index: usize) -> Result<&Section> {
        self.sections
            .get(index)
            .ok_or(StepgateError::SectionOutOfRange {
                index,
                len: self.sections.len(),
            })
    }

    /// Whether the section at `index` exists and is blocking.
    pub fn is_blocking(&self, index: usize) -> bool {
        self.section(index).is_some_and(Section::is_blocking)
    }

    /// Number of blocking sections.
    pub fn count_blocking(&self) -> usize {
        self.sections.iter().filter(|s| s.is_blocking()).count()
    }
}
