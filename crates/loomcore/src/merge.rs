use serde::{Deserialize, Serialize};

/// Fan-in point nesting N input streams into one collection stream.
///
/// Input ports are ordered; the position of a port becomes the outermost
/// index of every token it relays. Port depths are not declared, they follow
/// from whatever is connected and are checked by validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Merge {
    name: String,
    inputs: Vec<String>,
}

impl Merge {
    pub const OUTPUT: &'static str = "output";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Ordinal of an input port.
    pub fn position(&self, port: &str) -> Option<usize> {
        self.inputs.iter().position(|p| p == port)
    }

    pub(crate) fn insert_input(&mut self, position: usize, port: String) {
        let position = position.min(self.inputs.len());
        self.inputs.insert(position, port);
    }

    pub(crate) fn remove_input(&mut self, port: &str) -> Option<usize> {
        let position = self.position(port)?;
        self.inputs.remove(position);
        Some(position)
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }
}
