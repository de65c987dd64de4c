use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortRole {
    Input,
    Output,
}

/// Named, typed endpoint of a processor, merge or dataflow.
///
/// `depth` is the conceptual collection depth the port consumes or emits.
/// Output ports additionally declare a granular depth: the finest grain they
/// can actually stream before the complete value is available.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Port {
    name: String,
    depth: usize,
    granular_depth: usize,
    role: PortRole,
}

impl Port {
    pub fn input(name: impl Into<String>, depth: usize) -> Self {
        Self {
            name: name.into(),
            depth,
            granular_depth: depth,
            role: PortRole::Input,
        }
    }

    pub fn output(name: impl Into<String>, depth: usize) -> Self {
        Self::output_with_granularity(name, depth, depth)
    }

    /// Output port streaming items of `granular_depth`; clamped to `depth`.
    pub fn output_with_granularity(name: impl Into<String>, depth: usize, granular_depth: usize) -> Self {
        Self {
            name: name.into(),
            depth,
            granular_depth: granular_depth.min(depth),
            role: PortRole::Output,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn granular_depth(&self) -> usize {
        self.granular_depth
    }

    pub fn role(&self) -> PortRole {
        self.role
    }

    pub fn is_input(&self) -> bool {
        self.role == PortRole::Input
    }
}

/// Names accepted for processors, merges and ports.
pub(crate) fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granular_depth_never_exceeds_depth() {
        let p = Port::output_with_granularity("out", 1, 3);
        assert_eq!(p.granular_depth(), 1);
        assert_eq!(Port::output("o", 2).granular_depth(), 2);
    }

    #[test]
    fn names_are_restricted() {
        assert!(is_valid_name("fetch_data-2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("a b"));
        assert!(!is_valid_name("a/b"));
    }
}
