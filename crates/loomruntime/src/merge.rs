use dashmap::DashMap;
use loomcore::{Datum, IndexPath, Merge, OwningProcess, Token, Value, WorkflowStructureError};

struct MergeState {
    latched: Vec<Option<usize>>,
    buffered: Vec<Vec<Token>>,
    finals: Vec<Option<Datum>>,
    /// Ports before this one have been relayed completely
    released: usize,
}

impl MergeState {
    fn new(ports: usize) -> Self {
        Self {
            latched: vec![None; ports],
            buffered: vec![Vec::new(); ports],
            finals: vec![None; ports],
            released: 0,
        }
    }
}

/// Per-process state of one merge.
///
/// Tokens of input port `k` leave with `k` prepended to their index, after
/// ports `0..k` have closed, and only once every input has shown its
/// cardinality. A cardinality mismatch drops the process's state without
/// emitting anything more for it.
pub struct MergeRuntime {
    name: String,
    ports: Vec<String>,
    states: DashMap<OwningProcess, MergeState>,
}

impl MergeRuntime {
    pub fn new(merge: &Merge) -> Self {
        Self {
            name: merge.name().to_string(),
            ports: merge.inputs().to_vec(),
            states: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accept a token on the named input port; returns the tokens released
    /// on the merge output.
    pub fn receive(&self, port: &str, token: Token) -> Result<Vec<Token>, WorkflowStructureError> {
        let position = self
            .ports
            .iter()
            .position(|p| p == port)
            .ok_or_else(|| WorkflowStructureError::UnknownPort {
                owner: format!("merge '{}'", self.name),
                port: port.to_string(),
            })?;
        let Some(cardinality) = token.cardinality() else {
            return Ok(Vec::new());
        };
        let process = token.owning_process.clone();

        let mut state = self
            .states
            .entry(process.clone())
            .or_insert_with(|| MergeState::new(self.ports.len()));

        let expected = state.latched[position].or_else(|| state.latched.iter().flatten().next().copied());
        if let Some(expected) = expected {
            if expected != cardinality {
                drop(state);
                self.states.remove(&process);
                tracing::warn!("Merge '{}' dropped {} after a cardinality mismatch on '{}'", self.name, process, port);
                return Err(WorkflowStructureError::MergeCardinality {
                    merge: self.name.clone(),
                    port: port.to_string(),
                    expected,
                    actual: cardinality,
                    process,
                });
            }
        }
        state.latched[position] = Some(cardinality);
        if token.is_final() {
            state.finals[position] = token.datum().cloned();
        }
        state.buffered[position].push(token);

        if state.latched.iter().any(Option::is_none) {
            return Ok(Vec::new());
        }

        let mut released = Vec::new();
        while state.released < self.ports.len() {
            let k = state.released;
            for token in state.buffered[k].drain(..) {
                released.push(token.with_index(token.index.prepend(k)));
            }
            if state.finals[k].is_none() {
                break;
            }
            state.released += 1;
        }

        if state.released == self.ports.len() {
            let items: Vec<Value> = state.finals.iter().flatten().map(|d| d.value.clone()).collect();
            released.push(Token::data(
                process.clone(),
                IndexPath::root(),
                Datum::new(Value::Array(items), cardinality + 1),
            ));
            drop(state);
            self.states.remove(&process);
        }
        Ok(released)
    }

    /// Forget everything buffered for `process` and the processes inside it.
    pub fn cancel(&self, process: &OwningProcess) {
        self.states.retain(|key, _| !process.contains(key));
    }

    pub fn is_idle(&self, process: &OwningProcess) -> bool {
        !self.states.contains_key(process)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomcore::edits::{AddMerge, AddMergeInput};
    use loomcore::Dataflow;

    fn merge(ports: &[&str]) -> MergeRuntime {
        let mut df = Dataflow::new("merging");
        df.edit(AddMerge::new(Merge::new("m"))).unwrap();
        for port in ports {
            df.edit(AddMergeInput::new("m", *port)).unwrap();
        }
        MergeRuntime::new(df.merge("m").unwrap())
    }

    fn token(process: &OwningProcess, index: &[usize], value: &str, depth: usize) -> Token {
        Token::data(process.clone(), IndexPath::new(index.to_vec()), Datum::new(value, depth))
    }

    #[test]
    fn nothing_is_released_before_every_port_latched() {
        let m = merge(&["a", "b"]);
        let p = OwningProcess::run("r");
        assert!(m.receive("b", token(&p, &[], "b", 0)).unwrap().is_empty());
        let out = m.receive("a", token(&p, &[], "a", 0)).unwrap();
        let indices: Vec<String> = out.iter().map(|t| t.index.to_string()).collect();
        assert_eq!(indices, vec!["[0]", "[1]", "[]"]);
        assert!(m.is_idle(&p));
    }

    #[test]
    fn cardinality_mismatch_drops_buffered_tokens() {
        let m = merge(&["a", "b"]);
        let p = OwningProcess::run("r");
        assert!(m.receive("a", token(&p, &[0], "x", 0)).unwrap().is_empty());
        let err = m.receive("b", token(&p, &[], "y", 0)).unwrap_err();
        assert!(matches!(
            err,
            WorkflowStructureError::MergeCardinality { expected: 1, actual: 0, .. }
        ));
        assert!(m.is_idle(&p));
    }

    #[test]
    fn ports_are_relayed_in_declaration_order() {
        let m = merge(&["a", "b"]);
        let p = OwningProcess::run("r");
        assert!(m.receive("b", token(&p, &[0], "b0", 0)).unwrap().is_empty());
        let out = m.receive("a", token(&p, &[0], "a0", 0)).unwrap();
        let indices: Vec<String> = out.iter().map(|t| t.index.to_string()).collect();
        // port b waits until a has closed
        assert_eq!(indices, vec!["[0,0]"]);

        let a_final = Token::data(p.clone(), IndexPath::root(), Datum::new(Value::Array(vec!["a0".into()]), 1));
        let out = m.receive("a", a_final).unwrap();
        let indices: Vec<String> = out.iter().map(|t| t.index.to_string()).collect();
        assert_eq!(indices, vec!["[0]", "[1,0]"]);

        let b_final = Token::data(p.clone(), IndexPath::root(), Datum::new(Value::Array(vec!["b0".into()]), 1));
        let out = m.receive("b", b_final).unwrap();
        let last = out.last().unwrap();
        assert!(last.is_final());
        assert_eq!(last.datum().unwrap().depth, 2);
    }
}
