use std::collections::BTreeSet;

pub type VarId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Boolean,
    /// Data-level quantity, must be expanded to booleans before elaboration.
    Integer { width: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Declared,
    /// Added by the encoder to break a state conflict.
    State,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub region: usize,
    pub kind: VariableKind,
    pub origin: Origin,
}

/// Every `(name, region)` pair is its own copy of a named net. A region only
/// observes the copies that live in it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableSet {
    variables: Vec<Variable>,
}

impl VariableSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn get(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarId, &Variable)> {
        self.variables.iter().enumerate()
    }

    pub fn find(&self, name: &str, region: usize) -> Option<VarId> {
        self.variables
            .iter()
            .position(|v| v.name == name && v.region == region)
    }

    pub fn define(&mut self, name: &str, region: usize, kind: VariableKind) -> VarId {
        if let Some(id) = self.find(name, region) {
            return id;
        }

        self.variables.push(Variable {
            name: name.to_string(),
            region,
            kind,
            origin: Origin::Declared,
        });
        self.variables.len() - 1
    }

    /// Creates a fresh boolean state variable owned by `region`.
    pub fn insert_state_variable(&mut self, region: usize) -> VarId {
        let mut n = 0;
        let name = loop {
            let candidate = format!("v{n}");
            if self.variables.iter().all(|v| v.name != candidate) {
                break candidate;
            }
            n += 1;
        };

        self.variables.push(Variable {
            name,
            region,
            kind: VariableKind::Boolean,
            origin: Origin::State,
        });
        self.variables.len() - 1
    }

    /// All copies of the net `id` belongs to, itself included.
    pub fn copies(&self, id: VarId) -> Vec<VarId> {
        let Some(var) = self.variables.get(id) else {
            return vec![];
        };

        self.variables
            .iter()
            .enumerate()
            .filter(|(_, v)| v.name == var.name)
            .map(|(i, _)| i)
            .collect()
    }

    /// Copy of the net `id` belongs to as seen from `region`.
    pub fn copy_in(&self, id: VarId, region: usize) -> Option<VarId> {
        let var = self.variables.get(id)?;
        self.find(&var.name, region)
    }

    pub fn in_region(&self, region: usize) -> BTreeSet<VarId> {
        self.variables
            .iter()
            .enumerate()
            .filter(|(_, v)| v.region == region)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn regions(&self) -> BTreeSet<usize> {
        self.variables.iter().map(|v| v.region).collect()
    }

    /// Name for reports; copies that share a name are suffixed with `'region`.
    pub fn label(&self, id: VarId) -> String {
        let Some(var) = self.variables.get(id) else {
            return format!("v#{id}");
        };

        let shared = self
            .variables
            .iter()
            .filter(|v| v.name == var.name)
            .count()
            > 1;

        if shared {
            format!("{}'{}", var.name, var.region)
        } else {
            var.name.clone()
        }
    }
}
